//! LLM Provider Clients and Abstractions
//!
//! Unifies OpenAI, Ollama, and Anthropic behind a single [`client::LlmProvider`]
//! trait so the rest of the orchestrator never branches on vendor.
//!
//! # Supported Providers
//!
//! Enable providers via Cargo features:
//! - `openai` - OpenAI-compatible chat completion API
//! - `ollama` - local Ollama server
//! - `anthropic` - Claude via the Messages API
//!
//! [`provider_registry::ProviderRegistry`] turns configuration into the
//! concrete provider chosen at startup; [`toolcall_parser`] is a fallback for
//! providers that emit a tool call as JSON-in-text instead of using their
//! structured tool-calling field.

/// Core LLM provider trait and streaming response types.
pub mod client;
/// Best-effort recovery of tool calls embedded in free-text model output.
pub mod toolcall_parser;
/// Turns configuration into the configured provider.
pub mod provider_registry;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "anthropic")]
pub mod anthropic;

pub use client::{ChatMessage, ChatRole, ChatStream, LlmProvider, LlmResponse, ModelParams, StreamEvent};
pub use provider_registry::{ProviderConfig, ProviderKind, ProviderRegistry};
