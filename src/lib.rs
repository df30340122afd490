//! # Conductor — a conversational agent orchestrator
//!
//! Ties intent/complexity classification, plan+ReAct tool execution, layered
//! memory, and a uniform multi-provider LLM interface into one streamed
//! per-turn state machine.
//!
//! ## Modules
//!
//! - [`types`] - core data model, error taxonomy, request/response DTOs
//! - [`llm`] - provider abstraction (OpenAI/Ollama/Anthropic) behind one trait
//! - [`tools`] - the Tool Registry and Tool Server Client
//! - [`memory`] - the Memory Composer (sliding window, recall, summarization)
//! - [`classifier`] - the Classifier/Planner
//! - [`executor`] - the Agentic Executor (plan + ReAct loop)
//! - [`orchestrator`] - the top-level per-turn state machine
//! - [`db`] - the persistence repository interface and implementations
//! - [`cache`] - the generic cache interface
//! - [`embeddings`] - text embedding generation
//! - [`api`] - the thin Axum HTTP surface
//! - [`utils`] - process-wide configuration

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Thin HTTP API surface: a streaming chat route and a conversation-listing route.
pub mod api;
/// Generic cache interface backing composition and tool-invocation caching.
pub mod cache;
/// Intent/complexity classification and plan generation.
pub mod classifier;
/// Persistence repository interface and implementations (Turso/libsql, in-memory).
pub mod db;
/// Text embedding generation for semantic recall and message embedding.
pub mod embeddings;
/// The Agentic Executor: plan + ReAct tool-calling loop.
pub mod executor;
/// LLM provider clients and abstractions.
pub mod llm;
/// Conversation memory composition and background summarization.
pub mod memory;
/// The top-level per-turn orchestrator state machine.
pub mod orchestrator;
/// Built-in tools and the Tool Registry / Tool Server Client.
pub mod tools;
/// Core types (requests, responses, errors).
pub mod types;
/// Process-wide configuration, loaded once at startup.
pub mod utils;

use std::sync::Arc;

pub use cache::{Cache, LruCache};
pub use classifier::{Classifier, Planner};
pub use db::{ConversationRepository, TursoClient};
pub use embeddings::EmbeddingService;
pub use executor::AgenticExecutor;
pub use llm::{LlmProvider, ProviderRegistry};
pub use memory::MemoryComposer;
pub use orchestrator::Orchestrator;
pub use tools::ToolRegistry;
pub use types::{OrchestratorError, Result};
pub use utils::OrchestratorConfig;

/// Application state shared across HTTP handlers. The composition root: every
/// long-lived component (§4) wired together once at startup and shared via
/// `Arc` across all in-flight turns.
#[derive(Clone)]
pub struct AppState {
    /// The top-level per-turn state machine.
    pub orchestrator: Arc<Orchestrator>,
    /// Persistence repository, used directly by the conversation-listing route.
    pub repo: Arc<dyn ConversationRepository>,
}
