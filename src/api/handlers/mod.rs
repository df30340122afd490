//! API request handlers.
//!
//! This module contains all HTTP request handlers organized by functionality.

/// Chat streaming handler.
pub mod chat;
/// Conversation-listing handler.
pub mod conversations;
