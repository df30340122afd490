//! HTTP API Handlers and Routes
//!
//! The thin Axum surface needed to exercise the orchestrator end to end: a
//! single streaming chat route and a conversation-listing route. No
//! auth/session layer is in scope (§6).
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - request handlers
//! - [`api::routes`](crate::api::routes) - route definitions
//!
//! # API Endpoints
//!
//! - `POST /api/chat` - send a message, receive a server-sent-event chunk stream
//! - `GET /api/conversations?user_id=…` - list a user's conversations
//!
//! # OpenAPI Documentation
//!
//! When the `swagger-ui` feature is enabled, interactive API documentation
//! is available at `/swagger-ui/`.

/// Request handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
