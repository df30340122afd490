//! Tool infrastructure: the Tool Registry (§4.2) and the Tool Server Client
//! (§4.3) that lets it discover tools from external subprocesses, plus two
//! local tools that ship by default.

/// Built-in arithmetic tool (`GENERAL` category).
pub mod calculator;
/// Local `list_directory` tool (`FILESYSTEM` category).
pub mod filesystem;
/// Tool registration, discovery, and category/keyword filtering.
pub mod registry;
/// Subprocess-backed client for external tool servers.
pub mod server_client;

pub use registry::{LocalTool, ToolRegistry};
pub use server_client::ToolServerClient;
