//! Process configuration (§7 Ambient — configuration).

pub mod config;

pub use config::OrchestratorConfig;
