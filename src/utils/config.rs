//! Process-wide configuration, loaded once at startup (§7 Ambient —
//! configuration). Simplified relative to the teacher's hot-reloadable
//! `AresConfigManager`: the orchestrator core does not need live config
//! reload, so this is a one-shot `dotenvy` + `env::var` load, in the
//! teacher's `Config::from_env` idiom.

use std::env;

use crate::types::{OrchestratorError, Result};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Local file path, `:memory:`, or a remote `libsql://...` URL.
    pub turso_url: String,
    /// Auth token for a remote Turso URL; unused for local/in-memory.
    pub turso_auth_token: String,
    pub use_local: bool,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub ollama_url: String,
    /// "openai", "ollama", or "anthropic".
    pub default_provider: Option<String>,
    pub default_model: String,
    /// Model switched to when the turn carries an image attachment (§4.7 step 2).
    pub vision_model: String,
    /// Model used for Memory Composer background summarization.
    pub summarization_model: String,
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let use_local = env::var("USE_LOCAL_DB")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(true);

        let turso_url = if use_local {
            env::var("TURSO_URL").unwrap_or_else(|_| "./data/orchestrator.db".to_string())
        } else {
            env::var("TURSO_URL").map_err(|_| OrchestratorError::InvalidRequest("TURSO_URL is required when USE_LOCAL_DB=false".into()))?
        };
        let turso_auth_token = env::var("TURSO_AUTH_TOKEN").unwrap_or_default();

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| OrchestratorError::InvalidRequest("PORT must be a number".into()))?;

        Ok(Self {
            server: ServerConfig { host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()), port },
            database: DatabaseConfig { turso_url, turso_auth_token, use_local },
            llm: LlmConfig {
                openai_api_key: env::var("OPENAI_API_KEY").ok(),
                openai_api_base: env::var("OPENAI_API_BASE").ok(),
                anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
                ollama_url: env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()),
                default_provider: env::var("DEFAULT_LLM_PROVIDER").ok(),
                default_model: env::var("DEFAULT_LLM_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
                vision_model: env::var("VISION_MODEL").unwrap_or_else(|_| "llava".to_string()),
                summarization_model: env::var("SUMMARIZATION_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            },
        })
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig { host: "127.0.0.1".to_string(), port: 3000 },
            database: DatabaseConfig { turso_url: ":memory:".to_string(), turso_auth_token: String::new(), use_local: true },
            llm: LlmConfig {
                openai_api_key: None,
                openai_api_base: None,
                anthropic_api_key: None,
                ollama_url: "http://localhost:11434".to_string(),
                default_provider: Some("ollama".to_string()),
                default_model: "llama3.2".to_string(),
                vision_model: "llava".to_string(),
                summarization_model: "llama3.2".to_string(),
            },
        }
    }
}
