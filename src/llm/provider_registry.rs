//! Provider selection: turns `OrchestratorConfig` into a live
//! `Box<dyn LlmProvider>` for the orchestrator's composition root (§4, §6).
//!
//! Provider choice is static per process (set at startup from config/env,
//! not renegotiated per request), so this is a thin factory rather than a
//! dynamic multi-provider router.

use std::sync::Arc;

use crate::llm::client::LlmProvider;
use crate::types::{OrchestratorError, Result};

#[cfg(feature = "openai")]
use crate::llm::openai::OpenAiProvider;

#[cfg(feature = "ollama")]
use crate::llm::ollama::OllamaProvider;

#[cfg(feature = "anthropic")]
use crate::llm::anthropic::AnthropicProvider;

/// Which provider backend to construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Ollama,
    Anthropic,
}

impl ProviderKind {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(OrchestratorError::InvalidRequest(format!(
                "unknown LLM provider '{other}'"
            ))),
        }
    }
}

/// Configuration needed to construct any one of the supported providers.
/// Fields beyond the selected `kind` are simply unused.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub kind: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub ollama_url: Option<String>,
    pub anthropic_api_key: Option<String>,
}

/// Builds the configured provider. Called once at startup; the resulting
/// `Arc<dyn LlmProvider>` is shared across all in-flight turns.
pub struct ProviderRegistry;

impl ProviderRegistry {
    pub fn build(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
        let kind = match &config.kind {
            Some(k) => ProviderKind::from_str(k)?,
            None => ProviderKind::Ollama,
        };

        match kind {
            #[cfg(feature = "openai")]
            ProviderKind::OpenAi => {
                let api_key = config
                    .openai_api_key
                    .clone()
                    .ok_or_else(|| OrchestratorError::InvalidRequest("OPENAI_API_KEY is required".into()))?;
                let api_base = config
                    .openai_base_url
                    .clone()
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
                let provider = OpenAiProvider::new(api_key, api_base);
                Ok(Arc::new(provider))
            }
            #[cfg(not(feature = "openai"))]
            ProviderKind::OpenAi => Err(OrchestratorError::InvalidRequest(
                "this build was compiled without the 'openai' feature".into(),
            )),

            #[cfg(feature = "ollama")]
            ProviderKind::Ollama => {
                let url = config.ollama_url.as_deref().unwrap_or("http://localhost:11434");
                let provider = OllamaProvider::new(url)?;
                Ok(Arc::new(provider))
            }
            #[cfg(not(feature = "ollama"))]
            ProviderKind::Ollama => Err(OrchestratorError::InvalidRequest(
                "this build was compiled without the 'ollama' feature".into(),
            )),

            #[cfg(feature = "anthropic")]
            ProviderKind::Anthropic => {
                let api_key = config
                    .anthropic_api_key
                    .clone()
                    .ok_or_else(|| OrchestratorError::InvalidRequest("ANTHROPIC_API_KEY is required".into()))?;
                let provider = AnthropicProvider::new(api_key);
                Ok(Arc::new(provider))
            }
            #[cfg(not(feature = "anthropic"))]
            ProviderKind::Anthropic => Err(OrchestratorError::InvalidRequest(
                "this build was compiled without the 'anthropic' feature".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds() {
        assert_eq!(ProviderKind::from_str("openai").unwrap(), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::from_str("Ollama").unwrap(), ProviderKind::Ollama);
        assert_eq!(ProviderKind::from_str("claude").unwrap(), ProviderKind::Anthropic);
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(ProviderKind::from_str("bogus").is_err());
    }
}
