//! Ollama provider: local LLM inference, recommended for local/offline use.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage as OllamaChatMessage, MessageRole as OllamaRole},
    generation::images::Image as OllamaImage,
    generation::tools::{ToolCall as OllamaToolCall, ToolFunctionInfo, ToolInfo, ToolType},
    models::ModelOptions,
    Ollama,
};

use crate::llm::client::{
    provider_unavailable, ChatMessage, ChatRole, ChatStream, LlmProvider, LlmResponse, ModelParams,
    StreamEvent,
};
use crate::types::{OrchestratorError, Result, TokenUsage, ToolCall, ToolDescriptor};

pub struct OllamaProvider {
    client: Ollama,
}

/// Lenient `OLLAMA_URL` parsing: accepts `http://host:port`, `host:port`,
/// or a bare `host` (defaulting to the standard 11434 port), since
/// operators tend to configure this loosely.
fn parse_host_port(base_url: &str) -> Result<(String, u16)> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(OrchestratorError::InvalidRequest("OLLAMA_URL is empty".into()));
    }
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);
    let host_port = without_scheme.split(['/', '?', '#']).next().unwrap_or("localhost:11434");
    match host_port.rfind(':') {
        Some(idx) => {
            let port: u16 = host_port[idx + 1..]
                .parse()
                .map_err(|_| OrchestratorError::InvalidRequest(format!("invalid OLLAMA_URL port in '{base_url}'")))?;
            Ok((host_port[..idx].to_string(), port))
        }
        None => Ok((host_port.to_string(), 11434)),
    }
}

impl OllamaProvider {
    /// `base_url` accepts `http://host:port`, `host:port`, or bare `host`
    /// (defaulting to the standard 11434 port) since operators tend to
    /// configure this loosely.
    pub fn new(base_url: &str) -> Result<Self> {
        let (host, port) = parse_host_port(base_url)?;
        Ok(Self {
            client: Ollama::new(format!("http://{host}"), port),
        })
    }

    fn model_options(params: &ModelParams) -> ModelOptions {
        let mut options = ModelOptions::default();
        if let Some(temp) = params.temperature {
            options = options.temperature(temp);
        }
        if let Some(max_tokens) = params.max_tokens {
            options = options.num_predict(max_tokens as i32);
        }
        if let Some(top_p) = params.top_p {
            options = options.top_p(top_p);
        }
        options
    }

    fn convert_message(msg: &ChatMessage) -> OllamaChatMessage {
        let role = match msg.role {
            ChatRole::System => OllamaRole::System,
            ChatRole::User => OllamaRole::User,
            ChatRole::Assistant => OllamaRole::Assistant,
            ChatRole::Tool => OllamaRole::Tool,
        };
        let mut converted = OllamaChatMessage::new(role, msg.content.clone());
        if let Some(base64) = &msg.image_base64 {
            converted.images = Some(vec![OllamaImage::from_base64(base64)]);
        }
        converted
    }

    fn convert_tool(tool: &ToolDescriptor) -> ToolInfo {
        ToolInfo {
            tool_type: ToolType::Function,
            function: ToolFunctionInfo {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: serde_json::from_value(tool.schema.clone()).unwrap_or_default(),
            },
        }
    }

    fn convert_tool_call(call: &OllamaToolCall) -> ToolCall {
        ToolCall {
            id: uuid::Uuid::new_v4().to_string(),
            name: call.function.name.clone(),
            arguments: call.function.arguments.clone(),
        }
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &ModelParams,
        tools: Option<&[ToolDescriptor]>,
    ) -> ChatMessageRequest {
        let converted: Vec<_> = messages.iter().map(Self::convert_message).collect();
        let mut request = ChatMessageRequest::new(model.to_string(), converted).options(Self::model_options(params));
        if let Some(tools) = tools {
            if !tools.is_empty() {
                request = request.tools(tools.iter().map(Self::convert_tool).collect::<Vec<_>>());
            }
        }
        request
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &ModelParams,
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<LlmResponse> {
        let request = self.build_request(messages, model, params, tools);
        let started = std::time::Instant::now();

        let response = self.client.send_chat_messages(request).await.map_err(provider_unavailable)?;

        let tool_calls: Vec<ToolCall> = response
            .message
            .tool_calls
            .iter()
            .map(Self::convert_tool_call)
            .collect();

        let mut message = ChatMessage::assistant(response.message.content);
        let finish_reason = if tool_calls.is_empty() { "stop" } else { "tool_calls" }.to_string();
        if !tool_calls.is_empty() {
            message.tool_calls = Some(tool_calls);
        }

        let usage = TokenUsage {
            prompt_tokens: response.prompt_eval_count.unwrap_or(0) as u32,
            completion_tokens: response.eval_count.unwrap_or(0) as u32,
        };

        Ok(LlmResponse {
            message,
            usage,
            latency_ms: started.elapsed().as_millis() as u64,
            finish_reason,
        })
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &ModelParams,
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<ChatStream> {
        let request = self.build_request(messages, model, params, tools);
        let mut response_stream = self
            .client
            .send_chat_messages_stream(request)
            .await
            .map_err(provider_unavailable)?;

        let output = stream! {
            let mut usage = TokenUsage::default();
            while let Some(chunk) = response_stream.next().await {
                match chunk {
                    Ok(chunk) => {
                        if let Some(count) = chunk.eval_count {
                            usage.completion_tokens = count as u32;
                        }
                        if let Some(count) = chunk.prompt_eval_count {
                            usage.prompt_tokens = count as u32;
                        }
                        if !chunk.message.content.is_empty() {
                            yield Ok(StreamEvent::ContentDelta(chunk.message.content));
                        }
                        if chunk.done {
                            yield Ok(StreamEvent::Done { usage, finish_reason: "stop".to_string() });
                            return;
                        }
                    }
                    Err(e) => {
                        yield Err(provider_unavailable(e));
                        return;
                    }
                }
            }
            yield Ok(StreamEvent::Done { usage, finish_reason: "stop".to_string() });
        };

        Ok(Box::pin(output))
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .list_local_models()
            .await
            .map_err(provider_unavailable)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_host_and_port() {
        let (host, port) = parse_host_port("http://example.com:9000").unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(port, 9000);
    }

    #[test]
    fn defaults_port_when_absent() {
        let (host, port) = parse_host_port("my-ollama-host").unwrap();
        assert_eq!(host, "my-ollama-host");
        assert_eq!(port, 11434);
    }

    #[test]
    fn strips_trailing_path_and_query() {
        let (host, port) = parse_host_port("https://ollama.local:1234/v1?foo=bar").unwrap();
        assert_eq!(host, "ollama.local");
        assert_eq!(port, 1234);
    }

    #[test]
    fn empty_url_is_rejected() {
        assert!(parse_host_port("   ").is_err());
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        assert!(parse_host_port("localhost:not-a-port").is_err());
    }

    #[test]
    fn new_accepts_a_bare_host_and_constructs_a_client() {
        assert!(OllamaProvider::new("localhost:11434").is_ok());
    }
}
