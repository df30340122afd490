//! Anthropic Claude provider.

use async_stream::stream;
use async_trait::async_trait;
use claude_sdk::{ClaudeClient, ContentBlock, Message as ClaudeMessage, MessagesRequest, StopReason, StreamEvent as ClaudeStreamEvent, Tool};
use futures::StreamExt;

use crate::llm::client::{
    provider_unavailable, ChatMessage, ChatRole, ChatStream, LlmProvider, LlmResponse, ModelParams,
    StreamEvent,
};
use crate::types::{Result, TokenUsage, ToolCall, ToolDescriptor};

pub struct AnthropicProvider {
    client: ClaudeClient,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: ClaudeClient::anthropic(api_key),
        }
    }

    fn convert_tool(tool: &ToolDescriptor) -> Tool {
        Tool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.schema.clone(),
            disable_user_input: None,
            input_examples: None,
            cache_control: None,
        }
    }

    fn extract_text(content: &[ContentBlock]) -> String {
        content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    fn extract_tool_calls(content: &[ContentBlock]) -> Vec<ToolCall> {
        content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input, .. } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    fn stop_reason_to_str(reason: Option<StopReason>) -> String {
        match reason {
            Some(StopReason::EndTurn) => "stop",
            Some(StopReason::MaxTokens) => "length",
            Some(StopReason::StopSequence) => "stop",
            Some(StopReason::ToolUse) => "tool_calls",
            Some(StopReason::PauseTurn) => "stop",
            None => "stop",
        }
        .to_string()
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &ModelParams,
        tools: Option<&[ToolDescriptor]>,
    ) -> MessagesRequest {
        let mut system: Option<String> = None;
        let claude_messages: Vec<ClaudeMessage> = messages
            .iter()
            .filter_map(|m| match m.role {
                ChatRole::System => {
                    system = Some(m.content.clone());
                    None
                }
                ChatRole::Assistant => Some(ClaudeMessage::assistant(m.content.clone())),
                // Claude has no distinct tool role in this shim; fold tool
                // results into a user turn, prefixed with the call id.
                ChatRole::Tool => Some(ClaudeMessage::user(format!(
                    "[tool result {}]: {}",
                    m.tool_call_id.clone().unwrap_or_default(),
                    m.content
                ))),
                ChatRole::User => Some(match &m.image_base64 {
                    Some(base64) => ClaudeMessage::user_blocks(vec![
                        ContentBlock::Text { text: m.content.clone(), cache_control: None },
                        ContentBlock::Image { media_type: "image/jpeg".to_string(), data: base64.clone(), cache_control: None },
                    ]),
                    None => ClaudeMessage::user(m.content.clone()),
                }),
            })
            .collect();

        let max_tokens = params.max_tokens.unwrap_or(1024);
        let mut request = MessagesRequest::new(model.to_string(), max_tokens, claude_messages);
        if let Some(temp) = params.temperature {
            request = request.with_temperature(temp);
        }
        if let Some(sys) = system {
            request = request.with_system(sys);
        }
        if let Some(tools) = tools {
            if !tools.is_empty() {
                request = request.with_tools(tools.iter().map(Self::convert_tool).collect::<Vec<_>>());
            }
        }
        request
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &ModelParams,
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<LlmResponse> {
        let request = self.build_request(messages, model, params, tools);
        let started = std::time::Instant::now();

        let response = self.client.send_message(request).await.map_err(provider_unavailable)?;

        let tool_calls = Self::extract_tool_calls(&response.content);
        let mut message = ChatMessage::assistant(Self::extract_text(&response.content));
        if !tool_calls.is_empty() {
            message.tool_calls = Some(tool_calls);
        }

        Ok(LlmResponse {
            message,
            usage: TokenUsage {
                prompt_tokens: response.usage.input_tokens as u32,
                completion_tokens: response.usage.output_tokens as u32,
            },
            latency_ms: started.elapsed().as_millis() as u64,
            finish_reason: Self::stop_reason_to_str(response.stop_reason),
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
        let claude_stream = self.client.send_streaming(request).await.map_err(provider_unavailable)?;

        let output = stream! {
            let mut claude_stream = claude_stream;
            let usage = TokenUsage::default();
            while let Some(event) = claude_stream.next().await {
                match event {
                    Ok(ClaudeStreamEvent::ContentBlockDelta { delta, .. }) => {
                        if let Some(text) = delta.text() {
                            yield Ok(StreamEvent::ContentDelta(text.to_string()));
                        }
                    }
                    Ok(_) => {}
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
        // claude-sdk has no dedicated health endpoint; a minimal completion
        // request with max_tokens=1 is the cheapest live probe available.
        let request = MessagesRequest::new("claude-3-5-haiku-latest".to_string(), 1, vec![ClaudeMessage::user("ping")]);
        self.client.send_message(request).await.map_err(provider_unavailable)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}
