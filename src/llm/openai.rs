//! OpenAI provider: API-based inference, including Azure/OpenRouter-compatible
//! endpoints reachable by overriding the base URL.

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCalls, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPart,
        ChatCompletionRequestMessageContentPartImage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionTool, ChatCompletionTools,
        CreateChatCompletionRequestArgs, FunctionObject, ImageUrl,
    },
    Client,
};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;

use crate::llm::client::{
    provider_protocol, provider_unavailable, ChatMessage, ChatRole, ChatStream, LlmProvider,
    LlmResponse, ModelParams, StreamEvent, ToolCallFragment,
};
use crate::types::{Result, TokenUsage, ToolCall, ToolDescriptor};

pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    pub fn new(api_key: String, api_base: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key).with_api_base(api_base);
        Self {
            client: Client::with_config(config),
        }
    }

    fn convert_tool(tool: &ToolDescriptor) -> ChatCompletionTools {
        ChatCompletionTools::Function(ChatCompletionTool {
            function: FunctionObject {
                name: tool.name.clone(),
                description: Some(tool.description.clone()),
                parameters: Some(tool.schema.clone()),
                strict: None,
            },
        })
    }

    fn convert_message(msg: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
        let built = match msg.role {
            ChatRole::System => ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(msg.content.as_str())
                    .build()
                    .map_err(provider_protocol)?,
            ),
            ChatRole::User => {
                let content = match &msg.image_base64 {
                    Some(base64) => ChatCompletionRequestUserMessageContent::Array(vec![
                        ChatCompletionRequestMessageContentPart::Text(msg.content.as_str().into()),
                        ChatCompletionRequestMessageContentPart::ImageUrl(ChatCompletionRequestMessageContentPartImage {
                            image_url: ImageUrl {
                                url: format!("data:image/jpeg;base64,{base64}"),
                                detail: None,
                            },
                        }),
                    ]),
                    None => ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                };
                ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(content)
                        .build()
                        .map_err(provider_protocol)?,
                )
            }
            ChatRole::Assistant => ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(msg.content.as_str())
                    .build()
                    .map_err(provider_protocol)?,
            ),
            ChatRole::Tool => ChatCompletionRequestMessage::Tool(
                ChatCompletionRequestToolMessageArgs::default()
                    .content(msg.content.as_str())
                    .tool_call_id(msg.tool_call_id.clone().unwrap_or_default())
                    .build()
                    .map_err(provider_protocol)?,
            ),
        };
        Ok(built)
    }

    fn extract_tool_calls(tool_calls: &[ChatCompletionMessageToolCalls]) -> Vec<ToolCall> {
        tool_calls
            .iter()
            .filter_map(|wrapper| match wrapper {
                ChatCompletionMessageToolCalls::Function(call) => Some(ToolCall {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    arguments: serde_json::from_str(&call.function.arguments).unwrap_or(serde_json::json!({})),
                }),
                ChatCompletionMessageToolCalls::Custom(_) => None,
            })
            .collect()
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &ModelParams,
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<async_openai::types::chat::CreateChatCompletionRequest> {
        let converted: Result<Vec<_>> = messages.iter().map(Self::convert_message).collect();
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(model);
        builder.messages(converted?);
        if let Some(temp) = params.temperature {
            builder.temperature(temp);
        }
        if let Some(max_tokens) = params.max_tokens {
            builder.max_completion_tokens(max_tokens);
        }
        if let Some(top_p) = params.top_p {
            builder.top_p(top_p);
        }
        if let Some(tools) = tools {
            if !tools.is_empty() {
                builder.tools(tools.iter().map(Self::convert_tool).collect::<Vec<_>>());
            }
        }
        builder.build().map_err(provider_protocol)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &ModelParams,
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<LlmResponse> {
        let request = self.build_request(messages, model, params, tools)?;
        let started = std::time::Instant::now();

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(provider_unavailable)?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| provider_protocol("no choices in response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .as_deref()
            .map(Self::extract_tool_calls)
            .unwrap_or_default();

        let mut message = ChatMessage::assistant(choice.message.content.unwrap_or_default());
        if !tool_calls.is_empty() {
            message.tool_calls = Some(tool_calls);
        }

        let usage = response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            message,
            usage,
            latency_ms: started.elapsed().as_millis() as u64,
            finish_reason: choice
                .finish_reason
                .map(|r| format!("{r:?}").to_lowercase())
                .unwrap_or_else(|| "stop".to_string()),
        })
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &ModelParams,
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<ChatStream> {
        let mut request = self.build_request(messages, model, params, tools)?;
        request.stream = Some(true);

        let response_stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(provider_unavailable)?;

        let output = stream! {
            let mut response_stream = response_stream;
            let mut usage = TokenUsage::default();
            let mut finish_reason = "stop".to_string();
            while let Some(result) = response_stream.next().await {
                match result {
                    Ok(chunk) => {
                        if let Some(u) = chunk.usage {
                            usage = TokenUsage {
                                prompt_tokens: u.prompt_tokens,
                                completion_tokens: u.completion_tokens,
                            };
                        }
                        if let Some(choice) = chunk.choices.into_iter().next() {
                            if let Some(reason) = choice.finish_reason {
                                finish_reason = format!("{reason:?}").to_lowercase();
                            }
                            if let Some(content) = choice.delta.content {
                                if !content.is_empty() {
                                    yield Ok(StreamEvent::ContentDelta(content));
                                }
                            }
                            if let Some(tool_calls) = choice.delta.tool_calls {
                                for tc in tool_calls {
                                    yield Ok(StreamEvent::ToolCallDelta(ToolCallFragment {
                                        index: tc.index as usize,
                                        id: tc.id,
                                        name: tc.function.as_ref().and_then(|f| f.name.clone()),
                                        arguments_fragment: tc.function.and_then(|f| f.arguments),
                                    }));
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(provider_unavailable(e));
                        return;
                    }
                }
            }
            yield Ok(StreamEvent::Done { usage, finish_reason });
        };

        Ok(Box::pin(output))
    }

    async fn health_check(&self) -> Result<()> {
        self.client.models().list().await.map_err(provider_unavailable)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
