//! A scripted `LlmProvider` double, so executor/classifier/orchestrator
//! tests can exercise real control flow without a live model backend.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use conductor::llm::client::{ChatMessage, ChatStream, LlmProvider, LlmResponse, ModelParams, StreamEvent, ToolCallFragment};
use conductor::types::{OrchestratorError, Result, TokenUsage, ToolCall, ToolDescriptor};
use futures::stream;

/// One scripted provider turn, consumed in order by successive `complete`/`stream` calls.
pub enum ScriptedTurn {
    Content(String),
    ToolCall { name: String, arguments: serde_json::Value },
    Error(OrchestratorError),
}

pub struct ScriptedProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self { turns: Mutex::new(turns.into_iter().collect()) }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _model: &str,
        _params: &ModelParams,
        _tools: Option<&[ToolDescriptor]>,
    ) -> Result<LlmResponse> {
        let turn = self.turns.lock().unwrap().pop_front();
        match turn {
            Some(ScriptedTurn::Content(text)) => Ok(LlmResponse {
                message: ChatMessage::assistant(text),
                usage: TokenUsage::default(),
                latency_ms: 0,
                finish_reason: "stop".to_string(),
            }),
            Some(ScriptedTurn::ToolCall { name, arguments }) => {
                let mut message = ChatMessage::assistant(String::new());
                message.tool_calls = Some(vec![ToolCall { id: "call-1".to_string(), name, arguments }]);
                Ok(LlmResponse { message, usage: TokenUsage::default(), latency_ms: 0, finish_reason: "tool_calls".to_string() })
            }
            Some(ScriptedTurn::Error(e)) => Err(e),
            None => Ok(LlmResponse {
                message: ChatMessage::assistant(String::new()),
                usage: TokenUsage::default(),
                latency_ms: 0,
                finish_reason: "stop".to_string(),
            }),
        }
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &ModelParams,
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<ChatStream> {
        let response = self.complete(messages, model, params, tools).await?;
        let mut events = Vec::new();
        if !response.message.content.is_empty() {
            events.push(Ok(StreamEvent::ContentDelta(response.message.content.clone())));
        }
        if let Some(calls) = &response.message.tool_calls {
            for call in calls {
                events.push(Ok(StreamEvent::ToolCallDelta(ToolCallFragment {
                    index: 0,
                    id: Some(call.id.clone()),
                    name: Some(call.name.clone()),
                    arguments_fragment: Some(call.arguments.to_string()),
                })));
            }
        }
        events.push(Ok(StreamEvent::Done { usage: response.usage, finish_reason: response.finish_reason }));
        Ok(Box::pin(stream::iter(events)))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
