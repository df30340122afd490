//! Agentic Executor (§4.6): runs a Planner-produced plan as a ReAct loop,
//! bounded by an 8-round / 300-second cap, streaming status and content
//! chunks to the caller as it goes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_stream::stream;
use futures::{Stream, StreamExt};

use crate::llm::toolcall_parser;
use crate::llm::{ChatMessage, LlmProvider, ModelParams, StreamEvent};
use crate::tools::ToolRegistry;
use crate::types::{Chunk, OrchestratorError, PlanStep, TokenUsage, ToolCall, ToolDescriptor};

const MAX_ROUNDS: u32 = 8;
const EXECUTOR_TIMEOUT: Duration = Duration::from_secs(300);

pub struct AgenticExecutor {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
}

impl AgenticExecutor {
    pub fn new(provider: Arc<dyn LlmProvider>, registry: Arc<ToolRegistry>) -> Self {
        Self { provider, registry }
    }

    /// Drives the plan to completion, yielding chunks in strict order:
    /// status chunks for a round precede that round's content chunks,
    /// content from a round precedes any content from a later round. The
    /// returned stream's final item is always terminal (`done=true` or
    /// `error` set).
    pub fn run(
        self: Arc<Self>,
        conversation_id: String,
        model: String,
        params: ModelParams,
        mut messages: Vec<ChatMessage>,
        plan: Vec<PlanStep>,
        mut tools: Vec<ToolDescriptor>,
    ) -> impl Stream<Item = Chunk> {
        stream! {
            let started = Instant::now();
            let plan_text = plan.iter().map(|s| format!("{}. {}", s.index + 1, s.description)).collect::<Vec<_>>().join("\n");
            yield Chunk::status(&conversation_id, format!("Plan ({} steps):\n{plan_text}", plan.len()));

            let tool_names: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();
            let agentic_prompt = format!(
                "You are executing a multi-step plan.\n\nPlan:\n{plan_text}\n\n\
                 Available tools: {}\nYou have at most {MAX_ROUNDS} rounds. \
                 Call a tool when the current step needs one, or give a final answer.",
                tool_names.join(", ")
            );
            messages.push(ChatMessage::system(agentic_prompt));

            let mut step_index: usize = 0;
            messages.push(ChatMessage::user(next_step_guidance(&plan, step_index)));

            let mut round: u32 = 0;
            let mut usage = TokenUsage::default();

            loop {
                if started.elapsed() >= EXECUTOR_TIMEOUT || round >= MAX_ROUNDS {
                    tools.clear();
                }

                round += 1;
                let round_tools: Option<&[ToolDescriptor]> = if tools.is_empty() { None } else { Some(&tools) };
                let stream_result = self.provider.stream(&messages, &model, &params, round_tools).await;

                let mut provider_stream = match stream_result {
                    Ok(s) => s,
                    Err(e) => {
                        yield Chunk::error(&conversation_id, e.category(), e.to_string());
                        return;
                    }
                };

                let mut text = String::new();
                let mut fragments: Vec<crate::llm::client::ToolCallFragment> = Vec::new();
                let mut round_error: Option<OrchestratorError> = None;

                while let Some(event) = provider_stream.next().await {
                    match event {
                        Ok(StreamEvent::ContentDelta(delta)) => {
                            text.push_str(&delta);
                            yield Chunk::content(&conversation_id, delta);
                        }
                        Ok(StreamEvent::ToolCallDelta(fragment)) => fragments.push(fragment),
                        Ok(StreamEvent::Done { usage: round_usage, .. }) => {
                            usage.prompt_tokens += round_usage.prompt_tokens;
                            usage.completion_tokens += round_usage.completion_tokens;
                        }
                        Err(e) => {
                            round_error = Some(e);
                            break;
                        }
                    }
                }

                if let Some(e) = round_error {
                    yield Chunk::error(&conversation_id, e.category(), e.to_string());
                    return;
                }

                let mut tool_calls = merge_fragments(&fragments);
                if tool_calls.is_empty() {
                    if let Some(parsed) = toolcall_parser::parse_tool_call(&text) {
                        tool_calls.push(parsed);
                    }
                }

                if tool_calls.is_empty() {
                    yield Chunk::done(&conversation_id, usage);
                    return;
                }

                if tools.is_empty() {
                    // Forced synthesis round produced calls anyway — ignore them, terminate.
                    yield Chunk::done(&conversation_id, usage);
                    return;
                }

                let mut assistant_message = ChatMessage::assistant(text.clone());
                assistant_message.tool_calls = Some(tool_calls.clone());
                messages.push(assistant_message);

                let call_count = tool_calls.len();

                for (i, call) in tool_calls.into_iter().enumerate() {
                    yield Chunk::status(&conversation_id, format!("Step {}/{call_count}: Calling {}...", i + 1, call.name));

                    let outcome = self.registry.execute(&call.name, call.arguments.clone()).await;
                    let result_text = match outcome {
                        Ok(value) => {
                            yield Chunk::status(&conversation_id, format!("Step {}/{call_count}: {} \u{2705}", i + 1, call.name));
                            value.to_string()
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, tool = %call.name, "tool execution failed, recovering");
                            e.as_tool_message(&call.name)
                        }
                    };
                    messages.push(ChatMessage::tool_result(call.id, result_text));
                }

                step_index += 1;
                expand_tools(&self.registry, &mut tools, &text);

                let guidance = if step_index >= plan.len().max(1) {
                    "All planned steps are complete. Provide the final synthesized answer now with no further tool calls.".to_string()
                } else {
                    next_step_guidance(&plan, step_index)
                };
                messages.push(ChatMessage::user(guidance));
            }
        }
    }
}

fn next_step_guidance(plan: &[PlanStep], step_index: usize) -> String {
    match plan.get(step_index) {
        Some(step) => format!(
            "Now perform step {} of {}: {}. Call a tool if needed, or answer directly if this step requires no tool.",
            step_index + 1,
            plan.len(),
            step.description
        ),
        None => "Provide the final synthesized answer now with no further tool calls.".to_string(),
    }
}

/// Merges streamed tool-call fragments by index into complete `ToolCall`s,
/// parsing each fragment's accumulated JSON arguments.
pub(crate) fn merge_fragments(fragments: &[crate::llm::client::ToolCallFragment]) -> Vec<ToolCall> {
    use std::collections::BTreeMap;
    let mut by_index: BTreeMap<usize, (Option<String>, Option<String>, String)> = BTreeMap::new();
    for fragment in fragments {
        let entry = by_index.entry(fragment.index).or_insert((None, None, String::new()));
        if fragment.id.is_some() {
            entry.0 = fragment.id.clone();
        }
        if fragment.name.is_some() {
            entry.1 = fragment.name.clone();
        }
        if let Some(piece) = &fragment.arguments_fragment {
            entry.2.push_str(piece);
        }
    }

    by_index
        .into_values()
        .filter_map(|(id, name, args)| {
            let name = name?;
            let arguments = serde_json::from_str(&args).unwrap_or(serde_json::Value::Object(Default::default()));
            Some(ToolCall { id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()), name, arguments })
        })
        .collect()
}

/// Expands the attached tool list with tools from categories mentioned by
/// name in the accumulated text, subject to the 8-tool cap.
fn expand_tools(registry: &ToolRegistry, tools: &mut Vec<ToolDescriptor>, text: &str) {
    const TOOL_CAP: usize = 8;
    if tools.len() >= TOOL_CAP {
        return;
    }
    let lower = text.to_ascii_lowercase();
    let present: std::collections::HashSet<String> = tools.iter().map(|t| t.name.clone()).collect();

    for category in registry.categories() {
        if tools.len() >= TOOL_CAP {
            break;
        }
        if !lower.contains(&category.to_ascii_lowercase()) {
            continue;
        }
        for descriptor in registry.by_category(&category) {
            if tools.len() >= TOOL_CAP {
                break;
            }
            if present.contains(&descriptor.name) {
                continue;
            }
            tools.push(descriptor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_step_guidance_reports_completion_past_plan_length() {
        let plan = vec![PlanStep { index: 0, description: "do thing".to_string() }];
        let guidance = next_step_guidance(&plan, 1);
        assert!(guidance.contains("final synthesized answer"));
    }

    #[test]
    fn merge_fragments_accumulates_arguments_by_index() {
        let fragments = vec![
            crate::llm::client::ToolCallFragment { index: 0, id: Some("call-1".into()), name: Some("calculator".into()), arguments_fragment: Some("{\"a\":".into()) },
            crate::llm::client::ToolCallFragment { index: 0, id: None, name: None, arguments_fragment: Some("1}".into()) },
        ];
        let calls = merge_fragments(&fragments);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "calculator");
        assert_eq!(calls[0].arguments["a"], 1);
    }
}
