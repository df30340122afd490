//! Orchestrator (§4.7): the top-level per-turn state machine. Ties the
//! Memory Composer, Classifier/Planner, Tool Registry, Agentic Executor,
//! and persistence repository together into one streamed turn.

use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use futures::{Stream, StreamExt};

use crate::classifier::{Classifier, Planner};
use crate::db::{ConversationRepository, NewMessage};
use crate::embeddings::EmbeddingService;
use crate::executor::AgenticExecutor;
use crate::llm::{ChatMessage, LlmProvider, ModelParams};
use crate::memory::MemoryComposer;
use crate::tools::ToolRegistry;
use crate::types::{AttachmentKind, ChatRequest, Chunk, Complexity, MessageRole, TokenUsage};

const SIMPLE_TOOL_CAP: usize = 5;
const COMPLEX_TOOL_CAP: usize = 8;

pub struct Orchestrator {
    repo: Arc<dyn ConversationRepository>,
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    composer: Arc<MemoryComposer>,
    classifier: Arc<Classifier>,
    planner: Arc<Planner>,
    embeddings: Arc<EmbeddingService>,
    default_model: String,
    vision_model: String,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn ConversationRepository>,
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        composer: Arc<MemoryComposer>,
        classifier: Arc<Classifier>,
        planner: Arc<Planner>,
        embeddings: Arc<EmbeddingService>,
        default_model: impl Into<String>,
        vision_model: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            provider,
            registry,
            composer,
            classifier,
            planner,
            embeddings,
            default_model: default_model.into(),
            vision_model: vision_model.into(),
        }
    }

    /// Runs one turn, yielding an ordered chunk stream. See §8's scenarios
    /// for the exact persistence/ordering contract this must satisfy.
    #[tracing::instrument(skip(self, request), fields(conversation_id = tracing::field::Empty, user_id = %request.user_id))]
    pub fn handle_turn(self: Arc<Self>, request: ChatRequest) -> impl Stream<Item = Chunk> {
        stream! {
            let user_id = request.user_id.clone();

            let conversation_id = match &request.conversation_id {
                Some(id) => match self.repo.get_conversation(id).await {
                    Ok(Some(_)) => id.clone(),
                    Ok(None) => {
                        let err = crate::types::OrchestratorError::InvalidRequest(format!("unknown conversation_id '{id}'"));
                        yield Chunk::error(id, err.category(), err.to_string());
                        return;
                    }
                    Err(e) => {
                        yield Chunk::error(id, e.category(), e.to_string());
                        return;
                    }
                },
                None => match self.repo.create_conversation(&user_id, None).await {
                    Ok(conversation) => conversation.id,
                    Err(e) => {
                        yield Chunk::error("", e.category(), e.to_string());
                        return;
                    }
                },
            };
            tracing::Span::current().record("conversation_id", conversation_id.as_str());

            // Step 1: persist the user message, idempotent against an
            // identical immediately-prior user message.
            let mut user_content = request.message.clone();
            let has_audio_transcription = request.attachments.iter().any(|a| {
                matches!(a.kind, AttachmentKind::Audio | AttachmentKind::Video) && !a.content.is_empty()
            });
            if has_audio_transcription {
                if let Some(attachment) = request.attachments.iter().find(|a| matches!(a.kind, AttachmentKind::Audio | AttachmentKind::Video)) {
                    user_content = format!("{user_content}\n[Audio transcription]: {}", attachment.content);
                }
            }

            let last = self.repo.recent_messages(&conversation_id, 1).await;
            let already_persisted_id = match &last {
                Ok(messages) => messages.last().filter(|m| m.role == MessageRole::User && m.content == user_content).map(|m| m.id.clone()),
                Err(_) => None,
            };

            let user_message_id = match already_persisted_id {
                Some(id) => id,
                None => {
                    let next_seq = match self.repo.latest_sequence_number(&conversation_id).await {
                        Ok(seq) => seq + 1,
                        Err(e) => {
                            yield Chunk::error(&conversation_id, e.category(), e.to_string());
                            return;
                        }
                    };
                    match self.repo.add_message(&conversation_id, MessageRole::User, &user_content, next_seq, NewMessage::default()).await {
                        Ok(message) => message.id,
                        Err(e) => {
                            yield Chunk::error(&conversation_id, e.category(), e.to_string());
                            return;
                        }
                    }
                }
            };

            // Step 2: attachment-driven model switch / transcription injection.
            let has_image = request.attachments.iter().any(|a| a.kind == AttachmentKind::Image);
            let effective_model = if has_image { self.vision_model.clone() } else { self.default_model.clone() };

            // Step 3: memory context.
            let has_attachment = !request.attachments.is_empty();
            let tentative_categories = self.registry.categories();

            let classification = match self.classifier.classify(&user_content, &tentative_categories, has_attachment).await {
                Ok(c) => c,
                Err(e) => {
                    yield Chunk::error(&conversation_id, e.category(), e.to_string());
                    return;
                }
            };

            // Step 5: select tools, downgrading COMPLEX-with-no-tools to
            // SIMPLE before dispatch (§4.5, §9(iii)).
            let mut complexity = classification.complexity;
            let tool_cap = if complexity == Complexity::Complex { COMPLEX_TOOL_CAP } else { SIMPLE_TOOL_CAP };
            let tools = self.registry.filter_for_query(&classification.intent, &user_content, tool_cap);
            if complexity == Complexity::Complex && tools.is_empty() {
                complexity = Complexity::Simple;
            }

            let composed = match self.composer.compose(&conversation_id, &user_id, &user_content, &classification.intent, !tools.is_empty()).await {
                Ok(c) => c,
                Err(e) => {
                    yield Chunk::error(&conversation_id, e.category(), e.to_string());
                    return;
                }
            };

            let mut messages: Vec<ChatMessage> = composed.messages.iter().map(to_chat_message).collect();
            if messages.first().is_some_and(|m| m.role == crate::llm::ChatRole::System) {
                messages[0] = ChatMessage::system(composed.system_prompt.clone());
            } else {
                messages.insert(0, ChatMessage::system(composed.system_prompt.clone()));
            }

            // Step 2 (cont.): attach the image payload to the current turn's
            // user message — persisted history carries no image bytes, so
            // this has to come from the request's own attachments.
            if has_image {
                if let Some(attachment) = request.attachments.iter().find(|a| a.kind == AttachmentKind::Image) {
                    if let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == crate::llm::ChatRole::User) {
                        last_user.image_base64 = Some(attachment.content.clone());
                    }
                }
            }

            let params = ModelParams { temperature: Some(0.7), max_tokens: Some(2048), top_p: None };
            let started = Instant::now();

            // Step 7: dispatch.
            let mut final_content = String::new();
            let mut usage = TokenUsage::default();

            if complexity == Complexity::Complex {
                let plan = match self.planner.plan(&user_content, &tools).await {
                    Ok(plan) => plan,
                    Err(e) => {
                        yield Chunk::error(&conversation_id, e.category(), e.to_string());
                        return;
                    }
                };
                let executor = Arc::new(AgenticExecutor::new(self.provider.clone(), self.registry.clone()));
                let mut executor_stream = executor.run(conversation_id.clone(), effective_model.clone(), params.clone(), messages, plan, tools);
                let mut executor_errored = false;
                while let Some(chunk) = executor_stream.next().await {
                    if let Some(content) = &chunk.content {
                        final_content.push_str(content);
                    }
                    if let Some(u) = chunk.usage {
                        usage = u;
                    }
                    let is_error = chunk.error.is_some();
                    let is_done = chunk.done;
                    yield chunk;
                    if is_error {
                        executor_errored = true;
                        break;
                    }
                    if is_done {
                        break;
                    }
                }
                if executor_errored {
                    // A terminal error chunk already ended the turn; nothing further to persist.
                    return;
                }
            } else {
                let tools_opt = if tools.is_empty() { None } else { Some(tools.as_slice()) };
                let stream_result = self.provider.stream(&messages, &effective_model, &params, tools_opt).await;
                let mut provider_stream = match stream_result {
                    Ok(s) => s,
                    Err(e) => {
                        yield Chunk::error(&conversation_id, e.category(), e.to_string());
                        return;
                    }
                };

                let mut fragments = Vec::new();
                let mut text = String::new();
                let mut round_error = None;
                while let Some(event) = provider_stream.next().await {
                    match event {
                        Ok(crate::llm::StreamEvent::ContentDelta(delta)) => {
                            text.push_str(&delta);
                            yield Chunk::content(&conversation_id, delta);
                        }
                        Ok(crate::llm::StreamEvent::ToolCallDelta(fragment)) => fragments.push(fragment),
                        Ok(crate::llm::StreamEvent::Done { usage: u, .. }) => usage = u,
                        Err(e) => { round_error = Some(e); break; }
                    }
                }
                if let Some(e) = round_error {
                    yield Chunk::error(&conversation_id, e.category(), e.to_string());
                    return;
                }

                let mut tool_calls = crate::executor::merge_fragments(&fragments);
                if tool_calls.is_empty() {
                    if let Some(parsed) = crate::llm::toolcall_parser::parse_tool_call(&text) {
                        tool_calls.push(parsed);
                    }
                }

                if tool_calls.is_empty() {
                    final_content = text;
                } else {
                    let next_seq = match self.repo.latest_sequence_number(&conversation_id).await {
                        Ok(seq) => seq + 1,
                        Err(e) => { yield Chunk::error(&conversation_id, e.category(), e.to_string()); return; }
                    };
                    let mut extra = NewMessage { tool_calls: Some(tool_calls.clone()), ..Default::default() };
                    extra.model = Some(effective_model.clone());
                    if let Err(e) = self.repo.add_message(&conversation_id, MessageRole::Assistant, "", next_seq, extra).await {
                        yield Chunk::error(&conversation_id, e.category(), e.to_string());
                        return;
                    }

                    let mut follow_up = messages.clone();
                    let mut assistant_message = ChatMessage::assistant(text);
                    assistant_message.tool_calls = Some(tool_calls.clone());
                    follow_up.push(assistant_message);

                    for call in &tool_calls {
                        yield Chunk::status(&conversation_id, format!("Executing {}...", call.name));
                        let result_text = match self.registry.execute(&call.name, call.arguments.clone()).await {
                            Ok(value) => value.to_string(),
                            Err(e) => {
                                tracing::warn!(error = %e, tool = %call.name, "tool execution failed, recovering");
                                e.as_tool_message(&call.name)
                            }
                        };
                        follow_up.push(ChatMessage::tool_result(call.id.clone(), result_text.clone()));

                        let seq = match self.repo.latest_sequence_number(&conversation_id).await {
                            Ok(seq) => seq + 1,
                            Err(e) => { yield Chunk::error(&conversation_id, e.category(), e.to_string()); return; }
                        };
                        let extra = NewMessage { tool_call_id: Some(call.id.clone()), ..Default::default() };
                        if let Err(e) = self.repo.add_message(&conversation_id, MessageRole::Tool, &result_text, seq, extra).await {
                            yield Chunk::error(&conversation_id, e.category(), e.to_string());
                            return;
                        }
                    }

                    let synth_result = self.provider.stream(&follow_up, &effective_model, &params, None).await;
                    let mut synth_stream = match synth_result {
                        Ok(s) => s,
                        Err(e) => { yield Chunk::error(&conversation_id, e.category(), e.to_string()); return; }
                    };
                    let mut synth_text = String::new();
                    let mut synth_error = None;
                    while let Some(event) = synth_stream.next().await {
                        match event {
                            Ok(crate::llm::StreamEvent::ContentDelta(delta)) => {
                                synth_text.push_str(&delta);
                                yield Chunk::content(&conversation_id, delta);
                            }
                            Ok(crate::llm::StreamEvent::ToolCallDelta(_)) => {}
                            Ok(crate::llm::StreamEvent::Done { usage: u, .. }) => usage = u,
                            Err(e) => { synth_error = Some(e); break; }
                        }
                    }
                    if let Some(e) = synth_error {
                        yield Chunk::error(&conversation_id, e.category(), e.to_string());
                        return;
                    }
                    final_content = synth_text;
                }
            }

            // Step 8: persist final assistant message, schedule background
            // embedding, conditionally summarize.
            let latency_ms = started.elapsed().as_millis() as i64;
            let next_seq = match self.repo.latest_sequence_number(&conversation_id).await {
                Ok(seq) => seq + 1,
                Err(e) => { yield Chunk::error(&conversation_id, e.category(), e.to_string()); return; }
            };
            let extra = NewMessage {
                prompt_tokens: Some(usage.prompt_tokens as i64),
                completion_tokens: Some(usage.completion_tokens as i64),
                model: Some(effective_model.clone()),
                latency_ms: Some(latency_ms),
                finish_reason: Some("stop".to_string()),
                ..Default::default()
            };
            let assistant_message = self.repo.add_message(&conversation_id, MessageRole::Assistant, &final_content, next_seq, extra).await;

            metrics::histogram!("orchestrator.turn_duration_ms", "intent" => classification.intent.clone()).record(latency_ms as f64);
            metrics::counter!("orchestrator.classifications", "intent" => classification.intent.clone(), "complexity" => format!("{complexity:?}")).increment(1);

            if let Ok(assistant_message) = assistant_message {
                let embeddings = self.embeddings.clone();
                let repo = self.repo.clone();
                let user_text = user_content.clone();
                let assistant_text = final_content.clone();
                let assistant_id = assistant_message.id.clone();
                let user_msg_id = user_message_id.clone();
                tokio::spawn(async move {
                    if let Ok(vector) = embeddings.embed_text(&user_text).await {
                        if let Err(e) = repo.update_message_embedding(&user_msg_id, &vector).await {
                            tracing::warn!(error = %e, "background user-message embedding failed to persist");
                        }
                    } else {
                        tracing::warn!("background user-message embedding failed");
                    }
                    if let Ok(vector) = embeddings.embed_text(&assistant_text).await {
                        if let Err(e) = repo.update_message_embedding(&assistant_id, &vector).await {
                            tracing::warn!(error = %e, "background assistant-message embedding failed to persist");
                        }
                    } else {
                        tracing::warn!("background assistant-message embedding failed");
                    }
                });
            }

            self.composer.maybe_summarize(&conversation_id).await;

            yield Chunk::done(&conversation_id, usage);
        }
    }
}

fn to_chat_message(message: &crate::types::Message) -> ChatMessage {
    match message.role {
        MessageRole::System => ChatMessage::system(message.content.clone()),
        MessageRole::User => ChatMessage::user(message.content.clone()),
        MessageRole::Assistant => {
            let mut chat_message = ChatMessage::assistant(message.content.clone());
            chat_message.tool_calls = message.tool_calls.clone();
            chat_message
        }
        MessageRole::Tool => ChatMessage::tool_result(message.tool_call_id.clone().unwrap_or_default(), message.content.clone()),
    }
}
