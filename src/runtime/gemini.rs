// src/runtime/gemini.rs — Agent runtime backed by the Gemini streaming API
//
// Each user message streams one or more model turns. Function calls in a turn
// are answered from the tool registry and fed back as another turn, bounded by
// `max_tool_rounds`. Usage is reported once per turn, from the last
// usageMetadata the turn carried.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::HeaderValue;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde_json::{json, Value};

use super::store::ConversationStore;
use super::tools::ToolRegistry;
use super::{AgentRuntime, EventStream, RuntimeError, StreamEvent, TokenUsage};
use crate::infra::config::AgentConfig;

pub struct GeminiRuntime {
    inner: Arc<Inner>,
}

struct Inner {
    agent_name: String,
    model: String,
    instruction: String,
    api_key: Option<String>,
    api_base: String,
    max_tool_rounds: u32,
    tools: ToolRegistry,
    store: ConversationStore,
    client: reqwest::Client,
}

const API_KEY_HEADER: &str = "x-goog-api-key";

/// What one SSE chunk contributed to the current turn.
#[derive(Debug, Default, PartialEq)]
struct TurnChunk {
    texts: Vec<String>,
    calls: Vec<(String, Value)>,
    usage: Option<TokenUsage>,
}

impl GeminiRuntime {
    pub fn new(config: &AgentConfig, tools: ToolRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                agent_name: config.name.clone(),
                model: config.model.clone(),
                instruction: config.instruction.clone(),
                api_key: config.google_api_key.clone(),
                api_base: config.api_base.trim_end_matches('/').to_string(),
                max_tool_rounds: config.max_tool_rounds,
                tools,
                store: ConversationStore::new(),
                client: reqwest::Client::new(),
            }),
        }
    }

    pub fn model(&self) -> &str {
        &self.inner.model
    }

    /// Number of open conversation contexts.
    pub fn open_sessions(&self) -> usize {
        self.inner.store.len()
    }
}

impl Inner {
    fn build_request_body(&self, contents: &[Value]) -> Value {
        let mut body = json!({ "contents": contents });

        if !self.instruction.is_empty() {
            body["system_instruction"] = json!({ "parts": [{ "text": self.instruction }] });
        }

        if !self.tools.is_empty() {
            let function_declarations: Vec<Value> = self
                .tools
                .definitions()
                .into_iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{ "function_declarations": function_declarations }]);
        }

        body
    }

    /// The key travels in `x-goog-api-key`, never in the URL: transport
    /// errors quote the URL and reach the caller.
    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.api_base, self.model
        )
    }

    /// Answer function calls; tool failures go back to the model as `error`.
    fn answer_calls(&self, calls: &[(String, Value)]) -> Value {
        let parts: Vec<Value> = calls
            .iter()
            .map(|(name, args)| {
                let response = match self.tools.call(name, args) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(tool = %name, "{e}");
                        json!({ "error": e.to_string() })
                    }
                };
                json!({ "functionResponse": { "name": name, "response": response } })
            })
            .collect();
        json!({ "role": "user", "parts": parts })
    }
}

/// Error text safe to hand to callers: request URLs are stripped.
fn describe_stream_error(e: reqwest_eventsource::Error) -> String {
    match e {
        reqwest_eventsource::Error::Transport(e) => e.without_url().to_string(),
        other => other.to_string(),
    }
}

fn parse_chunk(parsed: &Value) -> TurnChunk {
    let mut chunk = TurnChunk::default();

    let parts = parsed["candidates"][0]["content"]["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    for part in &parts {
        if part["thought"].as_bool() == Some(true) {
            continue;
        }
        if let Some(text) = part["text"].as_str() {
            if !text.is_empty() {
                chunk.texts.push(text.to_string());
            }
        }
        if let Some(fc) = part.get("functionCall") {
            let name = fc["name"].as_str().unwrap_or("").to_string();
            let args = if fc["args"].is_null() {
                json!({})
            } else {
                fc["args"].clone()
            };
            chunk.calls.push((name, args));
        }
    }

    let meta = &parsed["usageMetadata"];
    if meta.is_object() {
        let input = meta["promptTokenCount"].as_u64().unwrap_or(0);
        let output = meta["candidatesTokenCount"].as_u64().unwrap_or(0);
        if input > 0 || output > 0 {
            chunk.usage = Some(TokenUsage {
                input_tokens: input,
                output_tokens: output,
            });
        }
    }

    chunk
}

/// The model turn as stored in history: merged text first, then calls.
fn model_turn(text: &str, calls: &[(String, Value)]) -> Option<Value> {
    let mut parts = Vec::new();
    if !text.is_empty() {
        parts.push(json!({ "text": text }));
    }
    for (name, args) in calls {
        parts.push(json!({ "functionCall": { "name": name, "args": args } }));
    }
    if parts.is_empty() {
        None
    } else {
        Some(json!({ "role": "model", "parts": parts }))
    }
}

#[async_trait]
impl AgentRuntime for GeminiRuntime {
    fn root_agent(&self) -> &str {
        &self.inner.agent_name
    }

    async fn create_session(&self, user_id: &str) -> Result<String, RuntimeError> {
        let id = self.inner.store.create(user_id);
        tracing::debug!(user_id, session_id = %id, "Conversation opened");
        Ok(id)
    }

    async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> Result<EventStream, RuntimeError> {
        let api_key = self
            .inner
            .api_key
            .as_deref()
            .ok_or_else(|| RuntimeError::provider("GOOGLE_API_KEY is not set", false))?;
        let mut api_key = HeaderValue::from_str(api_key)
            .map_err(|_| RuntimeError::provider("GOOGLE_API_KEY is not a valid header value", false))?;
        api_key.set_sensitive(true);

        self.inner.store.append(
            session_id,
            json!({ "role": "user", "parts": [{ "text": message }] }),
        )?;
        tracing::debug!(user_id, session_id, "Running agent turn");

        let inner = self.inner.clone();
        let session_id = session_id.to_string();

        let stream = async_stream::stream! {
            let mut rounds: u32 = 0;
            loop {
                let contents = match inner.store.contents(&session_id) {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };
                let body = inner.build_request_body(&contents);

                let mut es = match inner
                    .client
                    .post(inner.stream_url())
                    .header("content-type", "application/json")
                    .header(API_KEY_HEADER, api_key.clone())
                    .json(&body)
                    .eventsource()
                {
                    Ok(es) => es,
                    Err(e) => {
                        yield Err(RuntimeError::provider(format!("Failed to open stream: {e}"), false));
                        break;
                    }
                };

                let mut turn_text = String::new();
                let mut calls: Vec<(String, Value)> = Vec::new();
                let mut usage: Option<TokenUsage> = None;
                let mut failed = false;

                while let Some(event) = es.next().await {
                    match event {
                        Ok(Event::Open) => {}
                        Ok(Event::Message(msg)) => {
                            let parsed: Value = match serde_json::from_str(&msg.data) {
                                Ok(v) => v,
                                Err(e) => {
                                    yield Err(RuntimeError::provider(
                                        format!("Failed to parse SSE data: {e}"),
                                        false,
                                    ));
                                    failed = true;
                                    break;
                                }
                            };
                            let chunk = parse_chunk(&parsed);
                            if chunk.usage.is_some() {
                                usage = chunk.usage;
                            }
                            calls.extend(chunk.calls);
                            if !chunk.texts.is_empty() {
                                for t in &chunk.texts {
                                    turn_text.push_str(t);
                                }
                                yield Ok(StreamEvent {
                                    author: Some(inner.agent_name.clone()),
                                    usage: None,
                                    texts: chunk.texts,
                                });
                            }
                        }
                        Err(reqwest_eventsource::Error::StreamEnded) => break,
                        Err(e) => {
                            yield Err(RuntimeError::provider(
                                format!("SSE stream error: {}", describe_stream_error(e)),
                                false,
                            ));
                            failed = true;
                            break;
                        }
                    }
                }
                es.close();
                if failed {
                    break;
                }

                if let Some(u) = usage {
                    yield Ok(StreamEvent::usage(u.input_tokens, u.output_tokens)
                        .with_author(inner.agent_name.clone()));
                }

                if let Some(turn) = model_turn(&turn_text, &calls) {
                    if let Err(e) = inner.store.append(&session_id, turn) {
                        yield Err(e);
                        break;
                    }
                }

                if calls.is_empty() {
                    break;
                }
                rounds += 1;
                if rounds > inner.max_tool_rounds {
                    yield Err(RuntimeError::ToolLoop { rounds: inner.max_tool_rounds });
                    break;
                }
                let answers = inner.answer_calls(&calls);
                if let Err(e) = inner.store.append(&session_id, answers) {
                    yield Err(e);
                    break;
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn close_session(&self, session_id: &str) {
        if self.inner.store.remove(session_id).is_some() {
            tracing::debug!(session_id, "Conversation closed");
        }
    }
}
