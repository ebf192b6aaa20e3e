use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ChatRequest, ChatResponse, ChatToolCallDelta};
use crate::core::message::{Message, Role, ToolCallRequest};
use crate::core::tools::ToolSchema;
use crate::utils::url::construct_api_url;

/// One incremental unit of model output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta(String),
    ToolCallRequested(ToolCallRequest),
    TurnFinished,
    Error(String),
}

pub type StreamEventReceiver = mpsc::UnboundedReceiver<StreamEvent>;

pub struct StreamRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub cancel_token: CancellationToken,
}

/// Failure to open a stream. Failures after the stream is open arrive as
/// [`StreamEvent::Error`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    Transport(String),
    Api(String),
    Cancelled,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Transport(message) => write!(f, "Request failed: {message}"),
            StreamError::Api(message) => write!(f, "{message}"),
            StreamError::Cancelled => write!(f, "Request cancelled"),
        }
    }
}

impl std::error::Error for StreamError {}

#[async_trait]
pub trait ModelStreamClient: Send + Sync {
    fn model(&self) -> &str;

    async fn open_stream(&self, request: StreamRequest) -> Result<StreamEventReceiver, StreamError>;
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return format!("API Error: {}\n```json\n{}\n```", summary, pretty_json);
                }
            }
            return format!("API Error:\n```json\n{}\n```", pretty_json);
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{}\n```", trimmed)
    } else {
        format!("API Error:\n```\n{}\n```", trimmed)
    }
}

static SYNTHETIC_CALL_IDS: AtomicU64 = AtomicU64::new(0);

/// Id for a call the provider sent without one. Unique for the life of the
/// process, so it never collides with an earlier round of the conversation.
fn synthetic_call_id() -> String {
    format!("tool-call-{}", SYNTHETIC_CALL_IDS.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Incremental decoder for an OpenAI-style SSE body.
///
/// Bytes are fed in arbitrary chunks; complete `data:` lines are turned into
/// [`StreamEvent`]s. Tool-call fragments are assembled per index and released
/// together, in index order, once the provider signals the end of the choice.
#[derive(Debug, Default)]
pub struct SseEventParser {
    buffer: Vec<u8>,
    pending_calls: BTreeMap<u32, PendingToolCall>,
    finished: bool,
}

impl SseEventParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn push_chunk(&mut self, chunk: &[u8], events: &mut Vec<StreamEvent>) {
        if self.finished {
            return;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            self.process_raw_line(&line[..newline_pos], events);
            if self.finished {
                self.buffer.clear();
                return;
            }
        }
    }

    /// Flushes whatever is left once the body ends. Emits `TurnFinished`
    /// unless the stream already finished or failed.
    pub fn finish(&mut self, events: &mut Vec<StreamEvent>) {
        if self.finished {
            return;
        }
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_raw_line(&line, events);
            if self.finished {
                return;
            }
        }
        self.flush_tool_calls(events);
        events.push(StreamEvent::TurnFinished);
        self.finished = true;
    }

    fn process_raw_line(&mut self, raw: &[u8], events: &mut Vec<StreamEvent>) {
        match std::str::from_utf8(raw) {
            Ok(line) => self.process_line(line.trim(), events),
            Err(err) => warn!(error = %err, "Skipping SSE line with invalid UTF-8"),
        }
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        let Some(payload) = extract_data_payload(line) else {
            return;
        };
        if payload.is_empty() {
            return;
        }

        if payload == "[DONE]" {
            self.flush_tool_calls(events);
            events.push(StreamEvent::TurnFinished);
            self.finished = true;
            return;
        }

        let value = match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => value,
            Err(_) => {
                self.fail(format_api_error(payload), events);
                return;
            }
        };

        if value.get("error").is_some() {
            self.fail(format_api_error(payload), events);
            return;
        }

        let response: ChatResponse = match serde_json::from_value(value) {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "Ignoring unrecognised stream payload");
                return;
            }
        };

        let Some(choice) = response.choices.into_iter().next() else {
            return;
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                events.push(StreamEvent::TextDelta(content));
            }
        }

        if let Some(deltas) = choice.delta.tool_calls {
            for (position, delta) in deltas.into_iter().enumerate() {
                self.append_tool_call_delta(position as u32, delta);
            }
        }

        if choice.finish_reason.is_some() {
            self.flush_tool_calls(events);
        }
    }

    fn append_tool_call_delta(&mut self, position: u32, delta: ChatToolCallDelta) {
        let index = delta.index.unwrap_or(position);
        let entry = self.pending_calls.entry(index).or_default();

        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            entry.id = Some(id);
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name.filter(|name| !name.is_empty()) {
                entry.name = Some(name);
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    fn flush_tool_calls(&mut self, events: &mut Vec<StreamEvent>) {
        for call in std::mem::take(&mut self.pending_calls).into_values() {
            let id = call.id.unwrap_or_else(synthetic_call_id);
            let name = call.name.unwrap_or_default();
            events.push(StreamEvent::ToolCallRequested(ToolCallRequest::new(
                id,
                name,
                call.arguments,
            )));
        }
    }

    fn fail(&mut self, message: String, events: &mut Vec<StreamEvent>) {
        self.pending_calls.clear();
        events.push(StreamEvent::Error(message));
        self.finished = true;
    }
}

/// Streams chat completions from an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiStreamClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiStreamClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn build_request(&self, request: &StreamRequest) -> ChatRequest {
        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(ToolSchema::to_api_definition)
                    .collect(),
            )
        };

        ChatRequest {
            model: self.model.clone(),
            messages: request
                .messages
                .iter()
                .map(Message::to_api_message)
                .collect(),
            stream: true,
            tools,
        }
    }

    async fn send(&self, body: &ChatRequest) -> Result<reqwest::Response, StreamError> {
        let chat_url = construct_api_url(&self.base_url, "chat/completions");
        let response = self
            .client
            .post(chat_url)
            .header("Content-Type", "application/json")
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| StreamError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            warn!(%status, "Chat completion request rejected");
            return Err(StreamError::Api(format_api_error(&error_text)));
        }

        Ok(response)
    }
}

async fn pump_response(response: reqwest::Response, tx: mpsc::UnboundedSender<StreamEvent>) {
    let mut stream = response.bytes_stream();
    let mut parser = SseEventParser::new();
    let mut events = Vec::new();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => parser.push_chunk(&bytes, &mut events),
            Err(err) => {
                let _ = tx.send(StreamEvent::Error(format!("Stream interrupted: {err}")));
                return;
            }
        }

        for event in events.drain(..) {
            if tx.send(event).is_err() {
                return;
            }
        }
        if parser.is_finished() {
            return;
        }
    }

    parser.finish(&mut events);
    for event in events {
        let _ = tx.send(event);
    }
}

#[async_trait]
impl ModelStreamClient for OpenAiStreamClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn open_stream(
        &self,
        request: StreamRequest,
    ) -> Result<StreamEventReceiver, StreamError> {
        let body = self.build_request(&request);
        debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = request.tools.len(),
            "Opening chat completion stream"
        );

        let cancel_token = request.cancel_token;
        let response = tokio::select! {
            result = self.send(&body) => result?,
            _ = cancel_token.cancelled() => return Err(StreamError::Cancelled),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            tokio::select! {
                _ = pump_response(response, tx) => {}
                _ = cancel_token.cancelled() => {
                    debug!("Chat completion stream cancelled");
                }
            }
        });

        Ok(rx)
    }
}

/// Offline client used with the `mock` model. Echoes the last user message
/// back one character at a time.
#[derive(Clone, Debug)]
pub struct MockStreamClient {
    min_delay: Duration,
    max_delay: Duration,
}

pub const MOCK_MODEL: &str = "mock";

impl Default for MockStreamClient {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(60),
        }
    }
}

impl MockStreamClient {
    pub fn with_delay(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }

    pub fn response_for(messages: &[Message]) -> String {
        let prompt = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        format!("Here is my response to {prompt}")
    }

    fn next_delay(&self) -> Duration {
        let spread = self.max_delay.saturating_sub(self.min_delay).as_millis() as u64;
        if spread == 0 {
            return self.min_delay;
        }
        let mut bytes = [0u8; 8];
        if getrandom::fill(&mut bytes).is_err() {
            return self.min_delay;
        }
        self.min_delay + Duration::from_millis(u64::from_le_bytes(bytes) % (spread + 1))
    }
}

#[async_trait]
impl ModelStreamClient for MockStreamClient {
    fn model(&self) -> &str {
        MOCK_MODEL
    }

    async fn open_stream(
        &self,
        request: StreamRequest,
    ) -> Result<StreamEventReceiver, StreamError> {
        if request.cancel_token.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        let response = Self::response_for(&request.messages);
        let delays: Vec<Duration> = response.chars().map(|_| self.next_delay()).collect();
        let cancel_token = request.cancel_token;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for (ch, delay) in response.chars().zip(delays) {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel_token.cancelled() => return,
                }
                if tx.send(StreamEvent::TextDelta(ch.to_string())).is_err() {
                    return;
                }
            }
            let _ = tx.send(StreamEvent::TurnFinished);
        });

        Ok(rx)
    }
}
