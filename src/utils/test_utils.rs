use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use crate::core::chat_stream::{
    ModelStreamClient, StreamError, StreamEvent, StreamEventReceiver, StreamRequest,
};
use crate::core::display::Display;
use crate::core::message::Message;
use crate::core::tools::{Tool, ToolError, ToolSchema};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayCall {
    Token(String),
    Line(String),
    Status(String),
    HideStatus,
}

/// Display that records every call in order.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    calls: Mutex<Vec<DisplayCall>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<DisplayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> String {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DisplayCall::Token(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DisplayCall::Line(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: DisplayCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Display for RecordingDisplay {
    fn print_streaming_token(&self, text: &str) {
        self.record(DisplayCall::Token(text.to_string()));
    }

    fn print(&self, text: &str) {
        self.record(DisplayCall::Line(text.to_string()));
    }

    fn set_status(&self, text: &str) {
        self.record(DisplayCall::Status(text.to_string()));
    }

    fn hide_status(&self) {
        self.record(DisplayCall::HideStatus);
    }
}

pub struct ScriptedResponse {
    events: Vec<StreamEvent>,
    hold_open: bool,
    open_error: Option<StreamError>,
}

impl ScriptedResponse {
    /// Sends the events, then closes the channel.
    pub fn events(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            hold_open: false,
            open_error: None,
        }
    }

    /// Sends the events, then keeps the channel open until cancelled.
    pub fn hanging(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            hold_open: true,
            open_error: None,
        }
    }

    pub fn open_error(error: StreamError) -> Self {
        Self {
            events: Vec::new(),
            hold_open: false,
            open_error: Some(error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// Model client that replays one scripted response per request.
pub struct ScriptedStreamClient {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<CapturedRequest>>,
}

impl ScriptedStreamClient {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelStreamClient for ScriptedStreamClient {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn open_stream(
        &self,
        request: StreamRequest,
    ) -> Result<StreamEventReceiver, StreamError> {
        self.requests.lock().unwrap().push(CapturedRequest {
            messages: request.messages.clone(),
            tool_names: request.tools.iter().map(|tool| tool.name.clone()).collect(),
        });

        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| StreamError::Transport("no scripted response left".into()))?;
        if let Some(error) = response.open_error {
            return Err(error);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for event in response.events {
            let _ = tx.send(event);
        }
        if response.hold_open {
            let cancel_token = request.cancel_token;
            tokio::spawn(async move {
                cancel_token.cancelled().await;
                drop(tx);
            });
        }
        Ok(rx)
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Returns the `text` argument unchanged.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "echo",
            "Echo the given text",
            object_schema(json!({"text": {"type": "string"}}), &["text"]),
        )
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        Ok(arguments
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

/// Always fails with the configured message.
pub struct FailingTool {
    message: String,
}

impl FailingTool {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("fail", "Always fails", object_schema(json!({}), &[]))
    }

    async fn invoke(&self, _arguments: Map<String, Value>) -> Result<String, ToolError> {
        Err(ToolError::Execution(self.message.clone()))
    }
}

/// Sleeps for the configured duration before answering.
pub struct SlowTool {
    delay: Duration,
}

impl SlowTool {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("slow", "Takes a while", object_schema(json!({}), &[]))
    }

    async fn invoke(&self, _arguments: Map<String, Value>) -> Result<String, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok("done".to_string())
    }
}

/// Named tool with a fixed reply that counts its invocations.
pub struct StaticTool {
    name: String,
    reply: String,
    calls: AtomicUsize,
}

impl StaticTool {
    pub fn new(name: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reply: reply.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            self.name.clone(),
            "Returns a fixed reply",
            json!({"type": "object"}),
        )
    }

    async fn invoke(&self, _arguments: Map<String, Value>) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}
