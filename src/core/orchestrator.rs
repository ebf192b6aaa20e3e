//! The turn loop: stream a reply, run the tools it asks for, feed the
//! results back, and repeat until the model answers with text alone.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::chat_stream::{ModelStreamClient, StreamError, StreamEvent, StreamRequest};
use crate::core::display::Display;
use crate::core::message::{Message, Role, ToolCallRequest, ToolResult};
use crate::core::tools::{ToolError, ToolRegistry};
use crate::core::turn::TurnState;

pub const STATUS_GENERATING: &str = "Generating response…";

pub fn running_tool_status(name: &str) -> String {
    format!("Running tool {name}…")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOptions {
    pub max_tool_rounds: usize,
    pub tool_timeout: Duration,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            max_tool_rounds: 8,
            tool_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed {
        text: String,
    },
    ToolLimitExceeded {
        rounds: usize,
        partial_text: String,
    },
    Failed {
        error: String,
        partial_text: String,
    },
    Cancelled {
        partial_text: String,
    },
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TurnOutcome::Completed { .. })
    }

    /// Final text on success, otherwise whatever was streamed before the
    /// turn stopped.
    pub fn text(&self) -> &str {
        match self {
            TurnOutcome::Completed { text } => text,
            TurnOutcome::ToolLimitExceeded { partial_text, .. }
            | TurnOutcome::Failed { partial_text, .. }
            | TurnOutcome::Cancelled { partial_text } => partial_text,
        }
    }
}

#[derive(Debug, Default)]
struct AssistantReply {
    text: String,
    tool_calls: Vec<ToolCallRequest>,
}

enum RoundEnd {
    Finished(AssistantReply),
    Failed { error: String, text: String },
    Cancelled { text: String },
}

pub struct TurnOrchestrator {
    client: Arc<dyn ModelStreamClient>,
    tools: Arc<ToolRegistry>,
    options: TurnOptions,
}

impl TurnOrchestrator {
    pub fn new(
        client: Arc<dyn ModelStreamClient>,
        tools: Arc<ToolRegistry>,
        options: TurnOptions,
    ) -> Self {
        Self {
            client,
            tools,
            options,
        }
    }

    pub fn options(&self) -> &TurnOptions {
        &self.options
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub async fn complete_turn(
        &self,
        state: &mut TurnState,
        display: &dyn Display,
        cancel_token: &CancellationToken,
    ) -> TurnOutcome {
        if !state.is_ready() {
            let error = "Conversation must end with a user or tool message".to_string();
            display.print(&format!("Error: {error}"));
            return TurnOutcome::Failed {
                error,
                partial_text: String::new(),
            };
        }

        let mut resolved_ids: HashSet<String> = state
            .history()
            .iter()
            .filter(|message| message.role == Role::Tool)
            .filter_map(|message| message.tool_call_id.clone())
            .collect();
        let mut streamed_text = String::new();
        let mut rounds = 0usize;

        loop {
            debug!(round = rounds, messages = state.history().len(), "Requesting model response");
            display.set_status(STATUS_GENERATING);
            let round = self.stream_reply(state, display, cancel_token).await;
            display.hide_status();

            let reply = match round {
                RoundEnd::Finished(reply) => reply,
                RoundEnd::Failed { error, text } => {
                    streamed_text.push_str(&text);
                    warn!(error = %error, "Model stream failed");
                    display.print(&format!("Error: {error}"));
                    return TurnOutcome::Failed {
                        error,
                        partial_text: streamed_text,
                    };
                }
                RoundEnd::Cancelled { text } => {
                    streamed_text.push_str(&text);
                    info!("Turn cancelled while streaming");
                    return TurnOutcome::Cancelled {
                        partial_text: streamed_text,
                    };
                }
            };
            streamed_text.push_str(&reply.text);

            if reply.tool_calls.is_empty() {
                state.push(Message::assistant(reply.text.clone()));
                info!(rounds, chars = reply.text.len(), "Turn completed");
                return TurnOutcome::Completed { text: reply.text };
            }

            if rounds >= self.options.max_tool_rounds {
                if !reply.text.is_empty() {
                    state.push(Message::assistant(reply.text));
                }
                warn!(
                    rounds,
                    pending = reply.tool_calls.len(),
                    "Tool-call round limit exceeded"
                );
                display.print(&format!(
                    "Tool-call limit exceeded after {rounds} rounds; stopping this turn."
                ));
                return TurnOutcome::ToolLimitExceeded {
                    rounds,
                    partial_text: streamed_text,
                };
            }

            rounds += 1;
            state.push(Message::assistant_with_calls(
                reply.text,
                reply.tool_calls.clone(),
            ));

            for call in &reply.tool_calls {
                let result = self
                    .resolve_tool_call(call, &mut resolved_ids, display, cancel_token)
                    .await;
                if result.is_error {
                    warn!(
                        tool = %call.name,
                        id = %call.id,
                        error = %result.content,
                        "Tool call failed"
                    );
                    display.print(&format!("Tool {} failed: {}", call.name, result.content));
                } else {
                    debug!(
                        tool = %call.name,
                        id = %call.id,
                        bytes = result.content.len(),
                        "Tool call succeeded"
                    );
                }
                state.push(Message::tool_result(&result));
            }

            if cancel_token.is_cancelled() {
                info!(rounds, "Turn cancelled while running tools");
                return TurnOutcome::Cancelled {
                    partial_text: streamed_text,
                };
            }
        }
    }

    async fn resolve_tool_call(
        &self,
        call: &ToolCallRequest,
        resolved_ids: &mut HashSet<String>,
        display: &dyn Display,
        cancel_token: &CancellationToken,
    ) -> ToolResult {
        if !resolved_ids.insert(call.id.clone()) {
            return ToolResult::failure(call, format!("Duplicate tool call id '{}'", call.id));
        }
        if cancel_token.is_cancelled() {
            return ToolResult::failure(call, ToolError::Cancelled.to_string());
        }

        display.set_status(&running_tool_status(&call.name));
        let result = self
            .tools
            .invoke(call, self.options.tool_timeout, cancel_token)
            .await;
        display.hide_status();
        result
    }

    async fn stream_reply(
        &self,
        state: &TurnState,
        display: &dyn Display,
        cancel_token: &CancellationToken,
    ) -> RoundEnd {
        let request = StreamRequest {
            messages: state.history().to_vec(),
            tools: self.tools.list_tools(),
            cancel_token: cancel_token.child_token(),
        };

        let mut events = match self.client.open_stream(request).await {
            Ok(events) => events,
            Err(StreamError::Cancelled) => {
                return RoundEnd::Cancelled {
                    text: String::new(),
                }
            }
            Err(err) => {
                return RoundEnd::Failed {
                    error: err.to_string(),
                    text: String::new(),
                }
            }
        };

        let mut reply = AssistantReply::default();
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    return RoundEnd::Cancelled { text: reply.text };
                }
                event = events.recv() => event,
            };

            match event {
                Some(StreamEvent::TextDelta(text)) => {
                    display.print_streaming_token(&text);
                    reply.text.push_str(&text);
                }
                Some(StreamEvent::ToolCallRequested(call)) => {
                    debug!(tool = %call.name, id = %call.id, "Model requested tool");
                    reply.tool_calls.push(call);
                }
                Some(StreamEvent::TurnFinished) => return RoundEnd::Finished(reply),
                Some(StreamEvent::Error(error)) => {
                    return RoundEnd::Failed {
                        error,
                        text: reply.text,
                    }
                }
                None => {
                    return RoundEnd::Failed {
                        error: "stream ended unexpectedly".to_string(),
                        text: reply.text,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{
        DisplayCall, EchoTool, RecordingDisplay, ScriptedResponse, ScriptedStreamClient,
        SlowTool, StaticTool,
    };

    fn call(id: &str, name: &str, args: &str) -> StreamEvent {
        StreamEvent::ToolCallRequested(ToolCallRequest::new(id, name, args))
    }

    fn text(value: &str) -> StreamEvent {
        StreamEvent::TextDelta(value.to_string())
    }

    fn orchestrator(
        responses: Vec<ScriptedResponse>,
        registry: ToolRegistry,
        options: TurnOptions,
    ) -> (TurnOrchestrator, Arc<ScriptedStreamClient>) {
        let client = Arc::new(ScriptedStreamClient::new(responses));
        let orchestrator = TurnOrchestrator::new(client.clone(), Arc::new(registry), options);
        (orchestrator, client)
    }

    fn roles(state: &TurnState) -> Vec<Role> {
        state.history().iter().map(|m| m.role).collect()
    }

    #[tokio::test]
    async fn streamed_tokens_are_forwarded_verbatim() {
        let deltas = ["Hel", "lo", ",", " ", "wor", "ld", "\n", "  ok"];
        let events: Vec<StreamEvent> = deltas
            .iter()
            .map(|d| text(d))
            .chain(std::iter::once(StreamEvent::TurnFinished))
            .collect();
        let (orchestrator, _) = orchestrator(
            vec![ScriptedResponse::events(events)],
            ToolRegistry::new(),
            TurnOptions::default(),
        );
        let display = RecordingDisplay::new();
        let mut state = TurnState::new(Vec::new(), "hi");

        let outcome = orchestrator
            .complete_turn(&mut state, &display, &CancellationToken::new())
            .await;

        assert_eq!(display.tokens(), deltas.concat());
        assert_eq!(outcome.text(), deltas.concat());
    }

    #[tokio::test]
    async fn text_only_turn_appends_one_assistant_message_without_tools() {
        let tool = Arc::new(StaticTool::new("calc", "4"));
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone());
        let (orchestrator, client) = orchestrator(
            vec![ScriptedResponse::events(vec![
                text("Hello"),
                StreamEvent::TurnFinished,
            ])],
            registry,
            TurnOptions::default(),
        );
        let display = RecordingDisplay::new();
        let mut state = TurnState::new(Vec::new(), "hi");

        let outcome = orchestrator
            .complete_turn(&mut state, &display, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                text: "Hello".into()
            }
        );
        assert_eq!(state.messages_appended().len(), 1);
        assert_eq!(state.messages_appended()[0], Message::assistant("Hello"));
        assert_eq!(tool.call_count(), 0);
        assert_eq!(client.requests().len(), 1);
        assert_eq!(client.requests()[0].tool_names, vec!["calc"]);
        assert_eq!(
            display.calls().first(),
            Some(&DisplayCall::Status(STATUS_GENERATING.to_string()))
        );
        assert_eq!(display.calls().last(), Some(&DisplayCall::HideStatus));
    }

    #[tokio::test]
    async fn calculator_round_trip_scenario() {
        let mut registry = ToolRegistry::new();
        let tool = Arc::new(StaticTool::new("calc", "4"));
        registry.register(tool.clone());
        let (orchestrator, client) = orchestrator(
            vec![
                ScriptedResponse::events(vec![
                    call("call-1", "calc", r#"{"expr":"2+2"}"#),
                    StreamEvent::TurnFinished,
                ]),
                ScriptedResponse::events(vec![text("Hi! 2+2=4"), StreamEvent::TurnFinished]),
            ],
            registry,
            TurnOptions::default(),
        );
        let display = RecordingDisplay::new();
        let mut state = TurnState::new(Vec::new(), "What's 2+2, then say hi");

        let outcome = orchestrator
            .complete_turn(&mut state, &display, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                text: "Hi! 2+2=4".into()
            }
        );
        assert_eq!(
            roles(&state),
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        let history = state.history();
        assert_eq!(history[1].tool_calls[0].id, "call-1");
        assert_eq!(history[2].tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(history[2].content, "4");
        assert_eq!(tool.call_count(), 1);

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 3);
        assert!(display
            .calls()
            .contains(&DisplayCall::Status("Running tool calc…".to_string())));
    }

    #[tokio::test]
    async fn tool_results_follow_request_order_one_per_call() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(StaticTool::new("calc", "4")));
        let (orchestrator, _) = orchestrator(
            vec![
                ScriptedResponse::events(vec![
                    text("Checking. "),
                    call("a", "echo", r#"{"text":"first"}"#),
                    call("b", "missing", "{}"),
                    call("c", "calc", "{}"),
                    StreamEvent::TurnFinished,
                ]),
                ScriptedResponse::events(vec![text("Done"), StreamEvent::TurnFinished]),
            ],
            registry,
            TurnOptions::default(),
        );
        let display = RecordingDisplay::new();
        let mut state = TurnState::new(Vec::new(), "go");

        let outcome = orchestrator
            .complete_turn(&mut state, &display, &CancellationToken::new())
            .await;
        assert!(outcome.is_success());

        let tool_messages: Vec<&Message> = state
            .history()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        let ids: Vec<&str> = tool_messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(tool_messages[0].content, "first");
        assert_eq!(
            tool_messages[1].content,
            "Tool call failure: Unknown tool: 'missing'"
        );
        assert!(display
            .lines()
            .contains(&"Tool missing failed: Unknown tool: 'missing'".to_string()));
        assert_eq!(state.history()[1].content, "Checking. ");
        assert_eq!(outcome.text(), "Done");
    }

    #[tokio::test]
    async fn round_limit_stops_with_exact_number_of_tool_rounds() {
        let looping = |id: &str| {
            ScriptedResponse::events(vec![call(id, "calc", "{}"), StreamEvent::TurnFinished])
        };
        let mut registry = ToolRegistry::new();
        let tool = Arc::new(StaticTool::new("calc", "4"));
        registry.register(tool.clone());
        let (orchestrator, client) = orchestrator(
            vec![looping("r1"), looping("r2"), looping("r3"), looping("r4")],
            registry,
            TurnOptions {
                max_tool_rounds: 2,
                ..TurnOptions::default()
            },
        );
        let display = RecordingDisplay::new();
        let mut state = TurnState::new(Vec::new(), "loop forever");

        let outcome = orchestrator
            .complete_turn(&mut state, &display, &CancellationToken::new())
            .await;

        assert!(matches!(
            outcome,
            TurnOutcome::ToolLimitExceeded { rounds: 2, .. }
        ));
        let tool_messages = state
            .history()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .count();
        assert_eq!(tool_messages, 2);
        assert_eq!(tool.call_count(), 2);
        assert_eq!(client.requests().len(), 3);
        assert_eq!(state.last_role(), Some(Role::Tool));
        assert!(state
            .history()
            .iter()
            .all(|m| m.role != Role::Assistant || m.tool_calls.len() == 1));
    }

    #[tokio::test]
    async fn duplicate_call_ids_are_not_executed_twice() {
        let mut registry = ToolRegistry::new();
        let tool = Arc::new(StaticTool::new("calc", "4"));
        registry.register(tool.clone());
        let (orchestrator, _) = orchestrator(
            vec![
                ScriptedResponse::events(vec![
                    call("same", "calc", "{}"),
                    StreamEvent::TurnFinished,
                ]),
                ScriptedResponse::events(vec![
                    call("same", "calc", "{}"),
                    StreamEvent::TurnFinished,
                ]),
                ScriptedResponse::events(vec![text("ok"), StreamEvent::TurnFinished]),
            ],
            registry,
            TurnOptions::default(),
        );
        let display = RecordingDisplay::new();
        let mut state = TurnState::new(Vec::new(), "twice");

        let outcome = orchestrator
            .complete_turn(&mut state, &display, &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        assert_eq!(tool.call_count(), 1);
        let last_tool = state
            .history()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .last()
            .expect("tool message");
        assert_eq!(
            last_tool.content,
            "Tool call failure: Duplicate tool call id 'same'"
        );
    }

    fn parsed_events(body: &str) -> Vec<StreamEvent> {
        let mut parser = crate::core::chat_stream::SseEventParser::new();
        let mut events = Vec::new();
        parser.push_chunk(body.as_bytes(), &mut events);
        parser.finish(&mut events);
        events
    }

    #[tokio::test]
    async fn calls_streamed_without_ids_run_in_every_round() {
        let idless_call = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,",
            "\"function\":{\"name\":\"calc\",\"arguments\":\"{}\"}}]},",
            "\"finish_reason\":\"tool_calls\"}]}\n",
            "data: [DONE]\n",
        );
        let mut registry = ToolRegistry::new();
        let tool = Arc::new(StaticTool::new("calc", "4"));
        registry.register(tool.clone());
        let (orchestrator, _) = orchestrator(
            vec![
                ScriptedResponse::events(parsed_events(idless_call)),
                ScriptedResponse::events(parsed_events(idless_call)),
                ScriptedResponse::events(vec![text("4 and 4"), StreamEvent::TurnFinished]),
            ],
            registry,
            TurnOptions::default(),
        );
        let display = RecordingDisplay::new();
        let mut state = TurnState::new(Vec::new(), "add twice");

        let outcome = orchestrator
            .complete_turn(&mut state, &display, &CancellationToken::new())
            .await;

        assert!(outcome.is_success());
        assert_eq!(tool.call_count(), 2);
        let tool_contents: Vec<&str> = state
            .history()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(tool_contents, vec!["4", "4"]);
    }

    #[tokio::test]
    async fn stream_error_reports_failure_and_keeps_user_message_only() {
        let (orchestrator, _) = orchestrator(
            vec![ScriptedResponse::events(vec![
                text("Partial..."),
                StreamEvent::Error("connection reset".into()),
            ])],
            ToolRegistry::new(),
            TurnOptions::default(),
        );
        let display = RecordingDisplay::new();
        let mut state = TurnState::new(Vec::new(), "hello");

        let outcome = orchestrator
            .complete_turn(&mut state, &display, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            TurnOutcome::Failed {
                error: "connection reset".into(),
                partial_text: "Partial...".into()
            }
        );
        assert_eq!(display.tokens(), "Partial...");
        assert!(display
            .lines()
            .contains(&"Error: connection reset".to_string()));
        assert_eq!(roles(&state), vec![Role::User]);
    }

    #[tokio::test]
    async fn open_failure_and_truncated_stream_are_failures() {
        let (orchestrator, _) = orchestrator(
            vec![
                ScriptedResponse::open_error(StreamError::Transport("refused".into())),
                ScriptedResponse::events(vec![text("cut")]),
            ],
            ToolRegistry::new(),
            TurnOptions::default(),
        );
        let display = RecordingDisplay::new();

        let mut first = TurnState::new(Vec::new(), "one");
        let outcome = orchestrator
            .complete_turn(&mut first, &display, &CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            TurnOutcome::Failed {
                error: "Request failed: refused".into(),
                partial_text: String::new()
            }
        );

        let mut second = TurnState::new(Vec::new(), "two");
        let outcome = orchestrator
            .complete_turn(&mut second, &display, &CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            TurnOutcome::Failed {
                error: "stream ended unexpectedly".into(),
                partial_text: "cut".into()
            }
        );
        assert_eq!(roles(&second), vec![Role::User]);
    }

    #[tokio::test]
    async fn cancelling_mid_stream_returns_cancelled_without_assistant_message() {
        let (orchestrator, _) = orchestrator(
            vec![ScriptedResponse::hanging(vec![text("Thinking")])],
            ToolRegistry::new(),
            TurnOptions::default(),
        );
        let display = RecordingDisplay::new();
        let mut state = TurnState::new(Vec::new(), "hello");
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let outcome = orchestrator.complete_turn(&mut state, &display, &token).await;

        assert_eq!(
            outcome,
            TurnOutcome::Cancelled {
                partial_text: "Thinking".into()
            }
        );
        assert_eq!(roles(&state), vec![Role::User]);
        assert_eq!(display.calls().last(), Some(&DisplayCall::HideStatus));
    }

    #[tokio::test]
    async fn cancelling_during_tools_resolves_every_pending_call() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool::new(Duration::from_secs(30))));
        let (orchestrator, client) = orchestrator(
            vec![ScriptedResponse::events(vec![
                call("s1", "slow", "{}"),
                call("s2", "slow", "{}"),
                StreamEvent::TurnFinished,
            ])],
            registry,
            TurnOptions::default(),
        );
        let display = RecordingDisplay::new();
        let mut state = TurnState::new(Vec::new(), "wait");
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let outcome = orchestrator.complete_turn(&mut state, &display, &token).await;

        assert!(matches!(outcome, TurnOutcome::Cancelled { .. }));
        assert_eq!(
            roles(&state),
            vec![Role::User, Role::Assistant, Role::Tool, Role::Tool]
        );
        assert!(state
            .messages_appended()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .all(|m| m.content == "Tool call failure: Tool call interrupted by user."));
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn history_ending_in_assistant_is_rejected() {
        let (orchestrator, client) =
            orchestrator(Vec::new(), ToolRegistry::new(), TurnOptions::default());
        let display = RecordingDisplay::new();
        let mut state =
            TurnState::from_history(vec![Message::user("hi"), Message::assistant("hello")]);

        let outcome = orchestrator
            .complete_turn(&mut state, &display, &CancellationToken::new())
            .await;

        assert!(matches!(outcome, TurnOutcome::Failed { .. }));
        assert!(client.requests().is_empty());
    }
}
