//! Main chat event loop.
//!
//! Terminal input is read on a dedicated blocking thread. Each turn runs on
//! its own tokio task and reports back through two channels: display events
//! while it streams, then a [`TurnCompletion`] carrying the finished turn.
//! The loop merges all three sources with `tokio::select!` and redraws after
//! every wakeup.

mod keybindings;
mod lifecycle;

use std::{
    error::Error,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use ratatui::crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use ratatui::layout::Rect;
use ratatui::style::Style;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tui_textarea::TextArea;

use self::keybindings::{resolve_key, KeyAction};
use self::lifecycle::{restore_terminal, setup_terminal, ChatTerminal};
use crate::commands::{process_input, CommandContext, CommandResult};
use crate::core::config::Config;
use crate::core::conversation::Conversation;
use crate::core::orchestrator::{TurnOrchestrator, TurnOutcome};
use crate::core::turn::TurnState;
use crate::core::turn_guard::TurnGuard;
use crate::ui::display::{ChannelDisplay, DisplayEvent};
use crate::ui::renderer::{ui, ChatLayout, ChatView};
use crate::ui::transcript::Transcript;

pub const CANCELLING_STATUS: &str = "Cancelling…";
pub const INTERRUPTED_NOTICE: &str = "[interrupted]";
const WELCOME: &str = "Type a message and press Enter. /help lists commands.";

/// Everything the chat view needs, prepared by the caller.
pub struct ChatSession {
    pub config: Config,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub conversation: Conversation,
    pub startup_notes: Vec<String>,
}

#[derive(Debug)]
pub enum UiEvent {
    Crossterm(Event),
}

/// A finished turn handed back to the loop by its task.
pub struct TurnCompletion {
    pub turn_id: u64,
    pub turn: TurnState,
    pub outcome: TurnOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Exit,
}

fn fresh_input() -> TextArea<'static> {
    let mut input = TextArea::default();
    input.set_cursor_line_style(Style::default());
    input
}

pub struct ChatState {
    config: Config,
    orchestrator: Arc<TurnOrchestrator>,
    conversation: Conversation,
    transcript: Transcript,
    input: TextArea<'static>,
    guard: TurnGuard,
    display: ChannelDisplay,
    completions: mpsc::UnboundedSender<TurnCompletion>,
    // Output area size as of the last frame: (height, width).
    viewport: (u16, u16),
}

impl ChatState {
    pub fn new(
        session: ChatSession,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<DisplayEvent>,
        mpsc::UnboundedReceiver<TurnCompletion>,
    ) {
        let (display, display_rx) = ChannelDisplay::new();
        let (completions, completion_rx) = mpsc::unbounded_channel();

        let mut transcript = Transcript::new();
        for note in &session.startup_notes {
            transcript.push_line(note);
        }
        transcript.push_line(WELCOME);

        let state = Self {
            config: session.config,
            orchestrator: session.orchestrator,
            conversation: session.conversation,
            transcript,
            input: fresh_input(),
            guard: TurnGuard::new(),
            display,
            completions,
            viewport: (1, 80),
        };
        (state, display_rx, completion_rx)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn guard(&self) -> &TurnGuard {
        &self.guard
    }

    pub fn input_text(&self) -> String {
        self.input.lines().join("\n")
    }

    pub fn set_viewport(&mut self, area: Rect) {
        let output = ChatLayout::new(area).output;
        self.viewport = (output.height.max(1), output.width.max(1));
    }

    pub fn view(&self) -> ChatView<'_> {
        ChatView {
            model: self.orchestrator.model(),
            transcript: &self.transcript,
            input: &self.input,
        }
    }

    pub fn apply_display_event(&mut self, event: DisplayEvent) {
        self.transcript.apply(event);
    }

    pub fn handle_event(&mut self, event: Event) -> LoopControl {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            Event::Paste(text) => {
                self.input.insert_str(text.replace(['\r', '\n'], " "));
                LoopControl::Continue
            }
            _ => LoopControl::Continue,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> LoopControl {
        let (height, width) = self.viewport;
        let page = height.saturating_sub(1).max(1);
        match resolve_key(&key) {
            KeyAction::Quit => return LoopControl::Exit,
            KeyAction::Submit => return self.submit(),
            KeyAction::CancelTurn => self.cancel_turn(),
            KeyAction::ScrollUp => self.transcript.scroll_up(1, height, width),
            KeyAction::ScrollDown => self.transcript.scroll_down(1, height, width),
            KeyAction::PageUp => self.transcript.scroll_up(page, height, width),
            KeyAction::PageDown => self.transcript.scroll_down(page, height, width),
            KeyAction::ScrollToTop => self.transcript.scroll_up(u16::MAX, height, width),
            KeyAction::ScrollToBottom => self.transcript.scroll_to_bottom(),
            KeyAction::Edit => {
                self.input.input(tui_textarea::Input::from(key));
            }
        }
        LoopControl::Continue
    }

    pub fn submit(&mut self) -> LoopControl {
        let text = self.input_text();
        if text.trim().is_empty() {
            return LoopControl::Continue;
        }

        let busy = !self.guard.is_idle();
        let mut ctx = CommandContext::new(
            &mut self.conversation,
            self.orchestrator.tools(),
            &self.config,
            busy,
        );
        let result = process_input(&mut ctx, &text);
        let output = std::mem::take(&mut ctx.output);

        match result {
            CommandResult::Exit => return LoopControl::Exit,
            CommandResult::Continue => {
                self.input = fresh_input();
                for line in output {
                    self.transcript.push_line(&line);
                }
            }
            CommandResult::ClearScreen => {
                self.input = fresh_input();
                self.transcript.clear();
            }
            CommandResult::ProcessAsMessage(message) => self.start_turn(message),
        }
        self.transcript.scroll_to_bottom();
        LoopControl::Continue
    }

    fn start_turn(&mut self, message: String) {
        let ticket = match self.guard.try_begin() {
            Ok(ticket) => ticket,
            Err(rejected) => {
                // Keep the typed text so it can be sent later.
                self.transcript.push_line(&rejected.to_string());
                return;
            }
        };

        self.input = fresh_input();
        self.transcript.push_line(&format!("[user] {message}"));

        let mut turn = self.conversation.begin_turn(message);
        let orchestrator = self.orchestrator.clone();
        let display = self.display.clone();
        let completions = self.completions.clone();
        let turn_id = ticket.turn_id;
        debug!(turn_id, "Spawning turn");

        tokio::spawn(async move {
            let outcome = orchestrator
                .complete_turn(&mut turn, &display, &ticket.cancel_token)
                .await;
            let _ = completions.send(TurnCompletion {
                turn_id,
                turn,
                outcome,
            });
        });
    }

    pub fn cancel_turn(&mut self) {
        if self.guard.cancel() {
            self.transcript.set_status(CANCELLING_STATUS);
        }
    }

    pub fn finish_turn(&mut self, completion: TurnCompletion) {
        let TurnCompletion {
            turn_id,
            turn,
            outcome,
        } = completion;

        self.transcript.end_stream();
        if matches!(outcome, TurnOutcome::Cancelled { .. }) {
            self.transcript.push_line(INTERRUPTED_NOTICE);
        }
        self.transcript.hide_status();
        info!(
            turn_id,
            success = outcome.is_success(),
            appended = turn.messages_appended().len(),
            "Turn finished"
        );

        self.conversation.commit(turn);
        self.guard.finish(turn_id);
    }

    pub fn shutdown(&self) {
        self.guard.shutdown();
    }
}

/// Polls crossterm on a plain thread so a blocked read never stalls the
/// runtime.
struct InputReader {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl InputReader {
    fn spawn(event_tx: mpsc::UnboundedSender<UiEvent>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let handle = thread::spawn(move || {
            while !thread_stop.load(Ordering::Relaxed) {
                match event::poll(Duration::from_millis(50)) {
                    Ok(true) => match event::read() {
                        Ok(ev) => {
                            if event_tx.send(UiEvent::Crossterm(ev)).is_err() {
                                break;
                            }
                        }
                        Err(err) => debug!(error = %err, "Failed to read terminal event"),
                    },
                    Ok(false) => {}
                    Err(err) => {
                        warn!(error = %err, "Terminal polling failed");
                        break;
                    }
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

async fn event_loop(
    terminal: &mut ChatTerminal,
    state: &mut ChatState,
    mut display_rx: mpsc::UnboundedReceiver<DisplayEvent>,
    mut completion_rx: mpsc::UnboundedReceiver<TurnCompletion>,
) -> Result<(), Box<dyn Error>> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<UiEvent>();
    let reader = InputReader::spawn(event_tx);

    let result = loop {
        let size = match terminal.size() {
            Ok(size) => size,
            Err(err) => break Err(err.into()),
        };
        state.set_viewport(Rect::new(0, 0, size.width, size.height));
        if let Err(err) = terminal.draw(|f| ui(f, &state.view())) {
            break Err(err.into());
        }

        tokio::select! {
            biased;
            Some(event) = display_rx.recv() => {
                state.apply_display_event(event);
                while let Ok(event) = display_rx.try_recv() {
                    state.apply_display_event(event);
                }
            }
            Some(completion) = completion_rx.recv() => state.finish_turn(completion),
            event = event_rx.recv() => match event {
                Some(UiEvent::Crossterm(ev)) => {
                    if state.handle_event(ev) == LoopControl::Exit {
                        break Ok(());
                    }
                }
                None => break Ok(()),
            },
        }
    };

    state.shutdown();
    reader.stop();
    result
}

pub async fn run_chat(session: ChatSession) -> Result<(), Box<dyn Error>> {
    let (mut state, display_rx, completion_rx) = ChatState::new(session);
    let mut terminal = setup_terminal()?;
    info!(model = %state.orchestrator.model(), "Chat session started");

    let result = event_loop(&mut terminal, &mut state, display_rx, completion_rx).await;
    let restored = restore_terminal(&mut terminal);

    info!(
        messages = state.conversation().len(),
        "Chat session ended"
    );
    result?;
    restored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat_stream::StreamEvent;
    use crate::core::orchestrator::TurnOptions;
    use crate::core::tools::ToolRegistry;
    use crate::core::turn_guard::{TurnPhase, TurnRejected};
    use crate::utils::test_utils::{ScriptedResponse, ScriptedStreamClient};
    use ratatui::crossterm::event::{KeyCode, KeyModifiers};

    fn state_with(
        responses: Vec<ScriptedResponse>,
    ) -> (
        ChatState,
        mpsc::UnboundedReceiver<DisplayEvent>,
        mpsc::UnboundedReceiver<TurnCompletion>,
    ) {
        let client = Arc::new(ScriptedStreamClient::new(responses));
        let orchestrator = Arc::new(TurnOrchestrator::new(
            client,
            Arc::new(ToolRegistry::new()),
            TurnOptions::default(),
        ));
        ChatState::new(ChatSession {
            config: Config::default(),
            orchestrator,
            conversation: Conversation::new(None),
            startup_notes: vec!["MCP server 'x' unavailable: gone".to_string()],
        })
    }

    fn type_text(state: &mut ChatState, text: &str) {
        state.handle_event(Event::Paste(text.to_string()));
    }

    fn press(state: &mut ChatState, code: KeyCode) -> LoopControl {
        state.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    async fn settle(
        state: &mut ChatState,
        display_rx: &mut mpsc::UnboundedReceiver<DisplayEvent>,
        completion_rx: &mut mpsc::UnboundedReceiver<TurnCompletion>,
    ) {
        let completion = completion_rx.recv().await.expect("turn completion");
        while let Ok(event) = display_rx.try_recv() {
            state.apply_display_event(event);
        }
        state.finish_turn(completion);
    }

    #[test]
    fn startup_notes_precede_welcome() {
        let (state, _, _) = state_with(Vec::new());
        assert_eq!(
            state.transcript().lines(),
            &[
                "MCP server 'x' unavailable: gone".to_string(),
                WELCOME.to_string()
            ]
        );
        assert_eq!(state.transcript().status_text(), "Ready.");
    }

    #[tokio::test]
    async fn submitted_message_runs_a_turn() {
        let (mut state, mut display_rx, mut completion_rx) =
            state_with(vec![ScriptedResponse::events(vec![
                StreamEvent::TextDelta("Hi ".to_string()),
                StreamEvent::TextDelta("there".to_string()),
                StreamEvent::TurnFinished,
            ])]);

        type_text(&mut state, "hello");
        assert_eq!(press(&mut state, KeyCode::Enter), LoopControl::Continue);
        assert_eq!(state.input_text(), "");
        assert_eq!(state.guard().phase(), TurnPhase::TurnInFlight);

        settle(&mut state, &mut display_rx, &mut completion_rx).await;

        let lines = state.transcript().lines();
        assert_eq!(lines[lines.len() - 2], "[user] hello");
        assert_eq!(lines[lines.len() - 1], "Hi there");
        assert_eq!(state.conversation().len(), 2);
        assert!(state.guard().is_idle());
        assert_eq!(state.transcript().status_text(), "Ready.");
    }

    #[tokio::test]
    async fn input_while_busy_is_rejected_and_kept() {
        let (mut state, _display_rx, _completion_rx) =
            state_with(vec![ScriptedResponse::hanging(Vec::new())]);

        type_text(&mut state, "first");
        press(&mut state, KeyCode::Enter);
        type_text(&mut state, "second");
        press(&mut state, KeyCode::Enter);

        assert_eq!(state.input_text(), "second");
        let lines = state.transcript().lines();
        assert_eq!(lines[lines.len() - 1], TurnRejected::Busy.to_string());
        state.shutdown();
    }

    #[tokio::test]
    async fn escape_cancels_the_turn() {
        let (mut state, mut display_rx, mut completion_rx) =
            state_with(vec![ScriptedResponse::hanging(vec![StreamEvent::TextDelta(
                "Partial".to_string(),
            )])]);

        type_text(&mut state, "tell me a story");
        press(&mut state, KeyCode::Enter);
        press(&mut state, KeyCode::Esc);
        assert_eq!(state.guard().phase(), TurnPhase::Cancelling);
        assert_eq!(state.transcript().status_text(), CANCELLING_STATUS);

        settle(&mut state, &mut display_rx, &mut completion_rx).await;

        let lines = state.transcript().lines();
        assert_eq!(lines[lines.len() - 1], INTERRUPTED_NOTICE);
        assert!(state.guard().is_idle());
        // The user message stays; the interrupted reply does not.
        assert_eq!(state.conversation().len(), 1);
    }

    #[test]
    fn commands_print_into_transcript() {
        let (mut state, _, _) = state_with(Vec::new());
        type_text(&mut state, "/tools");
        press(&mut state, KeyCode::Enter);
        let lines = state.transcript().lines();
        assert_eq!(lines[lines.len() - 1], "No tools available.");
        assert_eq!(state.input_text(), "");
    }

    #[test]
    fn clear_command_empties_transcript() {
        let (mut state, _, _) = state_with(Vec::new());
        type_text(&mut state, "/clear");
        press(&mut state, KeyCode::Enter);
        assert!(state.transcript().lines().is_empty());
    }

    #[test]
    fn exit_command_and_ctrl_c_leave_the_loop() {
        let (mut state, _, _) = state_with(Vec::new());
        type_text(&mut state, "/exit");
        assert_eq!(press(&mut state, KeyCode::Enter), LoopControl::Exit);

        let (mut state, _, _) = state_with(Vec::new());
        assert_eq!(
            state.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            LoopControl::Exit
        );
    }

    #[test]
    fn blank_input_is_ignored() {
        let (mut state, _, _) = state_with(Vec::new());
        type_text(&mut state, "   ");
        press(&mut state, KeyCode::Enter);
        assert!(state.guard().is_idle());
        assert_eq!(state.transcript().lines().len(), 2);
    }
}
