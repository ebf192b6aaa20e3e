//! TUI-less "say" command

use std::error::Error;
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::config::Config;
use crate::core::conversation::Conversation;
use crate::core::display::Display;
use crate::core::orchestrator::{TurnOrchestrator, TurnOutcome};

type SharedWriter = Mutex<Box<dyn Write + Send>>;

/// Streams tokens and lines to stdout. Status text goes to stderr as one
/// rewritable line, and only when stderr is a terminal.
pub struct StdoutDisplay {
    out: SharedWriter,
    status: Option<SharedWriter>,
    line_open: AtomicBool,
    status_visible: AtomicBool,
}

impl StdoutDisplay {
    pub fn new() -> Self {
        let status: Option<Box<dyn Write + Send>> = if io::stderr().is_terminal() {
            Some(Box::new(io::stderr()))
        } else {
            None
        };
        Self::with_writers(Box::new(io::stdout()), status)
    }

    pub fn with_writers(
        out: Box<dyn Write + Send>,
        status: Option<Box<dyn Write + Send>>,
    ) -> Self {
        Self {
            out: Mutex::new(out),
            status: status.map(Mutex::new),
            line_open: AtomicBool::new(false),
            status_visible: AtomicBool::new(false),
        }
    }

    fn write_out(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn write_status(&self, text: &str) {
        if let Some(status) = &self.status {
            let mut status = status.lock().unwrap_or_else(|e| e.into_inner());
            let _ = status.write_all(text.as_bytes());
            let _ = status.flush();
        }
    }

    /// Terminates a line left open by streaming.
    pub fn finish(&self) {
        self.hide_status();
        if self.line_open.swap(false, Ordering::SeqCst) {
            self.write_out("\n");
        }
    }
}

impl Default for StdoutDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for StdoutDisplay {
    fn print_streaming_token(&self, token: &str) {
        if token.is_empty() {
            return;
        }
        self.hide_status();
        self.write_out(token);
        self.line_open.store(!token.ends_with('\n'), Ordering::SeqCst);
    }

    fn print(&self, line: &str) {
        self.hide_status();
        let prefix = if self.line_open.swap(false, Ordering::SeqCst) {
            "\n"
        } else {
            ""
        };
        self.write_out(&format!("{prefix}{line}\n"));
    }

    fn set_status(&self, status: &str) {
        if self.status.is_some() {
            self.write_status(&format!("\r\x1b[2K{status}"));
            self.status_visible.store(true, Ordering::SeqCst);
        }
    }

    fn hide_status(&self) {
        if self.status_visible.swap(false, Ordering::SeqCst) {
            self.write_status("\r\x1b[2K");
        }
    }
}

/// Runs one turn for `prompt` on a fresh conversation.
pub async fn say_once(
    orchestrator: &TurnOrchestrator,
    system_prompt: Option<String>,
    prompt: String,
    display: &dyn Display,
    cancel_token: &CancellationToken,
) -> TurnOutcome {
    let conversation = Conversation::new(system_prompt);
    let mut turn = conversation.begin_turn(prompt);
    orchestrator
        .complete_turn(&mut turn, display, cancel_token)
        .await
}

pub async fn run_say(
    prompt: Vec<String>,
    orchestrator: Arc<TurnOrchestrator>,
    config: &Config,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: astrid say <prompt>");
        std::process::exit(1);
    }

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Ctrl-C received; cancelling");
            ctrl_c_token.cancel();
        }
    });

    let display = StdoutDisplay::new();
    let outcome = say_once(
        &orchestrator,
        config.system_prompt().map(str::to_string),
        prompt,
        &display,
        &cancel_token,
    )
    .await;
    display.finish();
    ctrl_c.abort();

    match outcome {
        TurnOutcome::Completed { .. } => Ok(()),
        TurnOutcome::Cancelled { .. } => {
            eprintln!("Cancelled.");
            std::process::exit(1);
        }
        // The orchestrator already reported these on the display.
        TurnOutcome::Failed { .. } | TurnOutcome::ToolLimitExceeded { .. } => {
            std::process::exit(1);
        }
    }
}
