//! Display port adapter for the full-screen UI.
//!
//! Turns run on their own tasks, so the orchestrator never touches the
//! terminal directly. [`ChannelDisplay`] forwards everything it is asked to
//! show as [`DisplayEvent`]s and the chat loop applies them to its
//! [`Transcript`](crate::ui::transcript::Transcript) between frames.

use tokio::sync::mpsc;

use crate::core::display::Display;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    Token(String),
    Line(String),
    Status(String),
    HideStatus,
}

#[derive(Clone)]
pub struct ChannelDisplay {
    tx: mpsc::UnboundedSender<DisplayEvent>,
}

impl ChannelDisplay {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DisplayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: DisplayEvent) {
        // The UI may already be gone during shutdown.
        let _ = self.tx.send(event);
    }
}

impl Display for ChannelDisplay {
    fn print_streaming_token(&self, token: &str) {
        self.send(DisplayEvent::Token(token.to_string()));
    }

    fn print(&self, line: &str) {
        self.send(DisplayEvent::Line(line.to_string()));
    }

    fn set_status(&self, status: &str) {
        self.send(DisplayEvent::Status(status.to_string()));
    }

    fn hide_status(&self) {
        self.send(DisplayEvent::HideStatus);
    }
}
