//! Output surface the turn orchestrator writes to.
//!
//! Implementations must return promptly; the orchestrator calls these from
//! inside the running turn.

use std::sync::Arc;

pub trait Display: Send + Sync {
    /// Appends text exactly as given, with no separator.
    fn print_streaming_token(&self, text: &str);

    /// Writes a complete, newline-terminated line.
    fn print(&self, text: &str);

    fn set_status(&self, text: &str);

    fn hide_status(&self);
}

impl<T: Display + ?Sized> Display for Arc<T> {
    fn print_streaming_token(&self, text: &str) {
        (**self).print_streaming_token(text)
    }

    fn print(&self, text: &str) {
        (**self).print(text)
    }

    fn set_status(&self, text: &str) {
        (**self).set_status(text)
    }

    fn hide_status(&self) {
        (**self).hide_status()
    }
}
