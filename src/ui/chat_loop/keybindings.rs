//! Key bindings for the chat view.
//!
//! Keys are resolved to a [`KeyAction`] first so the event loop only has to
//! act on intent. Anything unbound goes to the input line.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    Submit,
    CancelTurn,
    ScrollUp,
    ScrollDown,
    PageUp,
    PageDown,
    ScrollToTop,
    ScrollToBottom,
    Edit,
}

pub fn resolve_key(key: &KeyEvent) -> KeyAction {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') | KeyCode::Char('d') if ctrl => KeyAction::Quit,
        // The input is a single line, so every Enter submits.
        KeyCode::Enter => KeyAction::Submit,
        KeyCode::Esc => KeyAction::CancelTurn,
        KeyCode::Up => KeyAction::ScrollUp,
        KeyCode::Down => KeyAction::ScrollDown,
        KeyCode::PageUp => KeyAction::PageUp,
        KeyCode::PageDown => KeyAction::PageDown,
        KeyCode::Home if ctrl => KeyAction::ScrollToTop,
        KeyCode::End if ctrl => KeyAction::ScrollToBottom,
        _ => KeyAction::Edit,
    }
}
