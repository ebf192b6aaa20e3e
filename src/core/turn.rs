use crate::core::message::{Message, Role};

/// Message history for one user exchange.
///
/// Seeded from the committed conversation plus the new user message, then
/// extended by the orchestrator as assistant and tool messages arrive.
#[derive(Debug, Clone)]
pub struct TurnState {
    messages: Vec<Message>,
    seeded_len: usize,
}

impl TurnState {
    pub fn new(prior: Vec<Message>, user_text: impl Into<String>) -> Self {
        let mut messages = prior;
        messages.push(Message::user(user_text));
        let seeded_len = messages.len();
        Self {
            messages,
            seeded_len,
        }
    }

    /// Resumes from an explicit history, for example one ending in tool
    /// results from an interrupted loop.
    pub fn from_history(messages: Vec<Message>) -> Self {
        let seeded_len = messages.len();
        Self {
            messages,
            seeded_len,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Messages added since the state was seeded.
    pub fn messages_appended(&self) -> &[Message] {
        &self.messages[self.seeded_len..]
    }

    pub fn last_role(&self) -> Option<Role> {
        self.messages.last().map(|message| message.role)
    }

    /// A model request may only be issued when the history ends in a role
    /// the model is expected to answer.
    pub fn is_ready(&self) -> bool {
        matches!(self.last_role(), Some(role) if role != Role::Assistant)
    }

    pub fn into_history(self) -> Vec<Message> {
        self.messages
    }
}
