use crate::core::message::{Message, Role};
use crate::core::turn::TurnState;

/// In-memory conversation shared across turns of one session.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    system_prompt: Option<String>,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: Option<String>) -> Self {
        let system_prompt = system_prompt.filter(|prompt| !prompt.trim().is_empty());
        let messages = system_prompt
            .iter()
            .map(|prompt| Message::system(prompt.clone()))
            .collect();
        Self {
            system_prompt,
            messages,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of user exchanges recorded so far.
    pub fn user_turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.role == Role::User)
            .count()
    }

    pub fn begin_turn(&self, user_text: impl Into<String>) -> TurnState {
        TurnState::new(self.messages.clone(), user_text)
    }

    /// Replaces the history with the turn's outcome, including partial turns
    /// so the user message is kept after a failure.
    pub fn commit(&mut self, turn: TurnState) {
        self.messages = turn.into_history();
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        if let Some(prompt) = &self.system_prompt {
            self.messages.push(Message::system(prompt.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_and_commit_extend_history() {
        let mut conversation = Conversation::new(Some("be brief".into()));
        let mut turn = conversation.begin_turn("hi");
        turn.push(Message::assistant("hello"));
        conversation.commit(turn);

        let roles: Vec<Role> = conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(conversation.user_turns(), 1);
    }

    #[test]
    fn clear_keeps_system_prompt() {
        let mut conversation = Conversation::new(Some("be brief".into()));
        conversation.commit(conversation.begin_turn("hi"));
        conversation.clear();
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.messages()[0].role, Role::System);
    }

    #[test]
    fn blank_system_prompt_is_dropped() {
        let conversation = Conversation::new(Some("   ".into()));
        assert!(conversation.is_empty());
    }
}
