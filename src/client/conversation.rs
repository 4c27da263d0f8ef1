//! Conversation state: the ordered turn list plus at most one open reply.
//!
//! ```text
//!              begin(text)
//!   Idle ─────────────────────▶ Awaiting reply ──┐ append(fragment)
//!    ▲                              │    ▲───────┘
//!    │      complete() / fail()     │
//!    └──────────────────────────────┘
//! ```

use thiserror::Error;

use super::turn::Turn;

/// The assistant's opening line.
pub const GREETING: &str = "Hi! I'm your project consultation assistant. Tell me about your project \
requirements and I'll help you understand how we can bring your vision to life!";

/// The reply shown for every failed exchange.
pub const FALLBACK: &str = "I'm sorry, I'm having trouble connecting right now. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("message is empty")]
    Empty,

    #[error("a reply is already being received")]
    Busy,

    #[error("no reply is open")]
    NotAwaitingReply,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
    open_reply: Option<String>,
}

impl Conversation {
    /// A conversation holding only the greeting.
    pub fn new() -> Self {
        Self {
            turns: vec![Turn::bot(GREETING)],
            open_reply: None,
        }
    }

    /// Turns in the order they were added.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Text received so far for the reply being streamed.
    pub fn open_reply(&self) -> Option<&str> {
        self.open_reply.as_deref()
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.open_reply.is_some()
    }

    /// Adds the visitor's turn and opens a reply for it.
    ///
    /// # Errors
    ///
    /// - [`SendError::Empty`] for blank input.
    /// - [`SendError::Busy`] while another reply is open.
    pub fn begin(&mut self, text: &str) -> Result<&Turn, SendError> {
        if self.is_awaiting_reply() {
            return Err(SendError::Busy);
        }
        if text.trim().is_empty() {
            return Err(SendError::Empty);
        }
        self.open_reply = Some(String::new());
        Ok(self.push(Turn::user(text)))
    }

    /// Extends the open reply.
    pub fn append(&mut self, fragment: &str) -> Result<(), SendError> {
        let reply = self.open_reply.as_mut().ok_or(SendError::NotAwaitingReply)?;
        reply.push_str(fragment);
        Ok(())
    }

    /// Closes the open reply and adds it as a bot turn.
    pub fn complete(&mut self) -> Result<&Turn, SendError> {
        let text = self.open_reply.take().ok_or(SendError::NotAwaitingReply)?;
        Ok(self.push(Turn::bot(text)))
    }

    /// Discards the open reply and adds the [`FALLBACK`] turn instead.
    pub fn fail(&mut self) -> Result<&Turn, SendError> {
        self.open_reply.take().ok_or(SendError::NotAwaitingReply)?;
        Ok(self.push(Turn::bot(FALLBACK)))
    }

    fn push(&mut self, turn: Turn) -> &Turn {
        let index = self.turns.len();
        self.turns.push(turn);
        &self.turns[index]
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::turn::Sender;

    #[test]
    fn starts_with_the_greeting() {
        let conversation = Conversation::new();
        assert_eq!(conversation.turns().len(), 1);
        assert_eq!(conversation.turns()[0].text, GREETING);
        assert!(conversation.turns()[0].is_bot());
        assert!(!conversation.is_awaiting_reply());
    }

    #[test]
    fn streamed_reply_becomes_one_bot_turn() {
        let mut conversation = Conversation::new();
        conversation.begin("I need an app").unwrap();
        conversation.append("React ").unwrap();
        assert_eq!(conversation.open_reply(), Some("React "));
        conversation.append("Native").unwrap();

        let reply = conversation.complete().unwrap();
        assert_eq!(reply.text, "React Native");
        assert_eq!(reply.sender, Sender::Bot);

        let senders: Vec<_> = conversation.turns().iter().map(|t| t.sender).collect();
        assert_eq!(senders, vec![Sender::Bot, Sender::User, Sender::Bot]);
        assert_eq!(conversation.open_reply(), None);
    }

    #[test]
    fn failure_discards_partial_text() {
        let mut conversation = Conversation::new();
        conversation.begin("hello").unwrap();
        conversation.append("half an ans").unwrap();
        assert_eq!(conversation.fail().unwrap().text, FALLBACK);
        assert!(!conversation.turns().iter().any(|t| t.text.contains("half")));
    }

    #[test]
    fn one_open_reply_at_a_time() {
        let mut conversation = Conversation::new();
        conversation.begin("first").unwrap();
        assert_eq!(conversation.begin("second").unwrap_err(), SendError::Busy);
        assert_eq!(conversation.turns().len(), 2);
    }

    #[test]
    fn blank_input_is_refused() {
        let mut conversation = Conversation::new();
        assert_eq!(conversation.begin(" \n\t").unwrap_err(), SendError::Empty);
        assert_eq!(conversation.turns().len(), 1);
    }

    #[test]
    fn closing_without_an_open_reply_is_an_error() {
        let mut conversation = Conversation::new();
        assert_eq!(conversation.append("x"), Err(SendError::NotAwaitingReply));
        assert_eq!(conversation.complete().unwrap_err(), SendError::NotAwaitingReply);
        assert_eq!(conversation.fail().unwrap_err(), SendError::NotAwaitingReply);
    }
}
