use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::linkify::{Segment, linkify, render_html};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One message in a conversation.
///
/// Turns are immutable once pushed onto a
/// [`Conversation`](super::Conversation); a bot reply is only turned into a
/// `Turn` after its stream has ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            text: text.into(),
            sender,
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text)
    }

    pub fn is_bot(&self) -> bool {
        self.sender == Sender::Bot
    }

    /// Display segments. Only assistant text is linkified; what the visitor
    /// typed is shown as written.
    pub fn segments(&self) -> Vec<Segment> {
        match self.sender {
            Sender::Bot => linkify(&self.text),
            Sender::User => vec![Segment::Text(self.text.clone())],
        }
    }

    /// Escaped HTML for the turn's text.
    pub fn to_html(&self) -> String {
        render_html(&self.segments())
    }

    /// `HH:MM` in the local time zone.
    pub fn time_label(&self) -> String {
        self.timestamp.with_timezone(&Local).format("%H:%M").to_string()
    }
}
