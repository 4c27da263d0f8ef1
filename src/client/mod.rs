//! Chat client: the widget's side of the relay.
//!
//! A [`ChatSession`] owns a [`Conversation`] and a [`ChatTransport`]. Every
//! accepted send adds the visitor's turn at once, streams the reply into the
//! conversation's open reply, and finishes with exactly one bot turn: the
//! full reply text on success, [`FALLBACK`] on any failure.

pub mod conversation;
pub mod linkify;
pub mod transport;
pub mod turn;

use futures_util::StreamExt;
use thiserror::Error;
use tracing::warn;

pub use conversation::{Conversation, FALLBACK, GREETING, SendError};
pub use linkify::{LinkKind, Segment, linkify, render_html};
pub use transport::{ChatTransport, ClientError, ContentStream, RelayClient};
pub use turn::{Sender, Turn};

/// Why a reply ended in the fallback turn.
#[derive(Debug, Error)]
enum ReplyError {
    #[error(transparent)]
    Transport(#[from] ClientError),

    #[error(transparent)]
    Conversation(#[from] SendError),
}

pub struct ChatSession<T> {
    transport: T,
    conversation: Conversation,
}

impl<T: ChatTransport> ChatSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            conversation: Conversation::new(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Sends `text` and waits for the finished reply.
    ///
    /// # Errors
    ///
    /// Only [`SendError`]s from [`Conversation::begin`]; transport failures
    /// become the fallback turn.
    pub async fn send(&mut self, text: &str) -> Result<&Turn, SendError> {
        self.send_with(text, |_| {}).await
    }

    /// Like [`send`](Self::send), calling `on_fragment` for each piece of
    /// the reply as it arrives.
    pub async fn send_with<F>(&mut self, text: &str, mut on_fragment: F) -> Result<&Turn, SendError>
    where
        F: FnMut(&str),
    {
        self.conversation.begin(text)?;

        let Self {
            transport,
            conversation,
        } = &mut *self;
        let outcome = async {
            let mut fragments = transport.open(text.to_owned()).await?;
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment?;
                on_fragment(&fragment);
                conversation.append(&fragment)?;
            }
            Ok::<(), ReplyError>(())
        }
        .await;

        match outcome {
            Ok(()) => self.conversation.complete(),
            Err(e) => {
                warn!(error = %e, "chat reply failed");
                self.conversation.fail()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use futures_util::stream;

    use transport::ContentStreamFuture;

    #[derive(Clone, Default)]
    struct Scripted {
        fragments: Vec<&'static str>,
        break_at_end: bool,
        refuse: bool,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl ChatTransport for Scripted {
        fn open(&self, message: String) -> ContentStreamFuture<'_> {
            self.sent.lock().unwrap().push(message);
            let refuse = self.refuse;
            let mut items: Vec<Result<String, ClientError>> =
                self.fragments.iter().map(|f| Ok((*f).to_owned())).collect();
            if self.break_at_end {
                items.push(Err(ClientError::Status(599)));
            }
            Box::pin(async move {
                if refuse {
                    return Err(ClientError::Status(500));
                }
                Ok(Box::pin(stream::iter(items)) as ContentStream)
            })
        }
    }

    #[tokio::test]
    async fn reply_is_the_concatenated_stream() {
        let transport = Scripted {
            fragments: vec!["For an industrial website ", "I recommend ", "Next.js with Django."],
            ..Scripted::default()
        };
        let sent = Arc::clone(&transport.sent);
        let mut session = ChatSession::new(transport);

        let mut seen = Vec::new();
        let reply = session
            .send_with("I need an industrial website", |f| seen.push(f.to_owned()))
            .await
            .unwrap();
        assert_eq!(reply.text, "For an industrial website I recommend Next.js with Django.");
        assert_eq!(seen.len(), 3);
        assert_eq!(*sent.lock().unwrap(), vec!["I need an industrial website"]);

        let turns = session.conversation().turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].text, "I need an industrial website");
        assert!(!session.conversation().is_awaiting_reply());
    }

    #[tokio::test]
    async fn refused_request_falls_back() {
        let mut session = ChatSession::new(Scripted {
            refuse: true,
            ..Scripted::default()
        });
        assert_eq!(session.send("hello").await.unwrap().text, FALLBACK);
    }

    #[tokio::test]
    async fn broken_stream_falls_back_instead_of_partial_text() {
        let mut session = ChatSession::new(Scripted {
            fragments: vec!["partial "],
            break_at_end: true,
            ..Scripted::default()
        });
        assert_eq!(session.send("hello").await.unwrap().text, FALLBACK);
        assert_eq!(session.conversation().turns().len(), 3);
    }

    #[test]
    fn reply_errors_keep_their_cause() {
        let err = ReplyError::from(SendError::NotAwaitingReply);
        assert!(matches!(err, ReplyError::Conversation(SendError::NotAwaitingReply)));
        assert_eq!(err.to_string(), "no reply is open");

        let err = ReplyError::from(ClientError::Status(502));
        assert_eq!(err.to_string(), "relay returned HTTP 502");
    }

    #[tokio::test]
    async fn blank_message_is_not_sent() {
        let transport = Scripted::default();
        let sent = Arc::clone(&transport.sent);
        let mut session = ChatSession::new(transport);
        assert_eq!(session.send("   ").await.unwrap_err(), SendError::Empty);
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(session.conversation().turns().len(), 1);
    }
}
