//! How a [`ChatSession`](super::ChatSession) reaches the relay.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tracing::debug;

use crate::relay::{CHAT_PATH, ChatRequest, Chunk};
use crate::sse::{EventDecoder, Frame};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("relay request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("relay returned HTTP {0}")]
    Status(u16),

    /// The reply stream broke off before its end.
    #[error("relay stream failed: {0}")]
    Stream(#[source] reqwest::Error),
}

/// Reply text fragments in arrival order.
pub type ContentStream = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send + 'static>>;

pub type ContentStreamFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ContentStream, ClientError>> + Send + 'a>>;

/// Opens a reply stream for one message.
pub trait ChatTransport: Send + Sync {
    fn open(&self, message: String) -> ContentStreamFuture<'_>;
}

/// [`ChatTransport`] over HTTP to a running relay.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RelayClient {
    /// `base_url` is the relay's origin, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self {
            http,
            endpoint: format!("{}{CHAT_PATH}", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ChatTransport for RelayClient {
    fn open(&self, message: String) -> ContentStreamFuture<'_> {
        Box::pin(async move {
            let response = self
                .http
                .post(&self.endpoint)
                .json(&ChatRequest::new(message))
                .send()
                .await
                .map_err(ClientError::Request)?;

            let status = response.status();
            if !status.is_success() {
                return Err(ClientError::Status(status.as_u16()));
            }
            Ok(contents(response))
        })
    }
}

fn contents(response: reqwest::Response) -> ContentStream {
    boxed(async_stream::try_stream! {
        let mut bytes = response.bytes_stream();
        let mut decoder = EventDecoder::new();
        let mut done = false;

        'read: while let Some(piece) = bytes.next().await {
            let piece = piece.map_err(ClientError::Stream)?;
            for frame in decoder.push(&piece) {
                match frame {
                    Frame::Done => {
                        done = true;
                        break 'read;
                    }
                    Frame::Data(payload) => {
                        if let Some(content) = content_of(&payload) {
                            yield content;
                        }
                    }
                }
            }
        }

        // Anything after `[DONE]` is discarded, even an unterminated tail.
        let tail = if done { None } else { decoder.finish() };
        if let Some(Frame::Data(payload)) = tail {
            if let Some(content) = content_of(&payload) {
                yield content;
            }
        }
    })
}

fn boxed<S>(stream: S) -> ContentStream
where
    S: Stream<Item = Result<String, ClientError>> + Send + 'static,
{
    Box::pin(stream)
}

fn content_of(payload: &str) -> Option<String> {
    match serde_json::from_str::<Chunk>(payload) {
        Ok(chunk) if !chunk.content.is_empty() => Some(chunk.content),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "skipping malformed relay record");
            None
        }
    }
}
