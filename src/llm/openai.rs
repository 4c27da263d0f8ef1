//! OpenAI-compatible chat-completions client.
//!
//! Sends one streamed request per call and turns the provider's
//! `data: {json}` records into text deltas. Records that are not valid JSON
//! are skipped; the stream ends at `data: [DONE]` or when the provider
//! closes the connection.

use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{ChatProvider, CompletionRequest, DeltaStream, DeltaStreamFuture, UpstreamError, parse_delta};
use crate::config::UpstreamConfig;
use crate::sse::{EventDecoder, Frame};

/// Longest slice of an error body kept in [`UpstreamError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Client for `POST {base_url}/chat/completions`.
///
/// The API key is only exposed when the `Authorization` header is built.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: SecretString,
    url: String,
}

impl OpenAiClient {
    /// Builds a client with the configured connect and request timeouts.
    ///
    /// # Errors
    ///
    /// [`UpstreamError::Client`] if the TLS backend cannot be initialised.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(UpstreamError::Client)?;

        Ok(Self {
            http,
            api_key: SecretString::from(config.api_key.expose_secret().to_owned()),
            url: config.completions_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl ChatProvider for OpenAiClient {
    fn stream_chat(&self, request: CompletionRequest) -> DeltaStreamFuture<'_> {
        Box::pin(async move {
            debug!(url = %self.url, model = %request.model, "opening provider stream");

            let response = self
                .http
                .post(&self.url)
                .bearer_auth(self.api_key.expose_secret())
                .json(&request)
                .send()
                .await
                .map_err(UpstreamError::Transport)?;

            let status = response.status();
            if !status.is_success() {
                let mut body = response.text().await.unwrap_or_default();
                truncate(&mut body, MAX_ERROR_BODY);
                return Err(UpstreamError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(deltas(response))
        })
    }
}

/// Reads the provider's event stream and yields the non-empty deltas.
fn deltas(response: reqwest::Response) -> DeltaStream {
    boxed(async_stream::try_stream! {
        let mut bytes = response.bytes_stream();
        let mut decoder = EventDecoder::new();
        let mut done = false;
        let mut delivered = 0usize;

        'read: while let Some(piece) = bytes.next().await {
            let piece = piece.map_err(UpstreamError::Stream)?;
            for frame in decoder.push(&piece) {
                match frame {
                    Frame::Done => {
                        done = true;
                        break 'read;
                    }
                    Frame::Data(payload) => {
                        if let Some(text) = delta_of(&payload) {
                            delivered += 1;
                            yield text;
                        }
                    }
                }
            }
        }

        // Anything after `[DONE]` is discarded, even an unterminated tail.
        let tail = if done { None } else { decoder.finish() };
        if let Some(Frame::Data(payload)) = tail {
            if let Some(text) = delta_of(&payload) {
                delivered += 1;
                yield text;
            }
        }

        debug!(deltas = delivered, "provider stream finished");
    })
}

fn boxed<S>(stream: S) -> DeltaStream
where
    S: futures_util::Stream<Item = Result<String, UpstreamError>> + Send + 'static,
{
    Box::pin(stream)
}

fn delta_of(payload: &str) -> Option<String> {
    match parse_delta(payload) {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "skipping malformed provider record");
            None
        }
    }
}

fn truncate(text: &mut String, max: usize) {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
}
