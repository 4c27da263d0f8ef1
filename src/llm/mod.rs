//! Chat-completion provider integration.
//!
//! The relay talks to one OpenAI-compatible provider. A call carries exactly
//! two messages (the fixed system instruction and the visitor's latest
//! message) and asks for a streamed answer. The provider's stream is
//! reduced to a [`DeltaStream`] of non-empty text fragments.

pub mod openai;
pub mod prompt;

use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openai::OpenAiClient;
pub use prompt::SystemPrompt;

/// Errors talking to the provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The client could not be built from the configuration.
    #[error("failed to build provider client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connecting or sending the request failed before any response arrived.
    #[error("provider request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body broke off after streaming had started.
    #[error("provider stream failed: {0}")]
    Stream(#[source] reqwest::Error),
}

/// Stream of non-empty assistant text fragments, in provider order.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send + 'static>>;

/// Boxed future returned by [`ChatProvider::stream_chat`].
pub type DeltaStreamFuture<'a> =
    Pin<Box<dyn Future<Output = Result<DeltaStream, UpstreamError>> + Send + 'a>>;

/// A provider that can stream a chat completion.
///
/// The future resolves once the provider has accepted the request (a 2xx
/// status), so every failure before that point is reported here and never
/// through the stream.
pub trait ChatProvider: Send + Sync {
    fn stream_chat(&self, request: CompletionRequest) -> DeltaStreamFuture<'_>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Body of a streamed chat-completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

impl CompletionRequest {
    /// A single-shot streamed request: the system instruction, then `message`
    /// verbatim as the only user turn.
    pub fn single_turn(
        model: impl Into<String>,
        system: impl Into<String>,
        message: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: system.into(),
                },
                ChatMessage {
                    role: Role::User,
                    content: message.into(),
                },
            ],
            max_tokens,
            temperature,
            stream: true,
        }
    }

    /// Content of the user turn.
    pub fn user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Extracts the incremental text of the first choice from one streamed
/// completion record.
///
/// `Ok(None)` covers records that legitimately carry no text: the opening
/// role announcement, the finish record, usage-only records.
pub fn parse_delta(payload: &str) -> Result<Option<String>, serde_json::Error> {
    let chunk: CompletionChunk = serde_json::from_str(payload)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_turn_request_shape() {
        let request = CompletionRequest::single_turn("gpt-3.5-turbo", "be brief", "hi there", 400, 0.7);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(
            json["messages"],
            serde_json::json!([
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "hi there" }
            ])
        );
        assert_eq!(json["max_tokens"], 400);
        assert_eq!(json["stream"], true);
        let temperature = json["temperature"].as_f64().unwrap();
        assert!((temperature - 0.7).abs() < 1e-6);
        assert_eq!(request.user_message(), Some("hi there"));
    }

    #[test]
    fn delta_with_text() {
        let payload = r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        assert_eq!(parse_delta(payload).unwrap(), Some("Hel".to_owned()));
    }

    #[test]
    fn role_and_finish_records_carry_no_text() {
        let opening = r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#;
        let finish = r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        let usage = r#"{"choices":[],"usage":{"total_tokens":9}}"#;
        assert_eq!(parse_delta(opening).unwrap(), None);
        assert_eq!(parse_delta(finish).unwrap(), None);
        assert_eq!(parse_delta(usage).unwrap(), None);
    }

    #[test]
    fn malformed_record_is_an_error() {
        assert!(parse_delta(r#"{"choices":[{"delta":{"content":"x"}"#).is_err());
    }
}
