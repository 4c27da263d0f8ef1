//! The chat relay: `POST /api/chat`.
//!
//! Each request is single-shot. The relay validates the visitor's message,
//! makes exactly one streamed call to the provider with the fixed system
//! instruction, and re-frames every text delta as one
//! `data: {"content": "..."}` record on a chunked response.
//!
//! Failures before the provider accepts the call become a JSON error
//! response. Once streaming has started the status line is already on the
//! wire, so a provider failure breaks the chunked body instead: the
//! connection closes without the terminating chunk and the client sees a
//! truncated stream rather than a clean end.
//!
//! If the client disconnects, the response body is dropped along with the
//! provider response inside it, which aborts the provider call.

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, UpstreamConfig};
use crate::context::Context;
use crate::http::{Body, Response, StatusCode};
use crate::llm::{ChatProvider, CompletionRequest, OpenAiClient, SystemPrompt, UpstreamError};
use crate::middleware::LoggerMiddleware;
use crate::router::Router;
use crate::security::CorsMiddleware;
use crate::sse::data_record;

/// Path the widget posts to.
pub const CHAT_PATH: &str = "/api/chat";

/// Error text returned when the provider call fails before streaming.
pub const UPSTREAM_FAILURE: &str = "Failed to get AI response";

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

/// One fragment of assistant text as sent to the widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
}

/// Failures reported before any chunk is produced.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid chat request: {0}")]
    Validation(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Failures after streaming has begun.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("failed to encode chunk: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Chunks in provider order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Chunk, StreamError>> + Send + 'static>>;

/// Forwards single messages to a [`ChatProvider`].
pub struct Relay {
    provider: Arc<dyn ChatProvider>,
    prompt: SystemPrompt,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl Relay {
    pub fn new(provider: Arc<dyn ChatProvider>, config: &UpstreamConfig) -> Self {
        Self {
            provider,
            prompt: SystemPrompt::new(&config.contact),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// Builds a relay backed by the OpenAI-compatible client.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = OpenAiClient::new(config)?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn prompt(&self) -> &SystemPrompt {
        &self.prompt
    }

    /// Validates `request` and opens the provider stream.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Validation`] if the message is missing, `null` or
    ///   `""`. No provider call is made.
    /// - [`RelayError::Upstream`] if the provider could not be reached or
    ///   answered with a non-success status.
    pub async fn relay(&self, request: ChatRequest) -> Result<ChunkStream, RelayError> {
        // Only absence is rejected; whitespace is forwarded as typed.
        let message = match request.message {
            Some(message) if !message.is_empty() => message,
            _ => return Err(RelayError::Validation("Message is required".to_owned())),
        };

        info!(chars = message.chars().count(), model = %self.model, "relaying chat message");

        let completion = CompletionRequest::single_turn(
            self.model.as_str(),
            self.prompt.as_str(),
            message,
            self.max_tokens,
            self.temperature,
        );
        let deltas = self.provider.stream_chat(completion).await?;

        Ok(Box::pin(deltas.map(|delta| {
            delta
                .map(|content| Chunk { content })
                .map_err(StreamError::from)
        })))
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

/// Handler for `POST /api/chat`.
pub async fn handle_chat(relay: Arc<Relay>, ctx: Context) -> Response {
    let request: ChatRequest = match ctx.json() {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "rejecting chat request body");
            return error_response(StatusCode::BadRequest, &e.to_string());
        }
    };

    match relay.relay(request).await {
        Ok(chunks) => Response::new(StatusCode::Ok)
            .header("Content-Type", "text/plain; charset=utf-8")
            .header("Cache-Control", "no-cache")
            .body(Body::from_stream(chunks.map(encode))),
        Err(RelayError::Validation(reason)) => {
            warn!(%reason, "rejecting chat request");
            error_response(StatusCode::BadRequest, &reason)
        }
        Err(RelayError::Upstream(e)) => {
            warn!(error = %e, "provider call failed");
            error_response(StatusCode::InternalServerError, UPSTREAM_FAILURE)
        }
    }
}

fn encode(chunk: Result<Chunk, StreamError>) -> Result<Bytes, StreamError> {
    let json = serde_json::to_string(&chunk?)?;
    Ok(data_record(&json))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    Response::new(status).json(&serde_json::json!({ "error": message }))
}

/// Builds the relay's router: request logging, CORS, and `POST /api/chat`.
pub fn router(relay: Arc<Relay>, allowed_origins: &[String]) -> Router {
    let mut router = Router::new();
    router.layer(LoggerMiddleware);
    router.layer(CorsMiddleware::new(allowed_origins.iter().cloned()));
    router.post(CHAT_PATH, move |ctx: Context| handle_chat(Arc::clone(&relay), ctx));
    router
}

/// Builds the complete application from `config`.
pub fn app(config: &Config) -> Result<Router, UpstreamError> {
    let relay = Relay::from_config(&config.upstream)?;
    Ok(router(Arc::new(relay), &config.allowed_origins))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use futures_util::stream;

    use crate::http::Request;
    use crate::llm::{DeltaStream, DeltaStreamFuture};

    enum Script {
        Deltas(Vec<&'static str>),
        Refuse(u16),
        BreakAfter(Vec<&'static str>),
    }

    struct ScriptedProvider {
        script: Script,
        calls: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl ChatProvider for ScriptedProvider {
        fn stream_chat(&self, request: CompletionRequest) -> DeltaStreamFuture<'_> {
            self.calls.lock().unwrap().push(request);
            let result = match &self.script {
                Script::Deltas(deltas) => {
                    let items: Vec<Result<String, UpstreamError>> =
                        deltas.iter().map(|d| Ok((*d).to_owned())).collect();
                    Ok(Box::pin(stream::iter(items)) as DeltaStream)
                }
                Script::Refuse(status) => Err(UpstreamError::Status {
                    status: *status,
                    body: "nope".to_owned(),
                }),
                Script::BreakAfter(deltas) => {
                    let mut items: Vec<Result<String, UpstreamError>> =
                        deltas.iter().map(|d| Ok((*d).to_owned())).collect();
                    items.push(Err(UpstreamError::Status {
                        status: 502,
                        body: "reset".to_owned(),
                    }));
                    Ok(Box::pin(stream::iter(items)) as DeltaStream)
                }
            };
            Box::pin(async move { result })
        }
    }

    fn relay_with(provider: Arc<ScriptedProvider>) -> Arc<Relay> {
        let config = UpstreamConfig::new("sk-test").with_model("test-model");
        Arc::new(Relay::new(provider, &config))
    }

    fn post(body: &str) -> Request {
        let raw = format!(
            "POST /api/chat HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        let (request, _) = Request::parse(raw.as_bytes()).unwrap();
        request.with_body(Bytes::from(body.to_owned()))
    }

    async fn render(response: Response) -> String {
        let mut out = Vec::new();
        let _ = response.write_to(&mut out).await;
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn one_call_with_the_message_verbatim() {
        let provider = ScriptedProvider::new(Script::Deltas(vec!["Hi"]));
        let relay = relay_with(Arc::clone(&provider));

        let message = "  I need an industrial website\n";
        let chunks = relay.relay(ChatRequest::new(message)).await.unwrap();
        let chunks: Vec<_> = chunks.collect().await;
        assert_eq!(chunks.len(), 1);

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].user_message(), Some(message));
        assert_eq!(calls[0].messages[0].content, relay.prompt().as_str());
        assert_eq!(calls[0].model, "test-model");
        assert!(calls[0].stream);
    }

    #[tokio::test]
    async fn chunks_concatenate_to_the_streamed_text() {
        let provider = ScriptedProvider::new(Script::Deltas(vec!["Next.js ", "with ", "Django"]));
        let relay = relay_with(provider);

        let text: String = relay
            .relay(ChatRequest::new("stack?"))
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap().content)
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(text, "Next.js with Django");
    }

    #[tokio::test]
    async fn missing_or_empty_message_never_reaches_the_provider() {
        let provider = ScriptedProvider::new(Script::Deltas(vec!["x"]));
        let relay = relay_with(Arc::clone(&provider));

        for request in [ChatRequest::default(), ChatRequest::new("")] {
            let err = relay.relay(request).await.err().unwrap();
            assert!(matches!(err, RelayError::Validation(_)));
        }
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn whitespace_message_is_forwarded() {
        let provider = ScriptedProvider::new(Script::Deltas(vec!["x"]));
        let relay = relay_with(Arc::clone(&provider));

        assert!(relay.relay(ChatRequest::new("   ")).await.is_ok());
        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].user_message(), Some("   "));
    }

    #[tokio::test]
    async fn null_message_is_a_400() {
        let relay = relay_with(ScriptedProvider::new(Script::Deltas(vec![])));
        let response = handle_chat(relay, Context::new(post(r#"{"message":null}"#))).await;
        assert_eq!(response.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn streamed_response_is_reframed() {
        let relay = relay_with(ScriptedProvider::new(Script::Deltas(vec!["Hel", "lo \"you\""])));
        let response = handle_chat(relay, Context::new(post(r#"{"message":"hi"}"#))).await;

        assert_eq!(response.status(), StatusCode::Ok);
        assert!(response.is_streaming());
        assert_eq!(response.headers().get("cache-control"), Some("no-cache"));

        let wire = render(response).await;
        assert!(wire.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(wire.contains("data: {\"content\":\"Hel\"}\n\n"));
        assert!(wire.contains("data: {\"content\":\"lo \\\"you\\\"\"}\n\n"));
        assert!(wire.ends_with("0\r\n\r\n"));
    }

    #[tokio::test]
    async fn refused_provider_call_is_a_500_without_chunks() {
        let relay = relay_with(ScriptedProvider::new(Script::Refuse(401)));
        let response = handle_chat(relay, Context::new(post(r#"{"message":"hi"}"#))).await;

        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert!(!response.is_streaming());
        let wire = render(response).await;
        assert!(wire.ends_with(r#"{"error":"Failed to get AI response"}"#));
        assert!(!wire.contains("data:"));
    }

    #[tokio::test]
    async fn missing_message_is_a_400() {
        let relay = relay_with(ScriptedProvider::new(Script::Deltas(vec![])));
        let response = handle_chat(relay, Context::new(post("{}"))).await;
        assert_eq!(response.status(), StatusCode::BadRequest);
        assert!(render(response).await.ends_with(r#"{"error":"Message is required"}"#));
    }

    #[tokio::test]
    async fn malformed_body_is_a_400() {
        let relay = relay_with(ScriptedProvider::new(Script::Deltas(vec![])));
        let response = handle_chat(relay, Context::new(post("{\"message\":"))).await;
        assert_eq!(response.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn mid_stream_failure_breaks_the_body() {
        let relay = relay_with(ScriptedProvider::new(Script::BreakAfter(vec!["partial"])));
        let response = handle_chat(relay, Context::new(post(r#"{"message":"hi"}"#))).await;
        assert_eq!(response.status(), StatusCode::Ok);

        let mut out = Vec::new();
        let result = response.write_to(&mut out).await;
        assert!(result.is_err());
        let wire = String::from_utf8(out).unwrap();
        assert!(wire.contains("data: {\"content\":\"partial\"}\n\n"));
        assert!(!wire.ends_with("0\r\n\r\n"));
    }

    #[tokio::test]
    async fn router_serves_only_post_on_the_chat_path() {
        let relay = relay_with(ScriptedProvider::new(Script::Deltas(vec!["ok"])));
        let router = router(relay, &[]);
        assert_eq!(router.len(), 1);

        let (get, _) = Request::parse(b"GET /api/chat HTTP/1.1\r\n\r\n").unwrap();
        let response = router.route(get).await;
        assert_eq!(response.status(), StatusCode::MethodNotAllowed);
        assert_eq!(response.headers().get("allow"), Some("POST"));

        let response = router.route(post(r#"{"message":"hi"}"#)).await;
        assert_eq!(response.status(), StatusCode::Ok);
    }
}
