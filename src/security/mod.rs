//! Cross-origin access for pages that embed the chat widget.
//!
//! When the widget is served from the same origin as the relay no CORS
//! headers are needed and the allow-list stays empty. Sites that embed the
//! widget from elsewhere list their origins in the configuration.

use std::sync::Arc;

use crate::context::Context;
use crate::http::{Method, Response, StatusCode};
use crate::middleware::{BoxResponseFuture, Middleware, Next};

/// CORS middleware.
///
/// - Requests without an `Origin`, or from an origin not on the list, pass
///   through untouched.
/// - `OPTIONS` preflights from an allowed origin are answered with
///   `204 No Content` and never reach the router.
/// - Other requests from an allowed origin get `Access-Control-Allow-Origin`
///   added to whatever the handler returned, streamed or not.
///
/// ```
/// use chatrelay::security::CorsMiddleware;
///
/// let cors = CorsMiddleware::new(["https://example.com"]);
/// assert!(cors.allows("https://example.com"));
/// assert!(!cors.allows("https://evil.example"));
/// ```
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    allowed_origins: Arc<[String]>,
}

impl CorsMiddleware {
    const ALLOW_METHODS: &'static str = "POST, OPTIONS";
    const ALLOW_HEADERS: &'static str = "Content-Type";
    const MAX_AGE_SECS: &'static str = "3600";

    /// Builds the middleware from an allow-list; `"*"` admits every origin.
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_origins: origins.into_iter().map(Into::into).collect(),
        }
    }

    fn is_wildcard(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    /// Returns `true` if requests from `origin` get CORS headers.
    pub fn allows(&self, origin: &str) -> bool {
        self.is_wildcard() || self.allowed_origins.iter().any(|o| o == origin)
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponseFuture {
        let origin = ctx
            .request()
            .headers()
            .get("origin")
            .filter(|origin| self.allows(origin))
            .map(|origin| (if self.is_wildcard() { "*" } else { origin }).to_owned());
        let is_preflight = ctx.request().method() == &Method::Options;

        Box::pin(async move {
            let Some(allow_origin) = origin else {
                return next.run(ctx).await;
            };
            let echoed = allow_origin != "*";

            let mut response = if is_preflight {
                Response::new(StatusCode::NoContent)
                    .header("Access-Control-Allow-Methods", Self::ALLOW_METHODS)
                    .header("Access-Control-Allow-Headers", Self::ALLOW_HEADERS)
                    .header("Access-Control-Max-Age", Self::MAX_AGE_SECS)
            } else {
                next.run(ctx).await
            };

            response.add_header("Access-Control-Allow-Origin", allow_origin);
            if echoed {
                response.add_header("Vary", "Origin");
            }
            response
        })
    }
}
