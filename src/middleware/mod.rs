//! Middleware pipeline: logic that runs around the request handler.
//!
//! Each middleware wraps the rest of the chain. It can inspect the request,
//! short-circuit with its own response (CORS preflight does this), or
//! decorate the downstream response. The last link of every chain is the
//! router's dispatcher.
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain.
//! - [`LoggerMiddleware`]: one `tracing` line per request.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;

use crate::{context::Context, http::Response, router::Handler};

/// Boxed future returned by middleware and handlers.
pub type BoxResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type-erased, cheaply cloneable middleware function.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> BoxResponseFuture + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`Next::run`], so a middleware can forward a request
/// at most once.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    index: usize,
    endpoint: Handler,
}

impl Next {
    /// Positions a cursor at the start of `middlewares`, ending in `endpoint`.
    pub fn new(middlewares: Arc<[MiddlewareHandler]>, endpoint: Handler) -> Self {
        Self {
            middlewares,
            index: 0,
            endpoint,
        }
    }

    /// Runs the next middleware, or the endpoint once the chain is exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// The core middleware trait.
///
/// Implementations are shared across connection tasks, so they must be
/// `Send + Sync` and must not hold `&mut` state across an `.await`.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponseFuture;
}

/// Logs method, path, status, and time-to-response for every request.
///
/// For a streamed response the duration covers the time until the head is
/// ready, not until the stream ends.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponseFuture {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().clone();
            let path = ctx.request().path().to_owned();

            let response = next.run(ctx).await;

            tracing::info!(
                streaming = response.is_streaming(),
                "{} {} - {} ({:?})",
                method,
                path,
                response.status().as_u16(),
                start.elapsed()
            );

            response
        })
    }
}
