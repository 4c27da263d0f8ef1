//! Request routing by method and path.
//!
//! Routes match on the exact path, with a trailing slash ignored, so
//! `/api/chat/` reaches the same handler as `/api/chat`. When the path is
//! known but the method is not, the router answers `405 Method Not Allowed`
//! with an `Allow` header instead of `404`.
//!
//! Middleware registered with [`Router::layer`] wraps every request,
//! including the ones that end in a 404 or 405.

use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::http::{Method, Request, Response, StatusCode};
use crate::middleware::{BoxResponseFuture, Middleware, MiddlewareHandler, Next, from_middleware};

/// Type-erased async handler.
pub type Handler = Arc<dyn Fn(Context) -> BoxResponseFuture + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Blanket-implemented for every `Fn(Context) -> impl Future<Output = Response>`
/// that can be shared across tasks.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxResponseFuture;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxResponseFuture {
        Box::pin((self)(ctx))
    }
}

#[derive(Clone)]
struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

/// HTTP request router.
///
/// ```rust,no_run
/// use chatrelay::context::Context;
/// use chatrelay::http::{Response, StatusCode};
/// use chatrelay::middleware::LoggerMiddleware;
/// use chatrelay::router::Router;
///
/// let mut router = Router::new();
/// router.post("/api/chat", |_ctx: Context| async { Response::new(StatusCode::Ok) });
/// router.layer(LoggerMiddleware);
/// ```
#[derive(Default)]
pub struct Router {
    routes: Arc<Vec<Route>>,
    middlewares: Vec<MiddlewareHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `GET path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Registers a handler for `POST path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Wraps every request in `middleware`.
    ///
    /// The first layer added is the outermost one.
    pub fn layer(&mut self, middleware: impl Middleware + 'static) {
        self.middlewares.push(from_middleware(Arc::new(middleware)));
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx: Context| handler.call(ctx));
        Arc::make_mut(&mut self.routes).push(Route {
            method,
            path: normalize(path).to_owned(),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Runs `request` through the middleware chain and the matching route.
    pub async fn route(&self, request: Request) -> Response {
        let routes = Arc::clone(&self.routes);
        let endpoint: Handler = Arc::new(move |ctx: Context| -> BoxResponseFuture {
            let routes = Arc::clone(&routes);
            Box::pin(async move { dispatch(&routes, ctx).await })
        });
        Next::new(Arc::from(self.middlewares.as_slice()), endpoint)
            .run(Context::new(request))
            .await
    }
}

async fn dispatch(routes: &[Route], ctx: Context) -> Response {
    let path = normalize(ctx.request().path());
    let mut allowed: Vec<&str> = Vec::new();

    for route in routes.iter().filter(|r| r.path == path) {
        if &route.method == ctx.request().method() {
            return (route.handler)(ctx).await;
        }
        allowed.push(route.method.as_str());
    }

    if allowed.is_empty() {
        Response::new(StatusCode::NotFound).body("Not Found")
    } else {
        Response::new(StatusCode::MethodNotAllowed).header("Allow", allowed.join(", "))
    }
}

fn normalize(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}
