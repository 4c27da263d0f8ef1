//! Per-request context handed to middleware and route handlers.

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::http::Request;

/// Why a request body could not be read as JSON.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("expected a Content-Type of application/json")]
    NotJson,

    #[error("malformed JSON body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Per-request context.
pub struct Context {
    request: Request,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn into_request(self) -> Request {
        self.request
    }

    /// Decodes the request body as JSON.
    ///
    /// A missing `Content-Type` is tolerated; browsers' `fetch` with a string
    /// body and hand-written clients often omit it. An explicit non-JSON
    /// media type is rejected.
    pub fn json<T>(&self) -> Result<T, BodyError>
    where
        T: DeserializeOwned,
    {
        if self.request.headers().contains("content-type") && !self.request.is_json() {
            return Err(BodyError::NotJson);
        }
        Ok(serde_json::from_slice(self.request.body())?)
    }
}
