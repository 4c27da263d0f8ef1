//! Response bodies: either fully buffered or produced incrementally.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};

/// Error type carried by streamed bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A boxed stream of body frames.
///
/// An `Err` item aborts the response: the connection is closed without the
/// terminating zero-length chunk, so the peer observes a truncated body
/// rather than a clean end of stream.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send + 'static>>;

/// The payload of a [`Response`](super::Response).
pub enum Body {
    /// Written with a `Content-Length` header.
    Full(Bytes),
    /// Written with `Transfer-Encoding: chunked`, one chunk per frame.
    Stream(BodyStream),
}

impl Body {
    pub fn empty() -> Self {
        Self::Full(Bytes::new())
    }

    /// Wraps any fallible byte stream whose error converts into [`BoxError`].
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::Stream(stream.map_err(|e| -> BoxError { e.into() }).boxed())
    }

    /// Returns `true` for an empty buffered body.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Full(bytes) if bytes.is_empty())
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Full(Bytes::from(value))
    }
}

impl From<&'static str> for Body {
    fn from(value: &'static str) -> Self {
        Self::Full(Bytes::from_static(value.as_bytes()))
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::Full(Bytes::from(value))
    }
}
