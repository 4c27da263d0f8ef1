//! HTTP/1.1 response builder and writer.
//!
//! Buffered bodies are written with `Content-Length`; streamed bodies use
//! chunked transfer encoding and are flushed frame by frame so the peer can
//! render partial output as it arrives.

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{Body, BoxError, Headers, StatusCode};

/// Failure while writing a response to the peer.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The body stream yielded an error after the head was sent.
    #[error("response body failed mid-stream: {0}")]
    Body(#[source] BoxError),
}

/// An HTTP/1.1 response.
///
/// ```
/// use chatrelay::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::BadRequest)
///     .header("Cache-Control", "no-cache")
///     .json(&serde_json::json!({ "error": "message is required" }));
///
/// assert_eq!(response.status(), StatusCode::BadRequest);
/// assert_eq!(response.headers().get("content-type"), Some("application/json"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    keep_alive: bool,
}

impl Response {
    /// Creates a response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::empty(),
            keep_alive: true,
        }
    }

    /// Appends a response header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in place, for middleware decorating a downstream response.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Serializes `value` as the body and sets `Content-Type: application/json`.
    ///
    /// Serialization of the plain data types the relay emits cannot fail; if
    /// it ever does, the body is left empty.
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        if let Ok(bytes) = serde_json::to_vec(value) {
            self.headers.set("Content-Type", "application/json");
            self.body = Body::from(bytes);
        }
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn is_streaming(&self) -> bool {
        self.body.is_stream()
    }

    /// Returns whether the connection stays open after this response.
    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Writes the response to `out`, flushing after the head and after every
    /// streamed frame.
    ///
    /// # Errors
    ///
    /// - [`WriteError::Io`] if the peer went away.
    /// - [`WriteError::Body`] if a streamed body failed. The terminating
    ///   chunk is not written in that case; the caller must close the
    ///   connection.
    pub async fn write_to<W>(mut self, out: &mut W) -> Result<(), WriteError>
    where
        W: AsyncWrite + Unpin,
    {
        let body = std::mem::take(&mut self.body);
        match body {
            Body::Full(bytes) => {
                let mut buf = self.encode_head(Some(bytes.len()));
                buf.put(bytes);
                out.write_all(&buf).await?;
                out.flush().await?;
            }
            Body::Stream(mut frames) => {
                out.write_all(&self.encode_head(None)).await?;
                out.flush().await?;

                while let Some(frame) = frames.next().await {
                    let frame = frame.map_err(WriteError::Body)?;
                    if frame.is_empty() {
                        // A zero-length chunk would end the body early.
                        continue;
                    }
                    out.write_all(&encode_chunk(&frame)).await?;
                    out.flush().await?;
                }

                out.write_all(b"0\r\n\r\n").await?;
                out.flush().await?;
            }
        }
        Ok(())
    }

    /// Encodes the status line and headers.
    ///
    /// `content_length` is `None` for a chunked body.
    fn encode_head(&mut self, content_length: Option<usize>) -> BytesMut {
        if content_length.is_some_and(|len| len > 0) && !self.headers.contains("content-type") {
            self.headers.insert("Content-Type", "text/plain; charset=utf-8");
        }
        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        self.headers.set("Connection", connection);

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64);
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        match content_length {
            Some(len) => buf.put(format!("Content-Length: {len}\r\n").as_bytes()),
            None => buf.put(&b"Transfer-Encoding: chunked\r\n"[..]),
        }
        buf.put(&b"\r\n"[..]);
        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

fn encode_chunk(frame: &Bytes) -> BytesMut {
    let mut buf = BytesMut::with_capacity(frame.len() + 12);
    buf.put(format!("{:x}\r\n", frame.len()).as_bytes());
    buf.put(frame.as_ref());
    buf.put(&b"\r\n"[..]);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::stream;

    async fn render(response: Response) -> (String, Result<(), WriteError>) {
        let mut out = Vec::new();
        let result = response.write_to(&mut out).await;
        (String::from_utf8(out).unwrap(), result)
    }

    #[tokio::test]
    async fn full_body_has_content_length() {
        let (s, result) = render(Response::new(StatusCode::Ok).body("Hello")).await;
        result.unwrap();
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[tokio::test]
    async fn empty_body_has_no_content_type() {
        let (s, _) = render(Response::new(StatusCode::NoContent)).await;
        assert!(!s.contains("Content-Type"));
        assert!(s.contains("Content-Length: 0\r\n"));
    }

    #[tokio::test]
    async fn json_body() {
        let response = Response::new(StatusCode::InternalServerError)
            .json(&serde_json::json!({ "error": "boom" }));
        let (s, _) = render(response).await;
        assert!(s.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(s.contains("Content-Type: application/json\r\n"));
        assert!(s.ends_with(r#"{"error":"boom"}"#));
    }

    #[tokio::test]
    async fn connection_close() {
        let (s, _) = render(Response::new(StatusCode::Ok).keep_alive(false)).await;
        assert!(s.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn streamed_body_is_chunked() {
        let frames = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"data: a\n\n")),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"data: bc\n\n")),
        ]);
        let response = Response::new(StatusCode::Ok).body(Body::from_stream(frames));
        let (s, result) = render(response).await;
        result.unwrap();
        assert!(s.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!s.contains("Content-Length"));
        assert!(s.ends_with("\r\n\r\n9\r\ndata: a\n\n\r\na\r\ndata: bc\n\n\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn failed_stream_omits_terminating_chunk() {
        let frames = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("upstream went away")),
        ]);
        let response = Response::new(StatusCode::Ok).body(Body::from_stream(frames));
        let (s, result) = render(response).await;
        assert!(matches!(result, Err(WriteError::Body(_))));
        assert!(s.ends_with("7\r\npartial\r\n"));
        assert!(!s.contains("0\r\n\r\n"));
    }
}
