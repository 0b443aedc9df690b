//! Outbound HTTP response builder.
//!
//! Handlers never build wire bytes; a [`Response`] is the rendering-ready value
//! the host server serializes however its transport requires.

use serde::Serialize;

use super::{Headers, StatusCode};

/// An HTTP response: status, headers and body.
///
/// # Examples
///
/// ```
/// use weft::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "text/plain")
///     .body("ok");
///
/// assert_eq!(response.status(), StatusCode::Ok);
/// assert_eq!(response.text(), "ok");
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Creates a `200 OK` response whose body is `value` encoded as JSON.
    ///
    /// Falls back to a `500` when the value cannot be encoded (for example a map
    /// with non-string keys).
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(StatusCode::Ok)
                .header("Content-Type", "application/json; charset=utf-8")
                .body_bytes(body),
            Err(e) => Self::new(StatusCode::InternalServerError).body(e.to_string()),
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw body.
    pub fn content(&self) -> &[u8] {
        &self.body
    }

    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_sets_content_type() {
        let r = Response::json(&json!({"ok": true}));
        assert_eq!(r.status(), StatusCode::Ok);
        assert_eq!(
            r.headers().get("content-type"),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(r.text(), r#"{"ok":true}"#);
    }

    #[test]
    fn headers_accumulate() {
        let r = Response::new(StatusCode::Found)
            .header("Location", "/signin")
            .header("Set-Cookie", "a=1");
        assert_eq!(r.headers().len(), 2);
        assert_eq!(r.headers().get("location"), Some("/signin"));
        assert!(r.content().is_empty());
    }
}
