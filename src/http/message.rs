//! HTTP message types
//!
//! This module defines the request and response types the handlers operate
//! on. They are decoupled from the transport: the server converts HTTP/3
//! frames into an [`HttpRequest`] with a fully collected body, and converts
//! the returned [`HttpResponse`] back.

use super::{Error, Headers, Result};
use bytes::Bytes;
use url::form_urlencoded;
use std::fmt;

/// HTTP methods the endpoints answer
///
/// Anything else is refused with `405` before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
}

impl Method {
    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = Error;

    fn try_from(method: &http::Method) -> Result<Self> {
        match *method {
            http::Method::GET => Ok(Method::Get),
            http::Method::HEAD => Ok(Method::Head),
            http::Method::POST => Ok(Method::Post),
            http::Method::PUT => Ok(Method::Put),
            http::Method::DELETE => Ok(Method::Delete),
            http::Method::OPTIONS => Ok(Method::Options),
            _ => Err(Error::InvalidMethod(method.to_string())),
        }
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Head => http::Method::HEAD,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Delete => http::Method::DELETE,
            Method::Options => http::Method::OPTIONS,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    /// Get the status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Get the canonical reason phrase for this status code
    pub fn reason_phrase(&self) -> &'static str {
        http::StatusCode::from_u16(self.code)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown")
    }

    /// Check if this is a success status (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub const OK: Status = Status { code: 200 };
    pub const NOT_FOUND: Status = Status { code: 404 };
    pub const METHOD_NOT_ALLOWED: Status = Status { code: 405 };
    pub const PAYLOAD_TOO_LARGE: Status = Status { code: 413 };
    pub const INTERNAL_SERVER_ERROR: Status = Status { code: 500 };
}

impl From<http::StatusCode> for Status {
    fn from(status: http::StatusCode) -> Self {
        Status {
            code: status.as_u16(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason_phrase())
    }
}

/// HTTP request with its complete body
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    uri: String,
    parsed: Option<http::Uri>,
    headers: Headers,
    body: Bytes,
}

impl HttpRequest {
    /// Create a new HTTP request
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        HttpRequest::builder().method(method).uri(uri).build()
    }

    /// Create a builder for constructing requests
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    /// Build a request from transport request parts and a collected body
    pub fn from_transport(parts: &http::request::Parts, body: Bytes) -> Result<Self> {
        Ok(HttpRequest::builder()
            .method(Method::try_from(&parts.method)?)
            .uri(parts.uri.to_string())
            .headers(Headers::from_header_map(&parts.headers))
            .body(body)
            .build())
    }

    /// Get the request method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Get the request URI as received
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Path component of the URI
    pub fn path(&self) -> &str {
        match &self.parsed {
            Some(uri) => uri.path(),
            None => self.uri.split('?').next().unwrap_or("/"),
        }
    }

    /// Query component of the URI, without the `?`
    pub fn query(&self) -> Option<&str> {
        match &self.parsed {
            Some(uri) => uri.query(),
            None => self.uri.split_once('?').map(|(_, q)| q),
        }
    }

    /// Authority (`host:port`) of the URI, if it is absolute
    pub fn authority(&self) -> Option<&str> {
        self.parsed
            .as_ref()
            .and_then(|uri| uri.authority())
            .map(|a| a.as_str())
    }

    /// First value of a query parameter, percent-decoded
    ///
    /// A name without `=` has an empty value.
    pub fn query_param(&self, name: &str) -> Option<String> {
        form_urlencoded::parse(self.query()?.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Get the headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get the body
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Builder for HTTP requests
#[derive(Debug, Default)]
pub struct HttpRequestBuilder {
    method: Option<Method>,
    uri: Option<String>,
    headers: Headers,
    body: Bytes,
}

impl HttpRequestBuilder {
    /// Set the HTTP method
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the URI
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace all headers
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Build the request
    pub fn build(self) -> HttpRequest {
        let uri = self.uri.unwrap_or_else(|| "/".to_string());
        let parsed = uri.parse::<http::Uri>().ok();
        HttpRequest {
            method: self.method.unwrap_or(Method::Get),
            uri,
            parsed,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: Status,
    headers: Headers,
    body: Bytes,
}

impl HttpResponse {
    /// 200 response with a body
    pub fn ok(content_type: &str, body: impl Into<Bytes>) -> Self {
        HttpResponse::with_body(Status::OK, content_type, body.into())
    }

    /// Plain-text response for a non-success status
    pub fn text(status: Status, message: impl Into<String>) -> Self {
        HttpResponse::with_body(status, "text/plain; charset=utf-8", message.into().into())
    }

    fn with_body(status: Status, content_type: &str, body: Bytes) -> Self {
        let mut headers = Headers::new();
        headers.insert("content-type", content_type);
        HttpResponse {
            status,
            headers,
            body,
        }
    }

    /// Get the status code
    pub fn status(&self) -> Status {
        self.status
    }

    /// Get the headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get the body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Split into a transport response head and body
    pub fn into_transport(self) -> Result<(http::Response<()>, Bytes)> {
        let mut head = http::Response::new(());
        *head.status_mut() = http::StatusCode::from_u16(self.status.code())
            .map_err(|_| Error::InvalidStatus(self.status.code().to_string()))?;
        *head.headers_mut() = self.headers.to_header_map()?;
        Ok((head, self.body))
    }

    /// Build a response from a transport response head and collected body
    pub fn from_transport(head: &http::Response<()>, body: Bytes) -> Self {
        HttpResponse {
            status: head.status().into(),
            headers: Headers::from_header_map(head.headers()),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_transport() {
        let method = Method::try_from(&http::Method::DELETE).unwrap();
        assert_eq!(method, Method::Delete);
        assert_eq!(http::Method::from(method), http::Method::DELETE);

        let err = Method::try_from(&http::Method::PATCH).unwrap_err();
        assert!(matches!(err, Error::InvalidMethod(m) if m == "PATCH"));
    }

    #[test]
    fn test_status() {
        assert_eq!(Status::OK.code(), 200);
        assert_eq!(Status::OK.reason_phrase(), "OK");
        assert!(Status::OK.is_success());
        assert!(!Status::PAYLOAD_TOO_LARGE.is_success());
        assert_eq!(Status::NOT_FOUND.to_string(), "404 Not Found");
    }

    #[test]
    fn test_request_path_and_query() {
        let req = HttpRequest::new(Method::Get, "/uploadform?num=3&x=y");
        assert_eq!(req.path(), "/uploadform");
        assert_eq!(req.query(), Some("num=3&x=y"));
        assert_eq!(req.query_param("num").as_deref(), Some("3"));
        assert_eq!(req.query_param("x").as_deref(), Some("y"));
        assert_eq!(req.query_param("missing"), None);
        assert_eq!(req.authority(), None);
    }

    #[test]
    fn test_request_absolute_uri() {
        let req = HttpRequest::new(Method::Get, "https://localhost:4433/data/file.bin");
        assert_eq!(req.path(), "/data/file.bin");
        assert_eq!(req.authority(), Some("localhost:4433"));
        assert_eq!(req.query(), None);
    }

    #[test]
    fn test_query_param_without_value() {
        let req = HttpRequest::new(Method::Get, "/uploadform?num");
        assert_eq!(req.query_param("num").as_deref(), Some(""));
    }

    #[test]
    fn test_query_param_is_percent_decoded() {
        let req = HttpRequest::new(Method::Get, "/uploadform?num=%33&name=a%20b+c&n%75m2=7");
        assert_eq!(req.query_param("num").as_deref(), Some("3"));
        assert_eq!(req.query_param("name").as_deref(), Some("a b c"));
        assert_eq!(req.query_param("num2").as_deref(), Some("7"));
    }

    #[test]
    fn test_request_builder() {
        let req = HttpRequest::builder()
            .method(Method::Post)
            .uri("/echo")
            .header("Content-Type", "text/plain")
            .body(&b"Hello"[..])
            .build();

        assert_eq!(req.method(), Method::Post);
        assert_eq!(req.uri(), "/echo");
        assert_eq!(req.body().as_ref(), b"Hello");
        assert_eq!(req.headers().get("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_response_into_transport() {
        let resp = HttpResponse::ok("text/html", "<p>hi</p>");
        let (head, body) = resp.into_transport().unwrap();

        assert_eq!(head.status(), http::StatusCode::OK);
        assert_eq!(head.headers()["content-type"], "text/html");
        assert_eq!(body.as_ref(), b"<p>hi</p>");
    }

    #[test]
    fn test_response_from_transport() {
        let head = http::Response::builder()
            .status(404)
            .header("content-type", "text/plain")
            .body(())
            .unwrap();
        let resp = HttpResponse::from_transport(&head, Bytes::from_static(b"nope"));

        assert_eq!(resp.status(), Status::NOT_FOUND);
        assert_eq!(resp.headers().get("Content-Type"), Some("text/plain"));
        assert_eq!(resp.body().as_ref(), b"nope");
    }
}
