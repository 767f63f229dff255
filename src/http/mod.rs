//! HTTP/3 layer of the harness
//!
//! The transport itself (QUIC via `quinn`, HTTP/3 framing via `h3`) is an
//! opaque collaborator. This module owns what sits on either side of it:
//!
//! - `message` / `headers`: request and response types the handlers see
//! - `router` / `handlers` / `multipart`: the fixed endpoint set under test
//! - `server`: binds the endpoint and serves requests in the background
//! - `client`: an in-process HTTP/3 client for driving the server
//! - `tls`: the credentials both sides use
//!
//! # Examples
//!
//! ```
//! use h3harness::http::{HttpRequest, Method, Router};
//!
//! let router = Router::standard().unwrap();
//! let request = HttpRequest::builder()
//!     .method(Method::Get)
//!     .uri("/hello")
//!     .build();
//!
//! assert!(router.resolve(request.path()).is_some());
//! ```

pub mod client;
pub mod handlers;
pub mod headers;
pub mod message;
pub mod multipart;
pub mod router;
pub mod server;
pub mod tls;

pub use client::H3Client;
pub use handlers::{Endpoint, HandlerContext};
pub use headers::Headers;
pub use message::{HttpRequest, HttpResponse, Method, Status};
pub use router::Router;
pub use server::H3Server;

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] crate::net::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] tls::TlsError),

    #[error("Connect error: {0}")]
    Connect(#[from] quinn::ConnectError),

    #[error("Connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("HTTP/3 error: {0}")]
    H3(#[from] h3::Error),

    #[error("Invalid query parameter: {0}")]
    InvalidQuery(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("Payload from data manager is empty")]
    EmptyPayload,

    #[error("No files found in upload")]
    NoFilesUploaded,

    #[error("No scratch area is active")]
    NoScratchArea,

    #[error("Invalid upload filename: {0:?}")]
    InvalidFilename(String),

    #[error("Multipart error: {0}")]
    Multipart(#[from] multer::Error),

    #[error("Route already registered: {0}")]
    DuplicateRoute(String),

    #[error("Server did not shut down within {0:?}")]
    ShutdownTimeout(std::time::Duration),

    #[error("Server task panicked: {0}")]
    ServerPanicked(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Fixed body of the greeting endpoint
pub const GREETING: &str = "Hello, World!\n";

/// ALPN identifier for HTTP/3
pub const ALPN_H3: &[u8] = b"h3";
