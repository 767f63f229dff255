//! TLS credentials for the QUIC transport
//!
//! QUIC carries its own TLS 1.3 handshake, so this module only provides
//! configuration: the server's certificate and key, and a client
//! configuration able to reach a harness server.
//!
//! # Examples
//!
//! ```
//! use h3harness::http::tls::Credentials;
//!
//! let creds = Credentials::builtin().unwrap();
//! assert_eq!(creds.info().subject, "example.com");
//!
//! let server_config = creds.server_config().unwrap();
//! # drop(server_config);
//! ```

pub mod builtin_cert;
pub mod cert;
pub mod config;

pub use cert::CertInfo;
pub use config::{client_config, Credentials, TlsError};

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
