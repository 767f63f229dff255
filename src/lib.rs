//! h3harness - HTTP/3 transport test harness
//!
//! This crate stands up an HTTP/3 server over QUIC for the lifetime of a test
//! suite and provides per-test scratch areas, bulk payloads and download
//! verification so that tests can prove payloads survive transit intact.
//!
//! # Examples
//!
//! ```no_run
//! use h3harness::config::HarnessConfig;
//! use h3harness::session::Suite;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let suite = Suite::setup(HarnessConfig::from_env()).await?;
//!
//! let case = suite.begin_test().await?;
//! let client = case.client().await?;
//! let response = client.get("/hello").await?;
//! assert_eq!(&response.body()[..], b"Hello, World!\n");
//! client.close().await;
//! case.teardown()?;
//!
//! suite.teardown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod http;
pub mod logging;
pub mod net;
pub mod session;
pub mod verify;
