//! Harness configuration
//!
//! Every tunable of the harness lives in [`HarnessConfig`]. Defaults suit a
//! local `cargo test` run; each field can be overridden from the environment
//! through [`HarnessConfig::from_env`].

use crate::logging;
use std::env;
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Address the server socket binds to: all interfaces, kernel-assigned port.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:0";

/// Name prefix of per-test scratch directories.
pub const SCRATCH_PREFIX: &str = "quic-upload-dest";

/// Upper bound on a multipart upload body (100 MB).
pub const MAX_UPLOAD_SIZE: u64 = 100 * (1 << 20);

/// Bound on suite teardown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Local address for the server's datagram socket.
    pub bind_addr: SocketAddr,
    /// Directory scratch areas are created in. `None` means the system temp dir.
    pub scratch_root: Option<PathBuf>,
    /// Name prefix for scratch directories.
    pub scratch_prefix: String,
    /// Directory where the external client deposits downloaded artifacts.
    pub download_dir: PathBuf,
    /// Directory holding the per-OS client binaries.
    pub client_dir: PathBuf,
    /// Bound on server shutdown during suite teardown.
    pub shutdown_timeout: Duration,
    /// Size ceiling for multipart uploads.
    pub max_upload_size: u64,
    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            scratch_root: None,
            scratch_prefix: SCRATCH_PREFIX.to_string(),
            download_dir: env::temp_dir().join("h3harness-downloads"),
            client_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../quic-clients"),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_upload_size: MAX_UPLOAD_SIZE,
            log_level: "info".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Build a configuration from defaults overridden by `H3HARNESS_*` variables
    ///
    /// Recognized variables: `H3HARNESS_BIND_ADDR`, `H3HARNESS_SCRATCH_ROOT`,
    /// `H3HARNESS_DOWNLOAD_DIR`, `H3HARNESS_CLIENT_DIR`,
    /// `H3HARNESS_SHUTDOWN_TIMEOUT_SECS`, `H3HARNESS_LOG`. Logging is
    /// initialized from `H3HARNESS_LOG` first, so values that fail to parse
    /// are ignored with a visible warning.
    pub fn from_env() -> Self {
        HarnessConfig::from_lookup(|key| env::var_os(key))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let mut config = HarnessConfig::default();

        if let Some(level) = lookup("H3HARNESS_LOG") {
            config.log_level = level.to_string_lossy().into_owned();
        }
        logging::init(&config.log_level);

        if let Some(addr) = lookup("H3HARNESS_BIND_ADDR") {
            let addr = addr.to_string_lossy();
            match addr.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(_) => tracing::warn!(%addr, "ignoring unparsable H3HARNESS_BIND_ADDR"),
            }
        }
        if let Some(dir) = lookup("H3HARNESS_SCRATCH_ROOT") {
            config.scratch_root = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("H3HARNESS_DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("H3HARNESS_CLIENT_DIR") {
            config.client_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("H3HARNESS_SHUTDOWN_TIMEOUT_SECS") {
            let secs = secs.to_string_lossy();
            match secs.parse() {
                Ok(secs) => config.shutdown_timeout = Duration::from_secs(secs),
                Err(_) => tracing::warn!(%secs, "ignoring unparsable H3HARNESS_SHUTDOWN_TIMEOUT_SECS"),
            }
        }

        config
    }

    /// Set the bind address
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the scratch root directory
    pub fn scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(dir.into());
        self
    }

    /// Set the download directory inspected by the verifier
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Set the client binary directory
    pub fn client_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.client_dir = dir.into();
        self
    }

    /// Set the shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the upload size ceiling
    pub fn max_upload_size(mut self, limit: u64) -> Self {
        self.max_upload_size = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(config.scratch_prefix, "quic-upload-dest");
        assert_eq!(config.max_upload_size, 104_857_600);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert!(config.scratch_root.is_none());
    }

    #[test]
    fn test_builder_setters() {
        let config = HarnessConfig::default()
            .scratch_root("/var/tmp")
            .download_dir("/srv/downloads")
            .shutdown_timeout(Duration::from_secs(3))
            .max_upload_size(1024);

        assert_eq!(config.scratch_root, Some(PathBuf::from("/var/tmp")));
        assert_eq!(config.download_dir, PathBuf::from("/srv/downloads"));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(config.max_upload_size, 1024);
    }

    fn lookup_in(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<OsString> {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| OsString::from(v))
        }
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = HarnessConfig::from_lookup(lookup_in(&[
            ("H3HARNESS_BIND_ADDR", "127.0.0.1:0"),
            ("H3HARNESS_SCRATCH_ROOT", "/var/tmp/h3"),
            ("H3HARNESS_SHUTDOWN_TIMEOUT_SECS", "3"),
            ("H3HARNESS_LOG", "debug"),
        ]));

        assert_eq!(config.bind_addr, "127.0.0.1:0".parse().unwrap());
        assert_eq!(config.scratch_root, Some(PathBuf::from("/var/tmp/h3")));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_from_lookup_keeps_defaults_for_bad_values() {
        let config = HarnessConfig::from_lookup(lookup_in(&[
            ("H3HARNESS_BIND_ADDR", "not-an-address"),
            ("H3HARNESS_SHUTDOWN_TIMEOUT_SECS", "soon"),
        ]));

        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
        assert_eq!(config.log_level, "info");
    }
}
