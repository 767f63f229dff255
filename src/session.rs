//! Suite and test lifecycle
//!
//! A [`Suite`] owns the HTTP/3 server for the whole run. Each test obtains a
//! [`TestCase`] from [`Suite::begin_test`], which holds the suite's test lock,
//! a fresh scratch directory that uploads land in, and the path of the
//! external client binary. [`TestCase::teardown`] undoes all of it and turns
//! any handler failure recorded during the test into an error.
//!
//! Test cases never overlap: the lock is held until the case is torn down or
//! dropped, so a second `begin_test` waits.

use crate::config::HarnessConfig;
use crate::data::DataManager;
use crate::http::tls::{Credentials, TlsError};
use crate::http::{H3Client, H3Server, HandlerContext, Router};
use crate::logging;
use crate::net;
use crate::verify::DownloadVerifier;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Scratch paths shorter than this are never removed
pub const MIN_SCRATCH_PATH_LEN: usize = 20;

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] crate::http::Error),

    #[error("Network error: {0}")]
    Net(#[from] net::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{} handler failure(s): {}", .0.len(), .0.join("; "))]
    HandlerFailures(Vec<String>),
}

/// Suite-wide state: the running server and everything tests share with it
pub struct Suite {
    config: HarnessConfig,
    server: Mutex<Option<H3Server>>,
    local_addr: SocketAddr,
    port: String,
    ctx: HandlerContext,
    verifier: Arc<DownloadVerifier>,
    test_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Suite {
    /// Start the server and prepare shared state
    ///
    /// Must run inside a Tokio runtime, before any test.
    pub async fn setup(config: HarnessConfig) -> Result<Self> {
        logging::init(&config.log_level);

        let router = Arc::new(Router::standard()?);
        let credentials = Credentials::builtin()?;
        let ctx = HandlerContext::new(Arc::new(DataManager::new()), config.max_upload_size);

        let socket = net::bind_ephemeral_udp(config.bind_addr)?;
        let server = H3Server::start(socket, &credentials, router, ctx.clone())?;
        let local_addr = server.local_addr();
        let port = server.port().to_string();

        tracing::info!(%local_addr, "suite ready");

        Ok(Suite {
            verifier: Arc::new(DownloadVerifier::new(config.download_dir.clone())),
            config,
            server: Mutex::new(Some(server)),
            local_addr,
            port,
            ctx,
            test_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Stop the server, bounded by the configured shutdown timeout
    ///
    /// Calling it again after a successful teardown does nothing.
    pub async fn teardown(&self) -> Result<()> {
        let server = self
            .server
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match server {
            Some(server) => {
                server.shutdown(self.config.shutdown_timeout).await?;
                tracing::info!("suite torn down");
            }
            None => tracing::debug!("suite already torn down"),
        }
        Ok(())
    }

    /// Prepare a test case
    ///
    /// Waits for the previous test case to finish, then creates its scratch
    /// area and points uploads at it.
    ///
    /// Failures recorded while no test was running are returned as
    /// [`Error::HandlerFailures`] and cleared, so the next call starts clean.
    pub async fn begin_test(&self) -> Result<TestCase> {
        let guard = self.test_lock.clone().lock_owned().await;

        let stale = self.ctx.failures().take();
        if !stale.is_empty() {
            tracing::error!(count = stale.len(), "failures recorded outside a test");
            return Err(Error::HandlerFailures(stale));
        }

        let scratch = ScratchArea::create(
            self.config.scratch_root.as_deref(),
            &self.config.scratch_prefix,
        )?;
        self.ctx.set_scratch_dir(Some(scratch.path().to_path_buf()));

        let client_binary = client_binary_path(&self.config.client_dir);
        tracing::debug!(scratch = %scratch.path().display(), client = %client_binary.display(), "test started");

        Ok(TestCase {
            _guard: guard,
            scratch: Some(scratch),
            client_binary,
            local_addr: self.local_addr,
            port: self.port.clone(),
            ctx: self.ctx.clone(),
            verifier: self.verifier.clone(),
        })
    }

    /// Server address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Server port as a string usable in URLs
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Shared data manager
    pub fn data(&self) -> &Arc<DataManager> {
        self.ctx.data()
    }

    /// Shared download verifier
    pub fn verifier(&self) -> &Arc<DownloadVerifier> {
        &self.verifier
    }

    /// Context the server's handlers run with
    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    /// Configuration the suite was set up with
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }
}

/// A running test case
pub struct TestCase {
    _guard: OwnedMutexGuard<()>,
    scratch: Option<ScratchArea>,
    client_binary: PathBuf,
    local_addr: SocketAddr,
    port: String,
    ctx: HandlerContext,
    verifier: Arc<DownloadVerifier>,
}

impl TestCase {
    /// Absolute URL of `path` on the server
    pub fn url(&self, path: &str) -> String {
        format!("https://localhost:{}{}", self.port, path)
    }

    /// Server port as a string usable in URLs
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Directory uploads of this test land in
    pub fn scratch_dir(&self) -> &Path {
        self.scratch
            .as_ref()
            .map(|s| s.path())
            .unwrap_or_else(|| Path::new(""))
    }

    /// Path of the external client binary for this platform
    pub fn client_binary_path(&self) -> &Path {
        &self.client_binary
    }

    /// Connect an in-process client to the server
    pub async fn client(&self) -> Result<H3Client> {
        Ok(H3Client::connect(self.local_addr).await?)
    }

    /// Shared data manager
    pub fn data(&self) -> &Arc<DataManager> {
        self.ctx.data()
    }

    /// Shared download verifier
    pub fn verifier(&self) -> &DownloadVerifier {
        &self.verifier
    }

    /// Remove the scratch area and report failures recorded during the test
    ///
    /// Every cleanup step runs even when an earlier one fails. A scratch
    /// removal error is reported alongside handler failures, or as
    /// [`Error::Io`] when there are none.
    ///
    /// # Panics
    ///
    /// If the scratch path is shorter than [`MIN_SCRATCH_PATH_LEN`].
    pub fn teardown(mut self) -> Result<()> {
        self.ctx.set_scratch_dir(None);
        let removed = match self.scratch.take() {
            Some(scratch) => scratch.remove(),
            None => Ok(()),
        };
        self.verifier.clear();

        let mut failures = self.ctx.failures().take();
        match removed {
            Err(e) if failures.is_empty() => return Err(Error::Io(e)),
            Err(e) => failures.push(format!("scratch area removal: {}", e)),
            Ok(()) => {}
        }
        if !failures.is_empty() {
            return Err(Error::HandlerFailures(failures));
        }

        tracing::debug!("test finished");
        Ok(())
    }
}

impl Drop for TestCase {
    fn drop(&mut self) {
        if self.scratch.is_some() {
            self.ctx.set_scratch_dir(None);
        }
    }
}

/// A world-writable per-test directory
#[derive(Debug)]
pub struct ScratchArea {
    path: PathBuf,
    removed: bool,
}

impl ScratchArea {
    /// Create a uniquely named directory under `root` (or the temp dir)
    pub fn create(root: Option<&Path>, prefix: &str) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let path = dir.keep();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o777))?;
        }

        Ok(ScratchArea {
            path,
            removed: false,
        })
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively delete the directory
    ///
    /// # Panics
    ///
    /// If the path is shorter than [`MIN_SCRATCH_PATH_LEN`].
    pub fn remove(mut self) -> io::Result<()> {
        if self.path.as_os_str().len() < MIN_SCRATCH_PATH_LEN {
            panic!("scratch path too short to remove: {:?}", self.path);
        }
        self.removed = true;
        std::fs::remove_dir_all(&self.path)?;
        tracing::debug!(path = %self.path.display(), "scratch area removed");
        Ok(())
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        if self.removed || self.path.as_os_str().len() < MIN_SCRATCH_PATH_LEN {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scratch area");
        }
    }
}

/// Client binary for the current platform inside `client_dir`
pub fn client_binary_path(client_dir: &Path) -> PathBuf {
    client_dir.join(format!("client-{}-debug", std::env::consts::OS))
}
