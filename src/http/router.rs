//! Path-based request routing
//!
//! Patterns follow the classic mux rule: a pattern ending in `/` matches the
//! whole subtree below it, any other pattern matches only itself, and the
//! longest matching pattern wins.

use super::handlers::Endpoint;
use super::{Error, Result};

/// Registry of path patterns and the endpoints serving them
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<(String, Endpoint)>,
}

impl Router {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with every transport-exercise endpoint registered
    pub fn standard() -> Result<Self> {
        let mut router = Router::new();
        router.register("/hello", Endpoint::Greeting)?;
        router.register("/data", Endpoint::BulkData)?;
        router.register("/data/", Endpoint::BulkData)?;
        router.register("/echo", Endpoint::Echo)?;
        router.register("/uploadform", Endpoint::UploadForm)?;
        router.register("/uploadhandler", Endpoint::UploadIngest)?;
        Ok(router)
    }

    /// Register an endpoint under a pattern
    ///
    /// Registering the same pattern twice is an error.
    pub fn register(&mut self, pattern: impl Into<String>, endpoint: Endpoint) -> Result<()> {
        let pattern = pattern.into();
        if !pattern.starts_with('/') {
            return Err(Error::Protocol(format!("route must start with '/': {}", pattern)));
        }
        if self.routes.iter().any(|(p, _)| *p == pattern) {
            return Err(Error::DuplicateRoute(pattern));
        }
        tracing::debug!(%pattern, ?endpoint, "registered route");
        self.routes.push((pattern, endpoint));
        Ok(())
    }

    /// Find the endpoint for a request path
    pub fn resolve(&self, path: &str) -> Option<Endpoint> {
        self.routes
            .iter()
            .filter(|(pattern, _)| {
                if pattern.ends_with('/') {
                    path.starts_with(pattern.as_str())
                } else {
                    path == pattern
                }
            })
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, endpoint)| *endpoint)
    }

    /// Number of registered patterns
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if no patterns are registered
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
