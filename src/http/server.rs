//! Background HTTP/3 server
//!
//! [`H3Server::start`] takes an already bound socket, wraps it in a QUIC
//! endpoint and spawns the accept loop on the current Tokio runtime. The
//! caller keeps the returned handle and stops the server with
//! [`H3Server::shutdown`], which is bounded by a timeout.
//!
//! Every connection and every request runs in its own task. Handler errors
//! and panics never reach the caller directly; they are recorded in the
//! [`FailureLog`](super::handlers::FailureLog) of the shared context.

use super::handlers::{dispatch, Endpoint, HandlerContext};
use super::tls::Credentials;
use super::{Error, HttpRequest, HttpResponse, Result, Router, Status};
use crate::net::BoundSocket;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::FutureExt;
use h3::error::ErrorLevel;
use h3::server::RequestStream;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle, JoinSet};

type H3Stream = RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>;

/// A running HTTP/3 server
pub struct H3Server {
    endpoint: quinn::Endpoint,
    local_addr: SocketAddr,
    port: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl H3Server {
    /// Start serving `router` on `socket`
    ///
    /// Returns once the accept loop is spawned. Must be called from within a
    /// Tokio runtime.
    pub fn start(
        socket: BoundSocket,
        credentials: &Credentials,
        router: Arc<Router>,
        ctx: HandlerContext,
    ) -> Result<Self> {
        let local_addr = socket.local_addr();
        let port = socket.port().to_string();

        let endpoint = quinn::Endpoint::new(
            quinn::EndpointConfig::default(),
            Some(credentials.server_config()?),
            socket.into_socket(),
            Arc::new(quinn::TokioRuntime),
        )?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(endpoint.clone(), shutdown_rx, router, ctx));

        tracing::info!(%local_addr, "HTTP/3 server listening");

        Ok(H3Server {
            endpoint,
            local_addr,
            port,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Local address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Port as a number
    pub fn port_number(&self) -> u16 {
        self.local_addr.port()
    }

    /// Port as a string usable in URLs
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Stop accepting, close open connections and wait for the serving task
    ///
    /// Fails with [`Error::ShutdownTimeout`] if the task has not finished
    /// within `timeout`; the task is aborted in that case.
    pub async fn shutdown(mut self, timeout: Duration) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.endpoint.close(0u32.into(), b"shutdown");

        let Some(task) = self.task.take() else {
            return Ok(());
        };
        let abort = task.abort_handle();
        let endpoint = self.endpoint.clone();

        let stopped = async move {
            let joined = task.await;
            endpoint.wait_idle().await;
            joined
        };

        match tokio::time::timeout(timeout, stopped).await {
            Ok(Ok(())) => {
                tracing::info!(addr = %self.local_addr, "HTTP/3 server stopped");
                Ok(())
            }
            Ok(Err(e)) if e.is_panic() => Err(Error::ServerPanicked(panic_message(e.into_panic()))),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "server task cancelled");
                Ok(())
            }
            Err(_) => {
                abort.abort();
                tracing::warn!(?timeout, "HTTP/3 server did not stop in time");
                Err(Error::ShutdownTimeout(timeout))
            }
        }
    }
}

impl Drop for H3Server {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            self.endpoint.close(0u32.into(), b"dropped");
        }
    }
}

async fn accept_loop(
    endpoint: quinn::Endpoint,
    mut shutdown_rx: oneshot::Receiver<()>,
    router: Arc<Router>,
    ctx: HandlerContext,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                tracing::debug!("shutdown requested");
                break;
            }
            incoming = endpoint.accept() => {
                let Some(incoming) = incoming else {
                    tracing::debug!("endpoint closed");
                    break;
                };
                let router = router.clone();
                let ctx = ctx.clone();
                connections.spawn(async move {
                    let remote = incoming.remote_address();
                    if let Err(e) = serve_connection(incoming, router, ctx).await {
                        tracing::debug!(%remote, error = %e, "connection ended with error");
                    }
                });
            }
        }

        reap(&mut connections, &ctx, "connection");
    }

    connections.shutdown().await;
}

async fn serve_connection(
    incoming: quinn::Incoming,
    router: Arc<Router>,
    ctx: HandlerContext,
) -> Result<()> {
    let conn = incoming.await?;
    let remote = conn.remote_address();
    tracing::debug!(%remote, "connection established");

    let mut h3_conn: h3::server::Connection<h3_quinn::Connection, Bytes> =
        h3::server::Connection::new(h3_quinn::Connection::new(conn)).await?;
    let mut requests = JoinSet::new();

    loop {
        match h3_conn.accept().await {
            Ok(Some((request, stream))) => {
                requests.spawn(handle_request(request, stream, router.clone(), ctx.clone()));
            }
            Ok(None) => break,
            Err(e) => match e.get_error_level() {
                ErrorLevel::ConnectionError => {
                    tracing::debug!(%remote, error = %e, "connection closed");
                    break;
                }
                ErrorLevel::StreamError => {
                    tracing::warn!(%remote, error = %e, "stream error");
                    continue;
                }
            },
        }

        reap(&mut requests, &ctx, "request");
    }

    while let Some(joined) = requests.join_next().await {
        record_join(joined, &ctx, "request");
    }

    tracing::debug!(%remote, "connection finished");
    Ok(())
}

async fn handle_request(
    request: http::Request<()>,
    mut stream: H3Stream,
    router: Arc<Router>,
    ctx: HandlerContext,
) {
    let (parts, ()) = request.into_parts();
    if let Err(e) = respond(&parts, &mut stream, &router, &ctx).await {
        tracing::warn!(method = %parts.method, uri = %parts.uri, error = %e, "request failed");
    }
}

/// Read the request body and answer it
///
/// Only upload ingestion is bounded by the upload ceiling. An oversized
/// upload is drained, recorded as a failure and answered `413`.
async fn respond(
    parts: &http::request::Parts,
    stream: &mut H3Stream,
    router: &Router,
    ctx: &HandlerContext,
) -> Result<()> {
    let limit = match router.resolve(parts.uri.path()) {
        Some(Endpoint::UploadIngest) => ctx.max_upload_size(),
        _ => u64::MAX,
    };
    let mut body = BytesMut::new();
    let mut received: u64 = 0;

    while let Some(chunk) = stream.recv_data().await? {
        received += chunk.remaining() as u64;
        if received <= limit {
            body.put(chunk);
        }
    }

    let response = if received > limit {
        ctx.failures().record(format!(
            "{} {}: request body of {} bytes exceeds {} bytes",
            parts.method,
            parts.uri.path(),
            received,
            limit
        ));
        HttpResponse::text(
            Status::PAYLOAD_TOO_LARGE,
            format!("request body exceeds {} bytes\n", limit),
        )
    } else {
        match HttpRequest::from_transport(parts, body.freeze()) {
            Ok(request) => dispatch(router, ctx, &request).await,
            Err(e) => HttpResponse::text(Status::METHOD_NOT_ALLOWED, format!("{}\n", e)),
        }
    };

    let status = response.status();
    let (head, body) = response.into_transport()?;
    let len = body.len();

    stream.send_response(head).await?;
    if !body.is_empty() {
        stream.send_data(body).await?;
    }
    stream.finish().await?;

    tracing::debug!(method = %parts.method, uri = %parts.uri, %status, len, "response sent");
    Ok(())
}

/// Collect finished tasks without waiting
fn reap(tasks: &mut JoinSet<()>, ctx: &HandlerContext, what: &str) {
    while let Some(joined) = tasks.join_next().now_or_never().flatten() {
        record_join(joined, ctx, what);
    }
}

fn record_join(joined: std::result::Result<(), JoinError>, ctx: &HandlerContext, what: &str) {
    if let Err(e) = joined {
        if e.is_panic() {
            ctx.failures()
                .record(format!("{} task panicked: {}", what, panic_message(e.into_panic())));
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::bind_ephemeral_udp;

    fn start_local() -> H3Server {
        let socket = bind_ephemeral_udp("127.0.0.1:0".parse().unwrap()).unwrap();
        H3Server::start(
            socket,
            &Credentials::builtin().unwrap(),
            Arc::new(Router::standard().unwrap()),
            HandlerContext::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_reports_bound_port() {
        let server = start_local();

        assert_ne!(server.port_number(), 0);
        assert_eq!(server.port(), server.port_number().to_string());
        assert!(server.local_addr().ip().is_loopback());

        server.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_idle_server_is_prompt() {
        let server = start_local();
        let started = std::time::Instant::now();

        server.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(7u32)), "unknown panic");
    }
}
