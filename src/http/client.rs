//! In-process HTTP/3 client
//!
//! Drives a harness server over a real QUIC connection. One client holds one
//! connection; requests may be issued concurrently through shared
//! references since each opens its own stream.

use super::handlers::UPLOAD_FIELD_PREFIX;
use super::multipart::encode_form;
use super::tls::{self, CertInfo};
use super::{Error, HttpRequest, HttpResponse, Method, Result};
use bytes::{BufMut, Bytes, BytesMut};
use rustls::pki_types::CertificateDer;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Bound on the QUIC handshake
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Server name presented during the handshake
const SERVER_NAME: &str = "localhost";

/// Application close code for a graceful HTTP/3 shutdown
const H3_NO_ERROR: quinn::VarInt = quinn::VarInt::from_u32(0x100);

/// HTTP/3 client bound to one server
pub struct H3Client {
    endpoint: quinn::Endpoint,
    connection: quinn::Connection,
    sender: h3::client::SendRequest<h3_quinn::OpenStreams, Bytes>,
    driver: JoinHandle<()>,
    authority: String,
}

impl H3Client {
    /// Connect to a server
    ///
    /// An unspecified server address (`0.0.0.0`, `::`) is dialed on loopback.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let addr = if addr.ip().is_unspecified() {
            let loopback = match addr {
                SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            };
            SocketAddr::new(loopback, addr.port())
        } else {
            addr
        };

        let bind_addr = match addr {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let mut endpoint = quinn::Endpoint::client(bind_addr)?;
        endpoint.set_default_client_config(tls::client_config()?);

        let connecting = endpoint.connect(addr, SERVER_NAME)?;
        let connection = tokio::time::timeout(CONNECT_TIMEOUT, connecting)
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("QUIC handshake with {} timed out", addr),
                )
            })??;

        let (mut conn_driver, sender) =
            h3::client::new(h3_quinn::Connection::new(connection.clone())).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = futures_util::future::poll_fn(|cx| conn_driver.poll_close(cx)).await {
                tracing::debug!(error = %e, "client connection closed");
            }
        });

        tracing::debug!(%addr, "client connected");

        Ok(H3Client {
            endpoint,
            connection,
            sender,
            driver,
            authority: format!("{}:{}", SERVER_NAME, addr.port()),
        })
    }

    /// Authority (`host:port`) requests are addressed to
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Absolute URL of `path` on the server
    pub fn url(&self, path: &str) -> String {
        format!("https://{}{}", self.authority, path)
    }

    /// Send a request and collect the complete response
    ///
    /// A relative request URI is resolved against the server.
    pub async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let uri = if request.uri().starts_with('/') {
            self.url(request.uri())
        } else {
            request.uri().to_string()
        };

        let mut head = http::Request::new(());
        *head.method_mut() = request.method().into();
        *head.uri_mut() = uri
            .parse()
            .map_err(|_| Error::Protocol(format!("invalid request URI: {}", uri)))?;
        *head.headers_mut() = request.headers().to_header_map()?;

        let mut sender = self.sender.clone();
        let mut stream = sender.send_request(head).await?;
        if !request.body().is_empty() {
            stream.send_data(request.body().clone()).await?;
        }
        stream.finish().await?;

        let response = stream.recv_response().await?;
        let mut body = BytesMut::new();
        while let Some(chunk) = stream.recv_data().await? {
            body.put(chunk);
        }

        tracing::debug!(method = %request.method(), %uri, status = %response.status(), len = body.len(), "response received");
        Ok(HttpResponse::from_transport(&response, body.freeze()))
    }

    /// GET `path`
    pub async fn get(&self, path: &str) -> Result<HttpResponse> {
        self.send(&HttpRequest::new(Method::Get, path)).await
    }

    /// POST `body` to `path`
    pub async fn post(
        &self,
        path: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<HttpResponse> {
        let request = HttpRequest::builder()
            .method(Method::Post)
            .uri(path)
            .header("content-type", content_type)
            .body(body)
            .build();
        self.send(&request).await
    }

    /// Upload files to the upload endpoint
    ///
    /// Each `(filename, content)` pair is sent under the next
    /// `uploadfile_<i>` field, starting at 0.
    pub async fn upload(&self, files: &[(&str, &[u8])]) -> Result<HttpResponse> {
        let fields: Vec<String> = (0..files.len())
            .map(|i| format!("{}{}", UPLOAD_FIELD_PREFIX, i))
            .collect();
        let (content_type, body) = encode_form(
            fields
                .iter()
                .zip(files)
                .map(|(field, (filename, data))| (field.as_str(), *filename, *data)),
        );
        self.post("/uploadhandler", &content_type, body).await
    }

    /// GET `path` and store the body as `dir/filename`
    ///
    /// `dir` is created if missing. Fails unless the server answers 2xx.
    pub async fn download_to(&self, path: &str, dir: &Path, filename: &str) -> Result<PathBuf> {
        let response = self.get(path).await?;
        if !response.status().is_success() {
            return Err(Error::Protocol(format!(
                "download of {} failed: {}",
                path,
                response.status()
            )));
        }

        tokio::fs::create_dir_all(dir).await?;
        let target = dir.join(filename);
        tokio::fs::write(&target, response.body()).await?;

        tracing::debug!(path, target = %target.display(), len = response.body().len(), "downloaded");
        Ok(target)
    }

    /// Certificate the server presented during the handshake
    pub fn peer_certificate(&self) -> Option<CertInfo> {
        let identity = self.connection.peer_identity()?;
        let chain = identity.downcast::<Vec<CertificateDer<'static>>>().ok()?;
        chain.first().and_then(|der| CertInfo::from_der(der).ok())
    }

    /// Close the connection and wait for the endpoint to go idle
    pub async fn close(self) {
        self.connection.close(H3_NO_ERROR, b"");
        self.endpoint.wait_idle().await;
        self.driver.abort();
        tracing::debug!(authority = %self.authority, "client closed");
    }
}
