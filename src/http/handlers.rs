//! Transport-exercise endpoints
//!
//! Each endpoint maps a fully received request to a response. Handlers never
//! touch the transport; they read and write only the shared
//! [`HandlerContext`]: the data manager, the scratch area of the running
//! test, and the failure log.

use super::multipart::{self, UploadedFile};
use super::{Error, HttpRequest, HttpResponse, Result, Router, Status, GREETING};
use crate::config::MAX_UPLOAD_SIZE;
use crate::data::DataManager;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// Field name prefix of uploaded files; the index is appended
pub const UPLOAD_FIELD_PREFIX: &str = "uploadfile_";

/// The fixed set of endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Fixed greeting text
    Greeting,
    /// Current payload of the data manager
    BulkData,
    /// Request body echoed back
    Echo,
    /// HTML form with `num` file inputs
    UploadForm,
    /// Multipart upload persisted into the scratch area
    UploadIngest,
}

impl Endpoint {
    /// Produce the response for a request
    pub async fn handle(&self, ctx: &HandlerContext, request: &HttpRequest) -> Result<HttpResponse> {
        match self {
            Endpoint::Greeting => Ok(greeting()),
            Endpoint::BulkData => bulk_data(ctx),
            Endpoint::Echo => Ok(echo(request)),
            Endpoint::UploadForm => upload_form(request),
            Endpoint::UploadIngest => upload_ingest(ctx, request).await,
        }
    }
}

/// Errors recorded by request handlers
///
/// The server cannot fail a test directly, so it records handler errors here
/// and the running test collects them at teardown.
#[derive(Debug, Clone, Default)]
pub struct FailureLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl FailureLog {
    /// Record a failure
    pub fn record(&self, failure: impl Into<String>) {
        let failure = failure.into();
        tracing::error!(%failure, "handler failure");
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(failure);
    }

    /// Remove and return all recorded failures
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

/// State shared between the server and the test lifecycle
#[derive(Debug, Clone)]
pub struct HandlerContext {
    data: Arc<DataManager>,
    scratch: Arc<RwLock<Option<PathBuf>>>,
    failures: FailureLog,
    max_upload_size: u64,
}

impl Default for HandlerContext {
    fn default() -> Self {
        HandlerContext::new(Arc::new(DataManager::new()), MAX_UPLOAD_SIZE)
    }
}

impl HandlerContext {
    /// Create a context around a data manager
    pub fn new(data: Arc<DataManager>, max_upload_size: u64) -> Self {
        HandlerContext {
            data,
            scratch: Arc::new(RwLock::new(None)),
            failures: FailureLog::default(),
            max_upload_size,
        }
    }

    /// The data manager
    pub fn data(&self) -> &Arc<DataManager> {
        &self.data
    }

    /// The failure log
    pub fn failures(&self) -> &FailureLog {
        &self.failures
    }

    /// Upload ceiling in bytes
    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// Directory uploads are currently written to
    pub fn scratch_dir(&self) -> Option<PathBuf> {
        self.scratch
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Point uploads at a directory, or detach with `None`
    pub fn set_scratch_dir(&self, dir: Option<PathBuf>) {
        *self.scratch.write().unwrap_or_else(|e| e.into_inner()) = dir;
    }
}

/// Route a request and run its endpoint
///
/// Unknown paths get a 404. Handler errors become a 500 carrying the error
/// text and are recorded in the context's failure log.
pub async fn dispatch(router: &Router, ctx: &HandlerContext, request: &HttpRequest) -> HttpResponse {
    let Some(endpoint) = router.resolve(request.path()) else {
        tracing::debug!(path = request.path(), "no route");
        return HttpResponse::text(Status::NOT_FOUND, "404 page not found\n");
    };

    tracing::debug!(method = %request.method(), path = request.path(), ?endpoint, "dispatching");

    match endpoint.handle(ctx, request).await {
        Ok(response) => response,
        Err(e) => {
            ctx.failures()
                .record(format!("{} {}: {}", request.method(), request.path(), e));
            HttpResponse::text(Status::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn greeting() -> HttpResponse {
    HttpResponse::ok("text/plain; charset=utf-8", GREETING)
}

fn bulk_data(ctx: &HandlerContext) -> Result<HttpResponse> {
    let data = ctx.data().get_data();
    if data.is_empty() {
        return Err(Error::EmptyPayload);
    }
    Ok(HttpResponse::ok("application/octet-stream", data))
}

fn echo(request: &HttpRequest) -> HttpResponse {
    HttpResponse::ok("application/octet-stream", request.body().clone())
}

fn upload_form(request: &HttpRequest) -> Result<HttpResponse> {
    let raw = request
        .query_param("num")
        .ok_or_else(|| Error::InvalidQuery("missing num".to_string()))?;
    let num: usize = raw
        .parse()
        .map_err(|_| Error::InvalidQuery(format!("num is not a number: {:?}", raw)))?;
    if num == 0 {
        return Err(Error::InvalidQuery("num must be positive".to_string()));
    }

    let action = match request.authority() {
        Some(authority) => format!("https://{}/uploadhandler", authority),
        None => "/uploadhandler".to_string(),
    };

    Ok(HttpResponse::ok(
        "text/html; charset=utf-8",
        render_upload_form(&action, num),
    ))
}

/// HTML form with `num` file inputs posting to `action`
pub fn render_upload_form(action: &str, num: usize) -> String {
    let mut html = format!(
        "<html><body>\n<form id='form' action='{}' method='post' enctype='multipart/form-data'>",
        action
    );
    for i in 0..num {
        html.push_str(&format!(
            "<input type='file' id='upload_{i}' name='{}{i}' />",
            UPLOAD_FIELD_PREFIX
        ));
    }
    html.push_str("</form></body></html>");
    html
}

async fn upload_ingest(ctx: &HandlerContext, request: &HttpRequest) -> Result<HttpResponse> {
    let content_type = request.headers().get("content-type").unwrap_or_default();
    let form = multipart::parse_form(content_type, request.body().clone(), ctx.max_upload_size()).await?;
    let dir = ctx.scratch_dir().ok_or(Error::NoScratchArea)?;

    // Scanning stops at the first missing index; a gap truncates the upload.
    let mut count = 0;
    while let Some(file) = form.file(&format!("{}{}", UPLOAD_FIELD_PREFIX, count)) {
        persist(&dir, file).await?;
        count += 1;
    }

    if count == 0 {
        return Err(Error::NoFilesUploaded);
    }

    tracing::info!(count, dir = %dir.display(), "stored uploaded files");
    Ok(HttpResponse::ok("text/plain; charset=utf-8", ""))
}

async fn persist(dir: &Path, file: &UploadedFile) -> Result<()> {
    let name = file.filename.as_str();
    let separator = name.chars().any(|c| c == '\0' || std::path::is_separator(c));
    if name.is_empty() || name == "." || name == ".." || separator {
        return Err(Error::InvalidFilename(name.to_string()));
    }

    let path = dir.join(name);
    tokio::fs::write(&path, &file.data).await?;
    tracing::debug!(path = %path.display(), len = file.data.len(), "persisted upload");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PayloadSize;
    use crate::http::multipart::encode_form;
    use crate::http::Method;

    fn get(uri: &str) -> HttpRequest {
        HttpRequest::new(Method::Get, uri)
    }

    #[test]
    fn test_render_upload_form() {
        let html = render_upload_form("/uploadhandler", 2);
        assert!(html.starts_with("<html><body>\n<form id='form' action='/uploadhandler'"));
        assert!(html.contains("<input type='file' id='upload_0' name='uploadfile_0' />"));
        assert!(html.contains("<input type='file' id='upload_1' name='uploadfile_1' />"));
        assert!(!html.contains("uploadfile_2"));
    }

    #[test]
    fn test_upload_form_uses_authority() {
        let resp = upload_form(&get("https://localhost:4433/uploadform?num=1")).unwrap();
        let html = std::str::from_utf8(resp.body()).unwrap();
        assert!(html.contains("action='https://localhost:4433/uploadhandler'"));
    }

    #[test]
    fn test_upload_form_decodes_num() {
        let resp = upload_form(&get("/uploadform?num=%32")).unwrap();
        let html = std::str::from_utf8(resp.body()).unwrap();
        assert_eq!(html.matches("<input type='file'").count(), 2);
    }

    #[test]
    fn test_upload_form_rejects_bad_num() {
        for uri in ["/uploadform", "/uploadform?num=abc", "/uploadform?num=0", "/uploadform?num=-2"] {
            let err = upload_form(&get(uri)).unwrap_err();
            assert!(matches!(err, Error::InvalidQuery(_)), "{}", uri);
        }
    }

    #[test]
    fn test_bulk_data_requires_payload() {
        let ctx = HandlerContext::default();
        assert!(matches!(bulk_data(&ctx), Err(Error::EmptyPayload)));

        ctx.data().generate(PayloadSize::Custom(64));
        let resp = bulk_data(&ctx).unwrap();
        assert_eq!(resp.body().len(), 64);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_path() {
        let router = Router::standard().unwrap();
        let ctx = HandlerContext::default();
        let resp = dispatch(&router, &ctx, &get("/nowhere")).await;

        assert_eq!(resp.status(), Status::NOT_FOUND);
        assert!(ctx.failures().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_records_failure() {
        let router = Router::standard().unwrap();
        let ctx = HandlerContext::default();
        let resp = dispatch(&router, &ctx, &get("/data")).await;

        assert_eq!(resp.status(), Status::INTERNAL_SERVER_ERROR);
        let failures = ctx.failures().take();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("GET /data"));
        assert!(ctx.failures().is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_scratch_area() {
        let ctx = HandlerContext::default();
        let (content_type, body) = encode_form([("uploadfile_0", "a.txt", &b"hello"[..])]);
        let request = HttpRequest::builder()
            .method(Method::Post)
            .uri("/uploadhandler")
            .header("content-type", content_type)
            .body(body)
            .build();

        let err = upload_ingest(&ctx, &request).await.unwrap_err();
        assert!(matches!(err, Error::NoScratchArea));
    }

    #[tokio::test]
    async fn test_persist_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["../escape.txt", "..", "a/b.txt"] {
            let file = UploadedFile {
                filename: name.to_string(),
                data: bytes::Bytes::from_static(b"x"),
            };
            let err = persist(dir.path(), &file).await.unwrap_err();
            assert!(matches!(err, Error::InvalidFilename(_)), "{}", name);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_persist_keeps_backslash_names() {
        let dir = tempfile::tempdir().unwrap();
        let file = UploadedFile {
            filename: "a\\b.txt".to_string(),
            data: bytes::Bytes::from_static(b"x"),
        };
        persist(dir.path(), &file).await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("a\\b.txt")).unwrap(), b"x");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_persist_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a much longer old content").unwrap();

        let file = UploadedFile {
            filename: "a.txt".to_string(),
            data: bytes::Bytes::from_static(b"new"),
        };
        persist(dir.path(), &file).await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"new");
    }
}
