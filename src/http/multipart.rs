//! Multipart form decoding for uploads
//!
//! Bodies arrive fully collected, so the whole form is decoded up front and
//! fields are looked up by name afterwards.

use super::Result;
use bytes::Bytes;
use multer::{Constraints, Multipart, SizeLimit};
use std::convert::Infallible;

/// A file part of a multipart form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Filename as declared by the client
    pub filename: String,
    /// File content
    pub data: Bytes,
}

/// Decoded multipart form
#[derive(Debug, Default)]
pub struct MultipartForm {
    files: Vec<(String, UploadedFile)>,
}

impl MultipartForm {
    /// First file submitted under a field name
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, file)| file)
    }

}

/// Decode a `multipart/form-data` body
///
/// `content_type` is the request's Content-Type header, which carries the
/// boundary. The whole body may not exceed `limit` bytes. Parts with a
/// non-empty filename are files; all other parts are skipped.
pub async fn parse_form(content_type: &str, body: Bytes, limit: u64) -> Result<MultipartForm> {
    let boundary = multer::parse_boundary(content_type)?;
    let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(limit));
    let stream = futures_util::stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = Multipart::with_constraints(stream, boundary, constraints);

    let mut form = MultipartForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field
            .file_name()
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        let data = field.bytes().await?;

        if let Some(filename) = filename {
            form.files.push((name, UploadedFile { filename, data }));
        }
    }

    Ok(form)
}

/// Encode files as a `multipart/form-data` body
///
/// Returns the Content-Type header value and the body. Used by clients that
/// drive the upload endpoint.
pub fn encode_form<'a, I>(files: I) -> (String, Bytes)
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a [u8])>,
{
    let boundary = format!("h3harness-{:016x}", rand::random::<u64>());
    let mut body = Vec::new();

    for (field, filename, data) in files {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    (
        format!("multipart/form-data; boundary={}", boundary),
        Bytes::from(body),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Error;

    const LIMIT: u64 = 1 << 20;

    #[tokio::test]
    async fn test_parse_single_file() {
        let (content_type, body) = encode_form([("uploadfile_0", "a.txt", &b"hello"[..])]);
        let form = parse_form(&content_type, body, LIMIT).await.unwrap();

        let file = form.file("uploadfile_0").unwrap();
        assert_eq!(file.filename, "a.txt");
        assert_eq!(file.data.as_ref(), b"hello");
        assert!(form.file("uploadfile_1").is_none());
    }

    #[tokio::test]
    async fn test_binary_content_preserved() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let (content_type, body) = encode_form([("uploadfile_0", "bin.dat", &data[..])]);
        let form = parse_form(&content_type, body, LIMIT).await.unwrap();

        assert_eq!(form.file("uploadfile_0").unwrap().data.as_ref(), &data[..]);
    }

    #[tokio::test]
    async fn test_value_fields_are_not_files() {
        let boundary = "XyZ";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"uploadfile_0\"\r\n\r\nplain\r\n--{b}--\r\n",
            b = boundary
        );
        let form = parse_form(
            "multipart/form-data; boundary=XyZ",
            Bytes::from(body),
            LIMIT,
        )
        .await
        .unwrap();

        assert!(form.file("uploadfile_0").is_none());
    }

    #[tokio::test]
    async fn test_first_file_per_name_wins() {
        let (content_type, body) = encode_form([
            ("uploadfile_0", "first.txt", &b"1"[..]),
            ("uploadfile_0", "second.txt", &b"2"[..]),
        ]);
        let form = parse_form(&content_type, body, LIMIT).await.unwrap();

        assert_eq!(form.file("uploadfile_0").unwrap().filename, "first.txt");
    }

    #[tokio::test]
    async fn test_size_limit() {
        let data = vec![7u8; 2048];
        let (content_type, body) = encode_form([("uploadfile_0", "big.bin", &data[..])]);
        let result = parse_form(&content_type, body, 1024).await;

        assert!(matches!(result, Err(Error::Multipart(_))));
    }

    #[tokio::test]
    async fn test_not_multipart() {
        let result = parse_form("text/plain", Bytes::from_static(b"hi"), LIMIT).await;
        assert!(matches!(result, Err(Error::Multipart(_))));
    }
}
