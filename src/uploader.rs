//! The image ingestion seam: bytes in, durable URL out.
//!
//! Every path that brings an image into the document (inline `data:` images
//! in pasted HTML, image files on the clipboard, toolbar and drag/drop
//! inserts) goes through one [`ImageUploader`]. The pipeline never stores
//! image bytes itself; it only needs the URL the service hands back.
//!
//! [`HttpUploader`] talks to the content backend's upload route: a
//! multipart `POST` carrying the file under the `images` field, answered by
//! `{"urls": ["https://host/uploads/images/…"]}`.

use crate::error::{PasteError, UploadError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Binary image data waiting to be uploaded.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFile {
    /// Filename presented to the ingestion service.
    pub name: String,
    /// MIME type, e.g. `image/png`.
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Whether the declared MIME type is an image type.
    pub fn is_image(&self) -> bool {
        self.mime.to_ascii_lowercase().starts_with("image/")
    }
}

impl std::fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// Accepts binary image data and returns a durable, fetchable URL.
///
/// Implementations must be `Send + Sync`: one paste uploads all of its
/// images concurrently through a shared `Arc<dyn ImageUploader>`.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, image: &ImageFile) -> Result<String, UploadError>;
}

/// Uploads images to an HTTP endpoint as `multipart/form-data`.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    field_name: String,
}

impl HttpUploader {
    /// Form field the content backend reads files from.
    pub const DEFAULT_FIELD: &'static str = "images";

    /// Create an uploader for `endpoint` with a per-request timeout.
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self, PasteError> {
        let endpoint = reqwest::Url::parse(endpoint).map_err(|e| {
            PasteError::InvalidConfig(format!("Invalid upload endpoint '{endpoint}': {e}"))
        })?;
        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(PasteError::InvalidConfig(format!(
                "Upload endpoint must be http or https, got '{}'",
                endpoint.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PasteError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            field_name: Self::DEFAULT_FIELD.to_string(),
        })
    }

    /// Use a different multipart field name.
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

#[async_trait]
impl ImageUploader for HttpUploader {
    async fn upload(&self, image: &ImageFile) -> Result<String, UploadError> {
        let form = Form::new().part(self.field_name.clone(), image_part(image)?);

        debug!(
            "POST {} ({}, {} bytes)",
            self.endpoint,
            image.name,
            image.bytes.len()
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }

        parse_upload_response(&body)
    }
}

fn image_part(image: &ImageFile) -> Result<Part, UploadError> {
    Part::bytes(image.bytes.clone())
        .file_name(image.name.clone())
        .mime_str(&image.mime)
        .map_err(|e| UploadError::InvalidRequest(format!("invalid MIME '{}': {e}", image.mime)))
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Extract the first URL from an upload response body.
///
/// Accepts `{"urls": [...]}` (the backend's batch form) and `{"url": "..."}`.
pub(crate) fn parse_upload_response(body: &[u8]) -> Result<String, UploadError> {
    let parsed: UploadResponse = serde_json::from_slice(body)
        .map_err(|e| UploadError::InvalidResponse(format!("not JSON: {e}")))?;

    parsed
        .urls
        .into_iter()
        .chain(parsed.url)
        .map(|u| u.trim().to_string())
        .find(|u| !u.is_empty())
        .ok_or_else(|| UploadError::InvalidResponse("response carried no URL".into()))
}
