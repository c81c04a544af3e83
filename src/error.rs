//! Error types for the pastedown library.
//!
//! Four error types map onto the four failure classes of the pipeline:
//!
//! * [`PasteError`]: **Fatal** for one operation: the configuration is
//!   invalid, no uploader is configured, or a direct image upload failed.
//!   Returned as `Err(PasteError)` from session entry points.
//!
//! * [`ImageError`]: **Non-fatal**: one embedded or pasted image could not
//!   be decoded or uploaded while every other image went through. Stored in
//!   [`crate::paste::PasteOutcome::warnings`] so the rest of the paste is
//!   still inserted.
//!
//! * [`UploadError`]: what an [`crate::uploader::ImageUploader`] reports for
//!   a single request. The pipeline turns it into an [`ImageError`] (paste)
//!   or a [`PasteError`] (direct upload).
//!
//! * [`ParseError`]: clipboard HTML could not be turned into a fragment.
//!   The paste coordinator recovers from it by falling back to plain text,
//!   so it never reaches the author.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors returned by the pastedown library.
///
/// Per-image failures during a paste use [`ImageError`] and are collected in
/// the paste outcome rather than propagated here.
#[derive(Debug, Error)]
pub enum PasteError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation needed to upload an image but no uploader is configured.
    #[error("No image uploader is configured.\nSet one with PipelineConfig::builder().uploader(..).")]
    UploaderNotConfigured,

    // ── Direct-upload errors ──────────────────────────────────────────────
    /// The selected file could not be read.
    #[error("Failed to read image file '{path}': {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The selected file is not an image.
    #[error("'{name}' is not an image ({detail})")]
    NotAnImage { name: String, detail: String },

    /// The image upload failed after all retries.
    #[error("Upload of '{filename}' failed: {detail}")]
    UploadFailed { filename: String, detail: String },

    // ── Session errors ────────────────────────────────────────────────────
    /// The editor session ended before the operation could insert its result.
    #[error("Editor session is closed")]
    SessionClosed,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image inside one paste.
///
/// The image's element is removed from the cleaned fragment; every other
/// image and all surrounding content are still inserted.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// The `data:` URI was malformed or its payload was not valid base64.
    #[error("Image {index}: invalid inline data: {detail}")]
    InvalidDataUri { index: usize, detail: String },

    /// The inline data or pasted file is not an image.
    #[error("Image {index}: unsupported media type '{mime}'")]
    UnsupportedMediaType { index: usize, mime: String },

    /// Upload failed after retries.
    #[error("Image {index} ({filename}): upload failed after {retries} retries: {detail}")]
    UploadFailed {
        index: usize,
        filename: String,
        retries: u32,
        detail: String,
    },

    /// Upload did not settle within the configured timeout.
    #[error("Image {index} ({filename}): upload timed out after {secs}s")]
    Timeout {
        index: usize,
        filename: String,
        secs: u64,
    },
}

impl ImageError {
    /// Zero-based position of the image within its paste.
    pub fn index(&self) -> usize {
        match self {
            ImageError::InvalidDataUri { index, .. }
            | ImageError::UnsupportedMediaType { index, .. }
            | ImageError::UploadFailed { index, .. }
            | ImageError::Timeout { index, .. } => *index,
        }
    }
}

/// Failure reported by an [`crate::uploader::ImageUploader`].
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// The request never produced a response (connection, DNS, TLS, body).
    #[error("transport error: {0}")]
    Transport(String),

    /// The ingestion service answered with a non-success status.
    #[error("rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The service answered 2xx but the body did not carry a URL.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The image could not be encoded into a request (e.g. an unparsable
    /// MIME type). Never sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl UploadError {
    /// Whether another attempt could succeed.
    ///
    /// Validation rejections (4xx other than 429) fail the same way every
    /// time, so only transport errors, 429 and 5xx are retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Transport(_) => true,
            UploadError::Rejected { status, .. } => *status == 429 || *status >= 500,
            UploadError::InvalidResponse(_) | UploadError::InvalidRequest(_) => false,
        }
    }
}

/// Clipboard HTML could not be parsed into a fragment.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Reading the markup into the parser failed.
    #[error("failed to read markup: {0}")]
    Io(#[from] std::io::Error),

    /// The markup exceeds the configured size limit.
    #[error("markup is {len} bytes, limit is {max}")]
    TooLarge { len: usize, max: usize },

    /// The parser produced no `<body>` to take the fragment from.
    #[error("parsed markup has no body element")]
    MissingBody,
}
