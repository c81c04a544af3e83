//! # pastedown
//!
//! Paste ingestion and Markdown conversion for rich-text article editors.
//!
//! ## Why this crate?
//!
//! Authors edit in a rich document but articles are stored as Markdown.
//! Content pasted from word processors arrives as HTML full of producer
//! markup (office-suite namespaces, conditional comments, page-break styles)
//! and often carries screenshots inline as base64 `data:` URIs. Stored
//! naively, that noise and those megabytes of base64 end up in the Markdown.
//! This crate cleans the paste, uploads every embedded image to an ingestion
//! service and points the content at the returned URL, then keeps the
//! document and its Markdown in step.
//!
//! ## Pipeline Overview
//!
//! ```text
//! clipboard payload
//!  │
//!  ├─ 1. Classify  image files > HTML > plain text
//!  ├─ 2. Strip     remove producer noise (comments, style/meta/script, o:/w:/v:)
//!  ├─ 3. Extract   decode data: images, upload them concurrently, rewrite src
//!  ├─ 4. Insert    one atomic insert into the document at the selection
//!  └─ 5. Bridge    document HTML → Markdown on every change
//! ```
//!
//! Stored Markdown flows the other way once per load, seeding an empty
//! document before the first edit.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pastedown::{ClipboardData, EditorSession, HttpUploader, MemoryDocument, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let uploader = HttpUploader::new("http://localhost:4000/api/uploads/images", 30)?;
//!     let config = PipelineConfig::builder()
//!         .uploader(Arc::new(uploader))
//!         .max_retries(2)
//!         .build()?;
//!
//!     let session = EditorSession::new(MemoryDocument::new(), config);
//!     session.set_sink(|markdown: &str| println!("{markdown}"));
//!     session.seed("# Draft");
//!
//!     let outcome = session
//!         .paste(ClipboardData::new().with_html("<p>Hello <b>world</b></p>"))
//!         .await;
//!     for warning in &outcome.warnings {
//!         eprintln!("image skipped: {warning}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pastedown` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! pastedown = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod bridge;
pub mod config;
pub mod direct;
pub mod document;
pub mod error;
pub mod fragment;
pub mod paste;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod uploader;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use bridge::{html_to_markdown, markdown_to_html, MarkdownBridge, SeedState};
pub use config::{
    BulletMarker, EmphasisStyle, FenceStyle, MarkdownStyle, NoiseRules, PipelineConfig,
    PipelineConfigBuilder,
};
pub use direct::{read_image_file, upload_image};
pub use document::{MemoryDocument, RichDocument};
pub use error::{ImageError, ParseError, PasteError, UploadError};
pub use fragment::{Element, Fragment, Node};
pub use paste::{prepare_paste, ClipboardData, PasteOutcome, PastePayload, PasteState, PreparedPaste};
pub use pipeline::strip::strip_noise;
pub use progress::{NoopProgressCallback, ProgressCallback, UploadProgressCallback};
pub use session::{EditorSession, MarkdownSink};
pub use uploader::{HttpUploader, ImageFile, ImageUploader};
