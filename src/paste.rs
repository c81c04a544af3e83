//! The paste coordinator: classify one clipboard payload, route it through
//! the matching path, and hand the result to the document.
//!
//! ## Why prepare, then apply?
//!
//! Uploads are the only slow part of a paste. [`prepare_paste`] does all of
//! the asynchronous work without touching the document and returns a
//! [`PreparedPaste`] holding a fully built insertion. [`PreparedPaste::apply`]
//! then mutates the document in one synchronous call. The document therefore
//! never sees a partially uploaded paste, and the caller decides whether the
//! document is still alive at the moment of insertion (see
//! [`crate::session::EditorSession`]).
//!
//! ## State machine
//!
//! ```text
//! Received ─┬─▶ UploadingFiles ─────────────────────────────▶ Inserted
//!           ├─▶ Stripping ─▶ ExtractingImages ─▶ Inserting ─▶ Inserted
//!           ├─▶ (plain text) ───────────────────────────────▶ Inserted
//!           └─▶ Ignored
//! any non-terminal state ─▶ Discarded   (the session ended first)
//! ```

use crate::config::PipelineConfig;
use crate::direct::image_node;
use crate::document::RichDocument;
use crate::error::ImageError;
use crate::fragment::{Fragment, Node};
use crate::pipeline::decode::resolve_format;
use crate::pipeline::extract::extract_images;
use crate::pipeline::strip::strip_noise;
use crate::pipeline::upload::upload_batch;
use crate::uploader::ImageFile;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// The representations a clipboard event carries. Any subset may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardData {
    pub text: Option<String>,
    pub html: Option<String>,
    pub files: Vec<ImageFile>,
}

impl ClipboardData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn with_file(mut self, file: ImageFile) -> Self {
        self.files.push(file);
        self
    }

    /// Pick the ingestion path.
    ///
    /// Image files win over HTML, HTML wins over plain text. Files that are
    /// not images are ignored; a file whose bytes sniff as an image gets the
    /// sniffed MIME type. Empty representations count as absent.
    pub fn classify(self) -> PastePayload {
        let images: Vec<ImageFile> = self
            .files
            .into_iter()
            .filter_map(|mut file| {
                if file.is_image() {
                    return Some(file);
                }
                match resolve_format(&file.mime, &file.bytes) {
                    Some((mime, _)) => {
                        file.mime = mime;
                        Some(file)
                    }
                    None => {
                        debug!("Ignoring non-image clipboard file {}", file.name);
                        None
                    }
                }
            })
            .collect();
        if !images.is_empty() {
            return PastePayload::Files(images);
        }

        let text = self.text.filter(|t| !t.is_empty());
        match self.html.filter(|h| !h.trim().is_empty()) {
            Some(html) => PastePayload::Html { html, text },
            None => match text {
                Some(text) => PastePayload::Text(text),
                None => PastePayload::Empty,
            },
        }
    }
}

/// A classified clipboard payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PastePayload {
    /// One or more image files, uploaded and inserted as image nodes.
    Files(Vec<ImageFile>),
    /// Markup, with the plain-text alternative kept for the parse fallback.
    Html { html: String, text: Option<String> },
    /// Plain text only; the document applies its default handling.
    Text(String),
    /// Nothing usable.
    Empty,
}

/// Where one paste stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PasteState {
    Received,
    UploadingFiles,
    Stripping,
    ExtractingImages,
    Inserting,
    Inserted,
    /// The payload held nothing to insert.
    Ignored,
    /// The editor session ended before the paste could be inserted.
    Discarded,
}

impl PasteState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PasteState::Inserted | PasteState::Ignored | PasteState::Discarded
        )
    }
}

/// What one paste did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasteOutcome {
    /// Final state.
    pub state: PasteState,
    /// Every state the paste went through, in order, ending with `state`.
    pub trace: Vec<PasteState>,
    /// Whether the host's default paste action must be suppressed. True for
    /// the file and HTML paths, false for plain text and empty payloads.
    pub default_prevented: bool,
    /// Images now referencing an uploaded URL.
    pub images_uploaded: usize,
    /// Per-image failures. The paste went through without these images.
    pub warnings: Vec<ImageError>,
    /// Top-level nodes handed to the document; zero for plain text.
    pub nodes_inserted: usize,
    /// Wall-clock time spent preparing the paste.
    pub duration_ms: u64,
}

impl PasteOutcome {
    fn new() -> Self {
        Self {
            state: PasteState::Received,
            trace: vec![PasteState::Received],
            default_prevented: false,
            images_uploaded: 0,
            warnings: Vec::new(),
            nodes_inserted: 0,
            duration_ms: 0,
        }
    }

    fn advance(&mut self, next: PasteState) {
        debug!("Paste state {:?} → {:?}", self.state, next);
        self.state = next;
        self.trace.push(next);
    }
}

/// What a prepared paste will put into the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    /// Image nodes from uploaded clipboard files.
    Nodes(Vec<Node>),
    /// A cleaned fragment with every image pointing at an uploaded URL.
    Fragment(Fragment),
    /// Plain text for the document's default handling.
    Text(String),
    Nothing,
}

/// A paste whose asynchronous work has settled, ready to insert.
#[derive(Debug, Clone)]
#[must_use = "a prepared paste does nothing until applied or discarded"]
pub struct PreparedPaste {
    pub insertion: Insertion,
    outcome: PasteOutcome,
}

impl PreparedPaste {
    /// The outcome so far; its state is the last non-terminal one unless the
    /// paste was ignored.
    pub fn outcome(&self) -> &PasteOutcome {
        &self.outcome
    }

    /// Insert into `document` in one step.
    pub fn apply<D: RichDocument + ?Sized>(self, document: &mut D) -> PasteOutcome {
        let mut outcome = self.outcome;
        if outcome.state.is_terminal() {
            return outcome;
        }
        match self.insertion {
            Insertion::Nodes(nodes) => {
                outcome.nodes_inserted = nodes.len();
                for node in nodes {
                    document.insert_node(node);
                }
            }
            Insertion::Fragment(fragment) => {
                outcome.nodes_inserted = fragment.children.len();
                document.insert_fragment(fragment);
            }
            Insertion::Text(text) => document.insert_text(&text),
            Insertion::Nothing => {}
        }
        outcome.advance(PasteState::Inserted);
        info!(
            "Paste inserted: {} node(s), {} image(s), {} warning(s)",
            outcome.nodes_inserted,
            outcome.images_uploaded,
            outcome.warnings.len()
        );
        outcome
    }

    /// Drop the insertion because its document is gone.
    pub fn discard(self) -> PasteOutcome {
        let mut outcome = self.outcome;
        if !outcome.state.is_terminal() {
            debug!("Paste discarded: editor session closed");
            outcome.advance(PasteState::Discarded);
        }
        outcome
    }
}

/// Run every asynchronous step of one paste.
///
/// Never fails: parse failures fall back to plain text and image failures
/// become warnings in the outcome.
pub async fn prepare_paste(data: ClipboardData, config: &PipelineConfig) -> PreparedPaste {
    let start = Instant::now();
    let mut outcome = PasteOutcome::new();

    let insertion = match data.classify() {
        PastePayload::Files(files) => {
            outcome.default_prevented = true;
            outcome.advance(PasteState::UploadingFiles);
            upload_files(files, config, &mut outcome).await
        }
        PastePayload::Html { html, text } => match Fragment::parse_with_limit(&html, config.max_html_bytes) {
            Ok(mut fragment) => {
                outcome.default_prevented = true;
                outcome.advance(PasteState::Stripping);
                let stats = strip_noise(&mut fragment, &config.noise);
                debug!("Stripped {:?}", stats);

                outcome.advance(PasteState::ExtractingImages);
                let report = extract_images(&mut fragment, config).await;
                outcome.images_uploaded = report.uploaded;
                outcome.warnings = report.warnings;

                outcome.advance(PasteState::Inserting);
                Insertion::Fragment(fragment)
            }
            Err(e) => {
                warn!("Pasted HTML could not be parsed ({}); pasting as text", e);
                Insertion::Text(text.unwrap_or(html))
            }
        },
        PastePayload::Text(text) => Insertion::Text(text),
        PastePayload::Empty => {
            outcome.advance(PasteState::Ignored);
            Insertion::Nothing
        }
    };

    outcome.duration_ms = start.elapsed().as_millis() as u64;
    PreparedPaste { insertion, outcome }
}

/// Upload clipboard image files; one image node per success.
async fn upload_files(
    files: Vec<ImageFile>,
    config: &PipelineConfig,
    outcome: &mut PasteOutcome,
) -> Insertion {
    info!("Uploading {} pasted image file(s)", files.len());
    let jobs = files.into_iter().enumerate().collect();
    let mut nodes = Vec::new();
    for (index, result) in upload_batch(jobs, config).await {
        match result {
            Ok(url) => nodes.push(image_node(&url)),
            Err(e) => {
                warn!("{}", e);
                outcome.warnings.push(e);
            }
        }
    }
    outcome.images_uploaded = nodes.len();
    Insertion::Nodes(nodes)
}
