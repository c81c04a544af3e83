//! The Markdown ⇄ document bridge.
//!
//! Markdown is the persisted form; the rich document is the editing form.
//! The bridge converts between them in two places only:
//!
//! - **Document → Markdown** after every content change. Synchronous and
//!   local: the document's HTML is parsed into a [`Fragment`] and written
//!   out by [`markdown::fragment_to_markdown`].
//! - **Markdown → Document** once per load, when the document is still empty
//!   and stored Markdown is available. [`MarkdownBridge::seed`] decides; the
//!   seeded content is not an edit and must not be written back.
//!
//! Both directions are total. HTML that cannot be parsed as a fragment is
//! written out as escaped text.

pub mod html;
pub mod markdown;

use crate::config::{MarkdownStyle, PipelineConfig};
use crate::fragment::{Fragment, DEFAULT_MAX_HTML_BYTES};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use html::markdown_to_html;
pub use markdown::fragment_to_markdown;

/// Where a bridge stands in its one-shot seeding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeedState {
    /// No stored Markdown has been offered yet.
    Pending,
    /// The document was seeded from stored Markdown.
    Seeded,
    /// Seeding was declined: the document already had content, or the user
    /// edited before stored Markdown arrived.
    Skipped,
}

/// Converts between document HTML and Markdown for one document load.
#[derive(Debug, Clone)]
pub struct MarkdownBridge {
    style: MarkdownStyle,
    max_html_bytes: usize,
    seed: SeedState,
}

impl MarkdownBridge {
    pub fn new(style: MarkdownStyle) -> Self {
        Self {
            style,
            max_html_bytes: DEFAULT_MAX_HTML_BYTES,
            seed: SeedState::Pending,
        }
    }

    /// A bridge using the Markdown style and HTML size limit of `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.markdown).with_max_html_bytes(config.max_html_bytes)
    }

    /// HTML above this size is written out as text instead of parsed.
    pub fn with_max_html_bytes(mut self, max: usize) -> Self {
        self.max_html_bytes = max;
        self
    }

    pub fn style(&self) -> MarkdownStyle {
        self.style
    }

    pub fn seed_state(&self) -> SeedState {
        self.seed
    }

    /// Serialise document HTML to Markdown.
    pub fn to_markdown(&self, html: &str) -> String {
        convert_html(html, self.style, self.max_html_bytes)
    }

    /// Render Markdown to HTML.
    pub fn to_html(&self, markdown: &str) -> String {
        markdown_to_html(markdown)
    }

    /// Decide whether stored Markdown should seed the document.
    ///
    /// Returns the HTML to set when the window is still open, the document
    /// is empty and `markdown` has content. Blank Markdown leaves the window
    /// open; a non-empty document closes it for good.
    pub fn seed(&mut self, document_is_empty: bool, markdown: &str) -> Option<String> {
        if self.seed != SeedState::Pending {
            debug!("Seed ignored: already {:?}", self.seed);
            return None;
        }
        if markdown.trim().is_empty() {
            return None;
        }
        if !document_is_empty {
            debug!("Seed skipped: document already has content");
            self.seed = SeedState::Skipped;
            return None;
        }
        self.seed = SeedState::Seeded;
        Some(self.to_html(markdown))
    }

    /// Close the seeding window because the user edited first.
    pub fn close_seeding(&mut self) {
        if self.seed == SeedState::Pending {
            self.seed = SeedState::Skipped;
        }
    }
}

impl Default for MarkdownBridge {
    fn default() -> Self {
        Self::new(MarkdownStyle::default())
    }
}

/// Convert HTML to Markdown. Never fails.
pub fn html_to_markdown(html: &str, style: MarkdownStyle) -> String {
    convert_html(html, style, DEFAULT_MAX_HTML_BYTES)
}

fn convert_html(html: &str, style: MarkdownStyle, max_bytes: usize) -> String {
    match Fragment::parse_with_limit(html, max_bytes) {
        Ok(fragment) => fragment_to_markdown(&fragment, style),
        Err(e) => {
            warn!("HTML could not be parsed ({}); writing it as text", e);
            crate::pipeline::postprocess::clean_markdown(&markdown::escape_plain_text(html))
        }
    }
}
