//! Configuration types for the paste pipeline and the Markdown bridge.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. One struct carries the uploader, the retry
//! and timeout policy, the noise rules and the Markdown style, so a session,
//! a background paste task and the CLI all see the same settings.

use crate::error::PasteError;
use crate::fragment::DEFAULT_MAX_HTML_BYTES;
use crate::progress::ProgressCallback;
use crate::uploader::ImageUploader;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default pattern for inline styles that only office suites emit.
pub const DEFAULT_PRODUCER_STYLE_PATTERN: &str = "mso-|tab-stops|page-break";

/// Configuration for paste handling, image uploads and Markdown conversion.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pastedown::{EmphasisStyle, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .upload_timeout_secs(15)
///     .max_retries(2)
///     .emphasis(EmphasisStyle::Underscore)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Upload primitive shared by pasted images, pasted files and direct
    /// inserts. Without one, images cannot be ingested and are reported as
    /// per-image failures.
    pub uploader: Option<Arc<dyn ImageUploader>>,

    /// Per-upload timeout in seconds. Default: 30.
    pub upload_timeout_secs: u64,

    /// Retry attempts after a retryable upload failure. Default: 0.
    ///
    /// With the default a failed image is dropped from the paste and reported
    /// once. Raising it retries transport errors, HTTP 429 and 5xx with
    /// exponential backoff; validation rejections are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Cap on concurrent uploads within one paste. Default: unbounded.
    pub max_concurrent_uploads: Option<usize>,

    /// Clipboard HTML above this size is handled as plain text. Default: 20 MiB.
    pub max_html_bytes: usize,

    /// Prefix for synthetic upload filenames. Default: `pasted-image`.
    pub filename_prefix: String,

    /// What the noise stripper removes.
    pub noise: NoiseRules,

    /// How HTML is written out as Markdown.
    pub markdown: MarkdownStyle,

    /// Per-image upload events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            uploader: None,
            upload_timeout_secs: 30,
            max_retries: 0,
            retry_backoff_ms: 500,
            max_concurrent_uploads: None,
            max_html_bytes: DEFAULT_MAX_HTML_BYTES,
            filename_prefix: "pasted-image".to_string(),
            noise: NoiseRules::default(),
            markdown: MarkdownStyle::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("uploader", &self.uploader.as_ref().map(|_| "<dyn ImageUploader>"))
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_concurrent_uploads", &self.max_concurrent_uploads)
            .field("max_html_bytes", &self.max_html_bytes)
            .field("filename_prefix", &self.filename_prefix)
            .field("noise", &self.noise)
            .field("markdown", &self.markdown)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn UploadProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
            producer_style_pattern: None,
        }
    }

    /// The configured uploader, or [`PasteError::UploaderNotConfigured`].
    pub fn require_uploader(&self) -> Result<Arc<dyn ImageUploader>, PasteError> {
        self.uploader
            .as_ref()
            .map(Arc::clone)
            .ok_or(PasteError::UploaderNotConfigured)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
    producer_style_pattern: Option<String>,
}

impl PipelineConfigBuilder {
    pub fn uploader(mut self, uploader: Arc<dyn ImageUploader>) -> Self {
        self.config.uploader = Some(uploader);
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_concurrent_uploads(mut self, n: usize) -> Self {
        self.config.max_concurrent_uploads = Some(n);
        self
    }

    pub fn max_html_bytes(mut self, n: usize) -> Self {
        self.config.max_html_bytes = n;
        self
    }

    pub fn filename_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.filename_prefix = prefix.into();
        self
    }

    pub fn noise_rules(mut self, rules: NoiseRules) -> Self {
        self.config.noise = rules;
        self
    }

    /// Replace the producer-only inline style pattern. Compiled in `build()`.
    pub fn producer_style_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.producer_style_pattern = Some(pattern.into());
        self
    }

    pub fn markdown_style(mut self, style: MarkdownStyle) -> Self {
        self.config.markdown = style;
        self
    }

    pub fn emphasis(mut self, style: EmphasisStyle) -> Self {
        self.config.markdown.emphasis = style;
        self
    }

    pub fn bullet(mut self, marker: BulletMarker) -> Self {
        self.config.markdown.bullet = marker;
        self
    }

    pub fn fence(mut self, fence: FenceStyle) -> Self {
        self.config.markdown.fence = fence;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<PipelineConfig, PasteError> {
        if let Some(pattern) = self.producer_style_pattern.take() {
            self.config.noise.producer_style = compile_style_pattern(&pattern)?;
        }

        let c = &self.config;
        if c.upload_timeout_secs == 0 {
            return Err(PasteError::InvalidConfig(
                "Upload timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_concurrent_uploads == Some(0) {
            return Err(PasteError::InvalidConfig(
                "Concurrent uploads must be ≥ 1".into(),
            ));
        }
        if c.filename_prefix.trim().is_empty() {
            return Err(PasteError::InvalidConfig(
                "Filename prefix must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

fn compile_style_pattern(pattern: &str) -> Result<Regex, PasteError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| PasteError::InvalidConfig(format!("Invalid producer style pattern: {e}")))
}

// ── Noise rules ──────────────────────────────────────────────────────────

/// Markup the noise stripper treats as producer artefacts.
#[derive(Debug, Clone)]
pub struct NoiseRules {
    /// Elements removed with their whole subtree.
    pub drop_tags: Vec<String>,
    /// Tag-name prefixes of office-suite XML vocabularies (`o:p`, `w:sdt`, …).
    pub drop_prefixes: Vec<String>,
    /// A `class` attribute containing any of these tokens is removed.
    pub class_markers: Vec<String>,
    /// A `style` attribute matching this pattern is removed.
    pub producer_style: Regex,
}

impl Default for NoiseRules {
    fn default() -> Self {
        Self {
            drop_tags: ["meta", "style", "link", "script"]
                .into_iter()
                .map(String::from)
                .collect(),
            drop_prefixes: ["o:", "w:", "v:", "m:"]
                .into_iter()
                .map(String::from)
                .collect(),
            class_markers: vec!["Mso".to_string()],
            producer_style: default_producer_style(),
        }
    }
}

fn default_producer_style() -> Regex {
    use once_cell::sync::Lazy;
    static RE: Lazy<Regex> = Lazy::new(|| {
        RegexBuilder::new(DEFAULT_PRODUCER_STYLE_PATTERN)
            .case_insensitive(true)
            .build()
            .unwrap()
    });
    RE.clone()
}

// ── Markdown style ───────────────────────────────────────────────────────

/// Output conventions for HTML → Markdown. Headings are always ATX and code
/// blocks always fenced; the remaining choices are cosmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarkdownStyle {
    pub emphasis: EmphasisStyle,
    pub bullet: BulletMarker,
    pub fence: FenceStyle,
}

/// Delimiter for `<em>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmphasisStyle {
    /// `*text*` (default). Also works inside words.
    #[default]
    Asterisk,
    /// `_text_`. Emphasis that touches a letter or digit outside falls back
    /// to `*`.
    Underscore,
}

/// Marker for unordered list items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BulletMarker {
    #[default]
    Dash,
    Asterisk,
    Plus,
}

impl BulletMarker {
    pub fn as_char(self) -> char {
        match self {
            BulletMarker::Dash => '-',
            BulletMarker::Asterisk => '*',
            BulletMarker::Plus => '+',
        }
    }
}

/// Fence character for code blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FenceStyle {
    #[default]
    Backtick,
    Tilde,
}

impl FenceStyle {
    pub fn as_char(self) -> char {
        match self {
            FenceStyle::Backtick => '`',
            FenceStyle::Tilde => '~',
        }
    }
}
