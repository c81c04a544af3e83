//! One editor session: a live document, its Markdown bridge and the
//! persistence sink.
//!
//! ## Why a session object?
//!
//! Pastes and direct uploads finish asynchronously, possibly after the
//! author has navigated away. [`EditorSession`] owns the document; tasks
//! spawned from it only keep a weak handle and upgrade it at the moment of
//! insertion. When the session is gone the late result is dropped without
//! touching anything, which is an expected race rather than an error.
//!
//! Every change to the document goes through the session so it can fire the
//! change notification: the document is serialised to Markdown and handed
//! to the [`MarkdownSink`]. Seeding from stored Markdown is the one mutation
//! that does not notify.

use crate::bridge::{MarkdownBridge, SeedState};
use crate::config::PipelineConfig;
use crate::direct::{read_image_file, upload_image};
use crate::document::RichDocument;
use crate::error::PasteError;
use crate::paste::{prepare_paste, ClipboardData, PasteOutcome, PasteState, PreparedPaste};
use crate::uploader::ImageFile;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Receives the document's Markdown after every change.
///
/// Debouncing and persisting are the receiver's business.
pub trait MarkdownSink: Send + Sync {
    fn markdown_changed(&self, markdown: &str);
}

impl<F> MarkdownSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn markdown_changed(&self, markdown: &str) {
        self(markdown)
    }
}

struct SessionInner<D> {
    // Lock order: bridge, then document.
    bridge: Mutex<MarkdownBridge>,
    document: Mutex<D>,
    config: PipelineConfig,
    sink: Mutex<Option<Arc<dyn MarkdownSink>>>,
}

/// An editing session over one document.
///
/// # Example
/// ```rust
/// use pastedown::{ClipboardData, EditorSession, MemoryDocument, PipelineConfig};
///
/// # block_on(async {
/// let session = EditorSession::new(MemoryDocument::new(), PipelineConfig::default());
/// session.seed("# Stored draft");
/// session
///     .paste(ClipboardData::new().with_html("<p>Pasted <strong>text</strong></p>"))
///     .await;
/// assert_eq!(session.markdown(), "# Stored draft\n\nPasted **text**");
/// # });
/// # fn block_on(f: impl std::future::Future<Output = ()>) {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
pub struct EditorSession<D: RichDocument + 'static> {
    inner: Arc<SessionInner<D>>,
}

impl<D: RichDocument + 'static> EditorSession<D> {
    pub fn new(document: D, config: PipelineConfig) -> Self {
        let bridge = MarkdownBridge::from_config(&config);
        Self {
            inner: Arc::new(SessionInner {
                bridge: Mutex::new(bridge),
                document: Mutex::new(document),
                config,
                sink: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Register the receiver of change notifications.
    pub fn set_sink(&self, sink: impl MarkdownSink + 'static) {
        *lock(&self.inner.sink) = Some(Arc::new(sink));
    }

    /// Offer stored Markdown to seed the document.
    ///
    /// Returns whether the document was seeded. It is seeded at most once,
    /// only while empty, and only until the first edit. Seeding does not
    /// notify the sink.
    pub fn seed(&self, markdown: &str) -> bool {
        let mut bridge = lock(&self.inner.bridge);
        let mut document = lock(&self.inner.document);
        match bridge.seed(document.is_empty(), markdown) {
            Some(html) => {
                document.set_content(&html);
                info!("Document seeded from stored Markdown ({} bytes)", markdown.len());
                true
            }
            None => false,
        }
    }

    pub fn seed_state(&self) -> SeedState {
        lock(&self.inner.bridge).seed_state()
    }

    /// Handle one paste and wait for it to be inserted.
    pub async fn paste(&self, data: ClipboardData) -> PasteOutcome {
        let prepared = prepare_paste(data, &self.inner.config).await;
        self.inner.apply_paste(prepared)
    }

    /// Handle one paste in the background.
    ///
    /// Concurrent pastes are independent: each inserts once its own uploads
    /// settle, in no particular order. If the session is gone by then the
    /// paste ends as [`PasteState::Discarded`].
    pub fn spawn_paste(&self, data: ClipboardData) -> JoinHandle<PasteOutcome> {
        let weak = Arc::downgrade(&self.inner);
        let config = self.inner.config.clone();
        tokio::spawn(async move {
            let prepared = prepare_paste(data, &config).await;
            match weak.upgrade() {
                Some(inner) => inner.apply_paste(prepared),
                None => prepared.discard(),
            }
        })
    }

    /// Upload one image and insert it at the selection. Returns its URL.
    ///
    /// Nothing is inserted on failure.
    pub async fn insert_image(&self, file: ImageFile) -> Result<String, PasteError> {
        let (url, node) = upload_image(file, &self.inner.config).await?;
        self.inner.edit(|document| document.insert_node(node));
        Ok(url)
    }

    /// Read an image from disk, upload it and insert it at the selection.
    pub async fn insert_image_from_path(&self, path: impl AsRef<Path>) -> Result<String, PasteError> {
        let file = read_image_file(path).await?;
        self.insert_image(file).await
    }

    /// Upload and insert one image in the background.
    ///
    /// Resolves to [`PasteError::SessionClosed`] without inserting when the
    /// session ended during the upload.
    pub fn spawn_insert_image(&self, file: ImageFile) -> JoinHandle<Result<String, PasteError>> {
        let weak: Weak<SessionInner<D>> = Arc::downgrade(&self.inner);
        let config = self.inner.config.clone();
        tokio::spawn(async move {
            let (url, node) = upload_image(file, &config).await?;
            let inner = weak.upgrade().ok_or_else(|| {
                debug!("Image upload finished after the session closed");
                PasteError::SessionClosed
            })?;
            inner.edit(|document| document.insert_node(node));
            Ok(url)
        })
    }

    /// Apply a user edit and fire the change notification.
    pub fn edit<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        self.inner.edit(f)
    }

    /// Fire the change notification for a change made outside the session.
    pub fn document_changed(&self) {
        self.inner.document_changed();
    }

    /// The document as Markdown.
    pub fn markdown(&self) -> String {
        self.inner.markdown()
    }

    /// The document as HTML.
    pub fn html(&self) -> String {
        lock(&self.inner.document).to_html()
    }

    /// End the session and return the document's final Markdown.
    ///
    /// Operations still in flight will find the session gone and insert
    /// nothing.
    pub fn close(self) -> String {
        let markdown = self.markdown();
        debug!("Editor session closed");
        markdown
    }
}

impl<D: RichDocument> SessionInner<D> {
    fn apply_paste(&self, prepared: PreparedPaste) -> PasteOutcome {
        let outcome = prepared.apply(&mut *lock(&self.document));
        if outcome.state == PasteState::Inserted {
            self.document_changed();
        }
        outcome
    }

    fn edit<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        let result = f(&mut *lock(&self.document));
        self.document_changed();
        result
    }

    fn markdown(&self) -> String {
        let bridge = lock(&self.bridge);
        let html = lock(&self.document).to_html();
        bridge.to_markdown(&html)
    }

    fn document_changed(&self) {
        let markdown = {
            let mut bridge = lock(&self.bridge);
            bridge.close_seeding();
            let html = lock(&self.document).to_html();
            bridge.to_markdown(&html)
        };
        let sink = lock(&self.sink).clone();
        if let Some(sink) = sink {
            sink.markdown_changed(&markdown);
        }
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use crate::error::UploadError;
    use crate::uploader::ImageUploader;
    use async_trait::async_trait;
    use std::time::Duration;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    struct Slow(Duration);

    #[async_trait]
    impl ImageUploader for Slow {
        async fn upload(&self, image: &ImageFile) -> Result<String, UploadError> {
            tokio::time::sleep(self.0).await;
            Ok(format!("http://localhost:4000/uploads/images/{}", image.name))
        }
    }

    fn session(delay_ms: u64) -> EditorSession<MemoryDocument> {
        let config = PipelineConfig::builder()
            .uploader(Arc::new(Slow(Duration::from_millis(delay_ms))))
            .build()
            .unwrap();
        EditorSession::new(MemoryDocument::new(), config)
    }

    fn recorder(session: &EditorSession<MemoryDocument>) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.set_sink(move |md: &str| sink.lock().unwrap().push(md.to_string()));
        seen
    }

    fn png_html() -> String {
        use base64::Engine;
        let b64 = base64::engine::general_purpose::STANDARD.encode(PNG);
        format!(r#"<p>x<img src="data:image/png;base64,{b64}" alt="pic"></p>"#)
    }

    #[test]
    fn seeding_does_not_notify() {
        let session = session(0);
        let seen = recorder(&session);
        assert!(session.seed("# Title\n\nBody"));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(session.markdown(), "# Title\n\nBody");
        assert!(!session.seed("# Other"));
    }

    #[test]
    fn edit_before_seed_closes_window() {
        let session = session(0);
        let seen = recorder(&session);
        session.edit(|doc| doc.insert_text("typed"));
        assert_eq!(seen.lock().unwrap().as_slice(), ["typed"]);
        assert!(!session.seed("# Late"));
        assert_eq!(session.seed_state(), SeedState::Skipped);
        assert_eq!(session.markdown(), "typed");
    }

    #[tokio::test]
    async fn paste_notifies_with_markdown() {
        let session = session(0);
        let seen = recorder(&session);
        let outcome = session
            .paste(ClipboardData::new().with_html(
                "<h1>Test Heading</h1><p>This is a <strong>bold</strong> paragraph.</p>",
            ))
            .await;
        assert_eq!(outcome.state, PasteState::Inserted);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("# Test Heading"));
        assert!(seen[0].contains("**bold**"));
    }

    #[tokio::test]
    async fn late_paste_is_discarded() {
        let session = session(100);
        let seen = recorder(&session);
        let handle = session.spawn_paste(ClipboardData::new().with_html(png_html()));
        drop(session);
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.state, PasteState::Discarded);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn spawned_paste_inserts_after_upload() {
        let session = session(20);
        let handle = session.spawn_paste(ClipboardData::new().with_html(png_html()));
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.state, PasteState::Inserted);
        assert_eq!(outcome.images_uploaded, 1);
        let html = session.html();
        assert!(html.contains("/uploads/images/pasted-image-"));
        assert!(!html.contains("data:"));
    }

    #[tokio::test]
    async fn late_direct_upload_reports_closed_session() {
        let session = session(100);
        let handle = session.spawn_insert_image(ImageFile::new("a.png", "image/png", PNG.to_vec()));
        let _ = session.close();
        assert!(matches!(handle.await.unwrap(), Err(PasteError::SessionClosed)));
    }

    #[tokio::test]
    async fn direct_upload_inserts_one_image() {
        let session = session(0);
        let seen = recorder(&session);
        let url = session
            .insert_image(ImageFile::new("a.png", "image/png", PNG.to_vec()))
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:4000/uploads/images/a.png");
        assert_eq!(session.markdown(), "![](http://localhost:4000/uploads/images/a.png)");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_direct_upload_inserts_nothing() {
        let session = EditorSession::new(MemoryDocument::new(), PipelineConfig::default());
        let seen = recorder(&session);
        let err = session
            .insert_image(ImageFile::new("a.png", "image/png", PNG.to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, PasteError::UploaderNotConfigured));
        assert!(session.html().is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }
}
