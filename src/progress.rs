//! Progress-callback trait for per-image upload events.
//!
//! Inject an [`Arc<dyn UploadProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events while a paste or direct insert uploads its images. The host can
//! forward them to a status line, a toast ("1 image failed to upload") or a
//! terminal progress bar without the pipeline knowing which.
//!
//! # Example
//!
//! ```rust
//! use pastedown::{PipelineConfig, UploadProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter {
//!     failed: AtomicUsize,
//! }
//!
//! impl UploadProgressCallback for FailureCounter {
//!     fn on_upload_error(&self, index: usize, total: usize, error: &str) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("image {}/{} did not upload: {}", index + 1, total, error);
//!     }
//! }
//!
//! let counter = Arc::new(FailureCounter { failed: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn UploadProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it uploads the images of one operation.
///
/// Uploads within a batch run concurrently, so `on_upload_start`,
/// `on_upload_complete` and `on_upload_error` may interleave in any order.
/// All methods default to no-ops.
pub trait UploadProgressCallback: Send + Sync {
    /// Called once before the first upload of a batch.
    ///
    /// # Arguments
    /// * `total`: number of images that will be uploaded
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called just before an image is sent.
    ///
    /// # Arguments
    /// * `index`: zero-based position of the image in the batch
    /// * `total`: batch size
    /// * `filename`: synthetic name the image is uploaded under
    fn on_upload_start(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called when an image has a durable URL.
    fn on_upload_complete(&self, index: usize, total: usize, url: &str) {
        let _ = (index, total, url);
    }

    /// Called when an image failed after all retries. The rest of the batch
    /// still proceeds.
    fn on_upload_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every upload of the batch has settled.
    ///
    /// # Arguments
    /// * `total`: batch size
    /// * `success_count`: images that now have a URL
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl UploadProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn UploadProgressCallback>;
