//! Upload primitive: timeout and bounded retry around one `ImageUploader` call.
//!
//! Every path that ingests an image (inline images of a pasted fragment,
//! image files on the clipboard, direct inserts) uploads through
//! [`upload_with_retry`], so all of them share the same timeout, retry policy
//! and progress events.
//!
//! ## Retry Strategy
//!
//! With the default `max_retries = 0` a failed upload is reported once and
//! the image is dropped. When retries are enabled, only failures that could
//! succeed on a second try are retried: transport errors, timeouts, HTTP 429
//! and 5xx. The wait doubles per attempt (`retry_backoff_ms * 2^(attempt-1)`);
//! with 500 ms base and 3 retries the sequence is 500 ms → 1 s → 2 s.

use crate::config::PipelineConfig;
use crate::error::{ImageError, UploadError};
use crate::uploader::{ImageFile, ImageUploader};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Why the last attempt did not produce a URL.
enum Failure {
    Upload(UploadError),
    TimedOut,
}

/// Upload one image, retrying retryable failures.
///
/// `index` is the image's position within its batch and is carried into any
/// warning.
pub async fn upload_with_retry(
    uploader: &dyn ImageUploader,
    index: usize,
    image: &ImageFile,
    config: &PipelineConfig,
) -> Result<String, ImageError> {
    let limit = Duration::from_secs(config.upload_timeout_secs);
    let mut last: Option<Failure> = None;
    let mut retries = 0;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config
                .retry_backoff_ms
                .saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!(
                "Image {} ({}): retry {}/{} after {}ms",
                index, image.name, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }
        retries = attempt;

        match timeout(limit, uploader.upload(image)).await {
            Ok(Ok(url)) => {
                debug!("Image {} ({}): uploaded → {}", index, image.name, url);
                return Ok(url);
            }
            Ok(Err(e)) => {
                warn!("Image {} ({}): attempt {} failed: {}", index, image.name, attempt + 1, e);
                let retryable = e.is_retryable();
                last = Some(Failure::Upload(e));
                if !retryable {
                    break;
                }
            }
            Err(_) => {
                warn!(
                    "Image {} ({}): attempt {} timed out after {}s",
                    index,
                    image.name,
                    attempt + 1,
                    config.upload_timeout_secs
                );
                last = Some(Failure::TimedOut);
            }
        }
    }

    Err(match last {
        Some(Failure::TimedOut) => ImageError::Timeout {
            index,
            filename: image.name.clone(),
            secs: config.upload_timeout_secs,
        },
        Some(Failure::Upload(e)) => ImageError::UploadFailed {
            index,
            filename: image.name.clone(),
            retries,
            detail: e.to_string(),
        },
        None => ImageError::UploadFailed {
            index,
            filename: image.name.clone(),
            retries,
            detail: "Unknown error".to_string(),
        },
    })
}

/// Upload a batch of images concurrently and wait for every one to settle.
///
/// Results come back in `index` order regardless of completion order. At
/// most `config.max_concurrent_uploads` requests are in flight; by default
/// the whole batch is. Without a configured uploader every image fails with
/// a per-image error.
pub async fn upload_batch(
    images: Vec<(usize, ImageFile)>,
    config: &PipelineConfig,
) -> Vec<(usize, Result<String, ImageError>)> {
    let total = images.len();
    if total == 0 {
        return Vec::new();
    }

    let Some(uploader) = config.uploader.as_ref().map(Arc::clone) else {
        warn!("{} image(s) not uploaded: no uploader configured", total);
        return images
            .into_iter()
            .map(|(index, image)| {
                let err = ImageError::UploadFailed {
                    index,
                    filename: image.name,
                    retries: 0,
                    detail: "no image uploader configured".to_string(),
                };
                if let Some(ref cb) = config.progress_callback {
                    cb.on_upload_error(index, total, &err.to_string());
                }
                (index, Err(err))
            })
            .collect();
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let limit = config.max_concurrent_uploads.unwrap_or(total).max(1);
    let mut results: Vec<(usize, Result<String, ImageError>)> =
        stream::iter(images.into_iter().map(|(index, image)| {
            let uploader = Arc::clone(&uploader);
            async move {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_upload_start(index, total, &image.name);
                }
                let result = upload_with_retry(uploader.as_ref(), index, &image, config).await;
                if let Some(ref cb) = config.progress_callback {
                    match &result {
                        Ok(url) => cb.on_upload_complete(index, total, url),
                        Err(e) => cb.on_upload_error(index, total, &e.to_string()),
                    }
                }
                (index, result)
            }
        }))
        .buffer_unordered(limit)
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);

    let succeeded = results.iter().filter(|(_, r)| r.is_ok()).count();
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, succeeded);
    }
    debug!("Upload batch settled: {}/{} succeeded", succeeded, total);

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::UploadProgressCallback;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails the first `fail_times` calls with `error`, then succeeds.
    struct Flaky {
        calls: AtomicUsize,
        fail_times: usize,
        error: UploadError,
    }

    impl Flaky {
        fn new(fail_times: usize, error: UploadError) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_times,
                error,
            }
        }
    }

    #[async_trait]
    impl ImageUploader for Flaky {
        async fn upload(&self, image: &ImageFile) -> Result<String, UploadError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(self.error.clone())
            } else {
                Ok(format!("https://cdn.test/uploads/{}", image.name))
            }
        }
    }

    struct Hanging;

    #[async_trait]
    impl ImageUploader for Hanging {
        async fn upload(&self, _image: &ImageFile) -> Result<String, UploadError> {
            sleep(Duration::from_secs(30)).await;
            Ok("never".into())
        }
    }

    fn png(name: &str) -> ImageFile {
        ImageFile::new(name, "image/png", vec![1, 2, 3])
    }

    fn config(retries: u32) -> PipelineConfig {
        PipelineConfig::builder()
            .max_retries(retries)
            .retry_backoff_ms(1)
            .upload_timeout_secs(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn default_does_not_retry() {
        let up = Flaky::new(1, UploadError::Transport("reset".into()));
        let err = upload_with_retry(&up, 0, &png("a.png"), &config(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::UploadFailed { retries: 0, .. }));
        assert_eq!(up.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let up = Flaky::new(2, UploadError::Rejected { status: 503, body: String::new() });
        let url = upload_with_retry(&up, 0, &png("a.png"), &config(3)).await.unwrap();
        assert_eq!(url, "https://cdn.test/uploads/a.png");
        assert_eq!(up.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn validation_rejection_is_not_retried() {
        let up = Flaky::new(5, UploadError::Rejected { status: 400, body: "bad type".into() });
        let err = upload_with_retry(&up, 2, &png("a.png"), &config(3))
            .await
            .unwrap_err();
        assert_eq!(up.calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.index(), 2);
        assert!(err.to_string().contains("bad type"));
    }

    #[tokio::test]
    async fn hanging_upload_times_out() {
        let err = upload_with_retry(&Hanging, 0, &png("slow.png"), &config(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::Timeout { secs: 1, ref filename, .. } if filename == "slow.png"));
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl UploadProgressCallback for Recorder {
        fn on_batch_start(&self, total: usize) {
            self.events.lock().unwrap().push(format!("start {total}"));
        }
        fn on_upload_error(&self, index: usize, _total: usize, _error: &str) {
            self.events.lock().unwrap().push(format!("error {index}"));
        }
        fn on_batch_complete(&self, total: usize, success_count: usize) {
            self.events.lock().unwrap().push(format!("done {success_count}/{total}"));
        }
    }

    #[tokio::test]
    async fn batch_results_are_ordered_and_reported() {
        let recorder = Arc::new(Recorder::default());
        let config = PipelineConfig::builder()
            .uploader(Arc::new(Flaky::new(0, UploadError::Transport(String::new()))))
            .max_concurrent_uploads(2)
            .progress_callback(recorder.clone())
            .build()
            .unwrap();

        let images = (0..4).map(|i| (i, png(&format!("{i}.png")))).collect();
        let results = upload_batch(images, &config).await;

        let indices: Vec<usize> = results.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.first().map(String::as_str), Some("start 4"));
        assert_eq!(events.last().map(String::as_str), Some("done 4/4"));
    }

    #[tokio::test]
    async fn batch_without_uploader_fails_each_image() {
        let results = upload_batch(vec![(0, png("a.png")), (1, png("b.png"))], &config(0)).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_err()));
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        assert!(upload_batch(Vec::new(), &config(0)).await.is_empty());
    }
}
