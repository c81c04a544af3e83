//! Binary extraction: upload inline images and point the fragment at URLs.
//!
//! ## Steps
//!
//! 1. Walk the fragment once. Every image-bearing element (`<img>`,
//!    `<source>`, `<input type="image">`) whose `src` is a `data:` URI has
//!    its source taken out and replaced by a batch-unique placeholder
//!    (`x-pending-upload:{batch}/{n}`). A `srcset` carrying `data:` is
//!    dropped.
//! 2. Decode each taken source ([`super::decode`]). Undecodable sources
//!    become warnings without being uploaded.
//! 3. Upload every decoded image concurrently and wait for all of them to
//!    settle ([`super::upload::upload_batch`]).
//! 4. Walk again: placeholders with a URL get it as their `src`; the
//!    remaining placeholder elements are removed, as are `<source>` elements
//!    left with neither `src` nor `srcset`.
//!
//! The fragment is owned by the caller for the whole batch and only handed
//! to the document afterwards, so no partially rewritten fragment can be
//! inserted.

use super::decode::{decode_inline_image, is_inline_binary, srcset_has_inline_binary};
use super::upload::upload_batch;
use crate::config::PipelineConfig;
use crate::error::ImageError;
use crate::fragment::{Element, Fragment};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Scheme of the placeholder sources written while uploads are pending.
pub const PENDING_SCHEME: &str = "x-pending-upload:";

/// What one extraction pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Inline images found in the fragment.
    pub found: usize,
    /// Images now referencing an uploaded URL.
    pub uploaded: usize,
    /// One entry per image that was removed, in image order.
    pub warnings: Vec<ImageError>,
}

/// Upload every inline image of `fragment` and rewrite it in place.
///
/// Never fails as a whole: a failed image is removed from the fragment and
/// reported in [`ExtractReport::warnings`].
pub async fn extract_images(fragment: &mut Fragment, config: &PipelineConfig) -> ExtractReport {
    let batch = Uuid::new_v4().simple().to_string();
    let pending = take_inline_sources(fragment, &batch);
    let mut report = ExtractReport {
        found: pending.len(),
        ..Default::default()
    };
    if pending.is_empty() {
        return report;
    }
    info!("Extracting {} inline image(s)", pending.len());

    let mut jobs = Vec::with_capacity(pending.len());
    for (index, src) in pending.into_iter().enumerate() {
        match decode_inline_image(index, &src, &config.filename_prefix) {
            Ok(file) => jobs.push((index, file)),
            Err(e) => {
                warn!("{}", e);
                report.warnings.push(e);
            }
        }
    }

    let mut urls: HashMap<String, String> = HashMap::new();
    for (index, result) in upload_batch(jobs, config).await {
        match result {
            Ok(url) => {
                urls.insert(placeholder(&batch, index), url);
            }
            Err(e) => report.warnings.push(e),
        }
    }
    report.warnings.sort_by_key(ImageError::index);
    report.uploaded = urls.len();

    fragment.for_each_element_mut(&mut |el| {
        if let Some(url) = el.attr("src").and_then(|src| urls.get(src)).cloned() {
            el.set_attr("src", url);
        }
    });

    let prefix = placeholder_prefix(&batch);
    fragment.remove_elements(&mut |el| {
        el.attr("src")
            .is_some_and(|src| src.starts_with(prefix.as_str()))
            || is_empty_source(el)
    });

    debug!(
        "Extraction settled: {}/{} uploaded, {} removed",
        report.uploaded,
        report.found,
        report.warnings.len()
    );
    report
}

/// Replace each inline image source by a placeholder and return the taken
/// sources in document order.
fn take_inline_sources(fragment: &mut Fragment, batch: &str) -> Vec<String> {
    let mut taken = Vec::new();
    fragment.for_each_element_mut(&mut |el| {
        if !is_image_element(el) {
            return;
        }
        // A responsive candidate list may embed data too; the plain src wins.
        if el.attr("srcset").is_some_and(srcset_has_inline_binary) {
            el.remove_attr("srcset");
        }
        if let Some(src) = el.attr("src").filter(|s| is_inline_binary(s)).map(str::to_string) {
            el.set_attr("src", placeholder(batch, taken.len()));
            taken.push(src);
        }
    });
    taken
}

fn is_image_element(el: &Element) -> bool {
    match el.name.as_str() {
        "img" | "source" => true,
        "input" => el.attr("type").is_some_and(|t| t.trim().eq_ignore_ascii_case("image")),
        _ => false,
    }
}

/// A `<source>` with nothing left to offer the `<picture>` around it.
fn is_empty_source(el: &Element) -> bool {
    el.name == "source" && el.attr("src").is_none() && el.attr("srcset").is_none()
}

fn placeholder_prefix(batch: &str) -> String {
    format!("{PENDING_SCHEME}{batch}/")
}

fn placeholder(batch: &str, index: usize) -> String {
    format!("{}{}", placeholder_prefix(batch), index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use crate::uploader::{ImageFile, ImageUploader};
    use async_trait::async_trait;
    use std::sync::Arc;

    const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

    /// Succeeds for every image except the `fail_at`-th call.
    struct Numbered {
        calls: std::sync::atomic::AtomicUsize,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl ImageUploader for Numbered {
        async fn upload(&self, image: &ImageFile) -> Result<String, UploadError> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if Some(n) == self.fail_at {
                return Err(UploadError::Rejected {
                    status: 413,
                    body: "too large".into(),
                });
            }
            Ok(format!("http://localhost:4000/uploads/images/{}", image.name))
        }
    }

    fn config(fail_at: Option<usize>) -> PipelineConfig {
        PipelineConfig::builder()
            .uploader(Arc::new(Numbered {
                calls: Default::default(),
                fail_at,
            }))
            .build()
            .unwrap()
    }

    fn inline_img(alt: &str) -> String {
        format!(r#"<img alt="{alt}" src="data:image/png;base64,{PNG_1X1}">"#)
    }

    #[tokio::test]
    async fn all_inline_images_are_rewritten() {
        let html = format!("<p>{}{}</p><p>{}</p>", inline_img("a"), inline_img("b"), inline_img("c"));
        let mut frag = Fragment::parse(&html).unwrap();

        let report = extract_images(&mut frag, &config(None)).await;

        assert_eq!(report.found, 3);
        assert_eq!(report.uploaded, 3);
        assert!(report.warnings.is_empty());
        let imgs = frag.elements_named("img");
        assert_eq!(imgs.len(), 3);
        for img in imgs {
            let src = img.attr("src").unwrap();
            assert!(src.starts_with("http://localhost:4000/uploads/images/pasted-image-"));
        }
        assert!(!frag.to_html().contains("data:image"));
    }

    #[tokio::test]
    async fn one_failed_upload_removes_only_that_image() {
        let html = format!("<p>{}{}{}</p>", inline_img("a"), inline_img("b"), inline_img("c"));
        let mut frag = Fragment::parse(&html).unwrap();

        let report = extract_images(&mut frag, &config(Some(1))).await;

        assert_eq!(report.uploaded, 2);
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(report.warnings[0], ImageError::UploadFailed { .. }));
        let imgs = frag.elements_named("img");
        assert_eq!(imgs.len(), 2);
        assert!(imgs
            .iter()
            .all(|i| i.attr("src").is_some_and(|s| s.starts_with("http://"))));
        assert!(!frag.to_html().contains(PENDING_SCHEME));
    }

    #[tokio::test]
    async fn undecodable_image_is_removed_with_warning() {
        let html = format!(
            r#"<p>text<img src="data:image/png;base64,@@@">{}</p>"#,
            inline_img("ok")
        );
        let mut frag = Fragment::parse(&html).unwrap();

        let report = extract_images(&mut frag, &config(None)).await;

        assert_eq!(report.found, 2);
        assert_eq!(report.uploaded, 1);
        assert!(matches!(
            report.warnings.as_slice(),
            [ImageError::InvalidDataUri { index: 0, .. }]
        ));
        assert_eq!(frag.elements_named("img").len(), 1);
        assert!(frag.to_html().starts_with("<p>text<img"));
    }

    #[tokio::test]
    async fn remote_images_are_untouched() {
        let mut frag = Fragment::parse(r#"<img src="https://example.org/a.png">"#).unwrap();
        let report = extract_images(&mut frag, &config(None)).await;
        assert_eq!(report, ExtractReport::default());
        assert_eq!(frag.to_html(), r#"<img src="https://example.org/a.png">"#);
    }

    #[tokio::test]
    async fn empty_fragment_is_accepted() {
        let mut frag = Fragment::default();
        let report = extract_images(&mut frag, &config(None)).await;
        assert_eq!(report.found, 0);
        assert!(frag.children.is_empty());
    }

    #[tokio::test]
    async fn missing_uploader_removes_inline_images() {
        let mut frag = Fragment::parse(&format!("<p>x{}</p>", inline_img("a"))).unwrap();
        let report = extract_images(&mut frag, &PipelineConfig::default()).await;
        assert_eq!(report.uploaded, 0);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(frag.to_html(), "<p>x</p>");
    }

    #[tokio::test]
    async fn picture_sources_carry_no_inline_data() {
        let html = format!(
            r#"<picture><source srcset="data:image/png;base64,{PNG_1X1}"><source srcset="https://example.org/a.webp" type="image/webp">{}</picture>"#,
            inline_img("a")
        );
        let mut frag = Fragment::parse(&html).unwrap();

        let report = extract_images(&mut frag, &config(None)).await;

        assert_eq!(report.uploaded, 1);
        let out = frag.to_html();
        assert!(!out.contains("data:"), "{out}");
        let sources = frag.elements_named("source");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].attr("srcset"), Some("https://example.org/a.webp"));
        assert!(frag.elements_named("img")[0]
            .attr("src")
            .is_some_and(|s| s.starts_with("http://localhost:4000/")));
    }

    #[tokio::test]
    async fn inline_source_src_and_image_input_are_uploaded() {
        let html = format!(
            r#"<video><source src="data:image/png;base64,{PNG_1X1}"></video><input type="image" src="data:image/png;base64,{PNG_1X1}"><input type="text" value="data:x">"#
        );
        let mut frag = Fragment::parse(&html).unwrap();

        let report = extract_images(&mut frag, &config(None)).await;

        assert_eq!(report.found, 2);
        assert_eq!(report.uploaded, 2);
        assert!(!frag.to_html().contains("data:image"));
        assert!(frag.elements_named("source")[0]
            .attr("src")
            .is_some_and(|s| s.starts_with("http://")));
        let inputs = frag.elements_named("input");
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[1].attr("value"), Some("data:x"));
    }

    #[tokio::test]
    async fn inline_srcset_is_dropped() {
        let html = format!(
            r#"<img src="https://example.org/a.png" srcset="data:image/png;base64,{PNG_1X1} 2x">"#
        );
        let mut frag = Fragment::parse(&html).unwrap();
        extract_images(&mut frag, &config(None)).await;
        assert_eq!(frag.to_html(), r#"<img src="https://example.org/a.png">"#);
    }
}
