//! The direct-upload trigger: one image picked or dropped by the author.
//!
//! Unlike a paste there is nothing to classify and nothing to batch. The
//! file goes through the same upload primitive as pasted images, and on
//! success exactly one image node is produced. A failure is fatal for the
//! action and returned as [`PasteError`] so the caller can tell the author.

use crate::config::PipelineConfig;
use crate::error::PasteError;
use crate::fragment::{Element, Node};
use crate::pipeline::decode::{mime_for_path, resolve_format};
use crate::pipeline::upload::upload_batch;
use crate::uploader::ImageFile;
use std::path::Path;
use tracing::{debug, info};

/// An `<img>` node referencing an uploaded image.
pub fn image_node(url: &str) -> Node {
    Element::new("img").with_attr("src", url).into()
}

/// Read an image file from disk.
///
/// The MIME type comes from the extension, or from the bytes when the
/// extension is unknown.
pub async fn read_image_file(path: impl AsRef<Path>) -> Result<ImageFile, PasteError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| PasteError::FileReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    let mime = match mime_for_path(path) {
        Some(mime) => mime,
        None => resolve_format("", &bytes)
            .map(|(mime, _)| mime)
            .ok_or_else(|| PasteError::NotAnImage {
                name: name.clone(),
                detail: "unrecognised file type".into(),
            })?,
    };
    debug!("Read {} ({}, {} bytes)", name, mime, bytes.len());
    Ok(ImageFile::new(name, mime, bytes))
}

/// Upload one image and build the node to insert for it.
///
/// # Errors
/// - [`PasteError::UploaderNotConfigured`] without an uploader
/// - [`PasteError::NotAnImage`] for empty or non-image files
/// - [`PasteError::UploadFailed`] when the upload failed after retries
pub async fn upload_image(
    mut file: ImageFile,
    config: &PipelineConfig,
) -> Result<(String, Node), PasteError> {
    config.require_uploader()?;

    if file.bytes.is_empty() {
        return Err(PasteError::NotAnImage {
            name: file.name,
            detail: "file is empty".into(),
        });
    }
    if !file.is_image() {
        match resolve_format(&file.mime, &file.bytes) {
            Some((mime, _)) => file.mime = mime,
            None => {
                return Err(PasteError::NotAnImage {
                    detail: format!("type '{}'", file.mime),
                    name: file.name,
                })
            }
        }
    }

    info!("Uploading image {}", file.name);
    let filename = file.name.clone();
    let mut results = upload_batch(vec![(0, file)], config).await;
    match results.pop() {
        Some((_, Ok(url))) => {
            let node = image_node(&url);
            Ok((url, node))
        }
        Some((_, Err(e))) => Err(PasteError::UploadFailed {
            filename,
            detail: e.to_string(),
        }),
        None => Err(PasteError::Internal("upload batch returned no result".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use crate::uploader::ImageUploader;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::Arc;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    struct Fixed(Result<String, UploadError>);

    #[async_trait]
    impl ImageUploader for Fixed {
        async fn upload(&self, _image: &ImageFile) -> Result<String, UploadError> {
            self.0.clone()
        }
    }

    fn config(result: Result<String, UploadError>) -> PipelineConfig {
        PipelineConfig::builder()
            .uploader(Arc::new(Fixed(result)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn uploads_and_builds_node() {
        let config = config(Ok("http://localhost:4000/uploads/images/1_a.png".into()));
        let (url, node) = upload_image(ImageFile::new("a.png", "image/png", PNG.to_vec()), &config)
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:4000/uploads/images/1_a.png");
        assert_eq!(
            node.as_element().and_then(|el| el.attr("src")),
            Some(url.as_str())
        );
    }

    #[tokio::test]
    async fn failure_is_reported() {
        let config = config(Err(UploadError::Transport("connection refused".into())));
        let err = upload_image(ImageFile::new("a.png", "image/png", PNG.to_vec()), &config)
            .await
            .unwrap_err();
        match err {
            PasteError::UploadFailed { filename, detail } => {
                assert_eq!(filename, "a.png");
                assert!(detail.contains("connection refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn rejects_non_images() {
        let config = config(Ok("http://x/y.png".into()));
        let err = upload_image(ImageFile::new("a.txt", "text/plain", b"hi".to_vec()), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, PasteError::NotAnImage { .. }));

        let err = upload_image(ImageFile::new("a.png", "image/png", Vec::new()), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, PasteError::NotAnImage { .. }));
    }

    #[tokio::test]
    async fn requires_uploader() {
        let err = upload_image(
            ImageFile::new("a.png", "image/png", PNG.to_vec()),
            &PipelineConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PasteError::UploaderNotConfigured));
    }

    #[tokio::test]
    async fn reads_file_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(PNG).unwrap();
        let image = read_image_file(file.path()).await.unwrap();
        assert_eq!(image.mime, "image/png");
        assert_eq!(image.bytes, PNG);
    }

    #[tokio::test]
    async fn sniffs_file_without_extension() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PNG).unwrap();
        assert_eq!(read_image_file(file.path()).await.unwrap().mime, "image/png");

        let mut text = tempfile::NamedTempFile::new().unwrap();
        text.write_all(b"not an image").unwrap();
        assert!(matches!(
            read_image_file(text.path()).await,
            Err(PasteError::NotAnImage { .. })
        ));
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let err = read_image_file("/definitely/not/here.png").await.unwrap_err();
        assert!(matches!(err, PasteError::FileReadFailed { .. }));
    }
}
