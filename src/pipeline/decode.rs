//! Inline image decoding: `data:` URI → bytes + MIME + synthetic filename.
//!
//! Word processors and browsers embed copied images as base64 `data:` URIs
//! in the clipboard HTML. Before such an image can be uploaded its URI is
//! split into the declared media type and the payload, the payload decoded,
//! and a unique filename derived for the ingestion service.
//!
//! The declared media type is not trusted on its own: the bytes are sniffed
//! with `image::guess_format`, and when the two disagree the sniffed format
//! decides the MIME type and extension.

use crate::error::ImageError;
use crate::uploader::ImageFile;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use image::ImageFormat;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// Scheme prefix of inline binary data.
pub const INLINE_SCHEME: &str = "data:";

/// Standard alphabet, padding optional. Clipboard producers are not
/// consistent about trailing `=`.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Whether an image source carries inline binary data.
pub fn is_inline_binary(src: &str) -> bool {
    src.trim_start()
        .get(..INLINE_SCHEME.len())
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case(INLINE_SCHEME))
}

/// Whether any candidate of a `srcset` list carries inline binary data.
///
/// The commas inside a `data:` URI split it too, but its first piece still
/// starts with the scheme.
pub fn srcset_has_inline_binary(srcset: &str) -> bool {
    srcset.split(',').any(is_inline_binary)
}

/// Decode the `index`-th inline image of a paste into an uploadable file.
pub fn decode_inline_image(index: usize, src: &str, prefix: &str) -> Result<ImageFile, ImageError> {
    let (declared, bytes) = parse_data_uri(src).map_err(|detail| ImageError::InvalidDataUri {
        index,
        detail,
    })?;

    if bytes.is_empty() {
        return Err(ImageError::InvalidDataUri {
            index,
            detail: "empty payload".into(),
        });
    }

    let (mime, ext) = resolve_format(&declared, &bytes).ok_or(ImageError::UnsupportedMediaType {
        index,
        mime: declared.clone(),
    })?;

    let name = synthetic_filename(prefix, &ext);
    debug!(
        "Decoded inline image {}: {} ({} bytes) → {}",
        index,
        mime,
        bytes.len(),
        name
    );
    Ok(ImageFile::new(name, mime, bytes))
}

/// Split a `data:` URI into its media type and decoded payload.
///
/// `data:[<mediatype>][;param]*[;base64],<data>`; an empty media type means
/// `text/plain`, a payload without `;base64` is percent-encoded.
pub fn parse_data_uri(src: &str) -> Result<(String, Vec<u8>), String> {
    let src = src.trim();
    if !is_inline_binary(src) {
        return Err("missing data: scheme".into());
    }
    let rest = &src[INLINE_SCHEME.len()..];
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| "missing ',' separator".to_string())?;

    let mut params = meta.split(';');
    let mime = params.next().unwrap_or("").trim().to_ascii_lowercase();
    let mime = if mime.is_empty() {
        "text/plain".to_string()
    } else {
        mime
    };
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        LENIENT
            .decode(compact.as_bytes())
            .map_err(|e| format!("invalid base64: {e}"))?
    } else {
        percent_decode(payload)
    };

    Ok((mime, bytes))
}

/// Pick the MIME type and file extension an image is uploaded with.
///
/// Returns `None` when the bytes do not sniff as an image and the declared
/// type is not `image/*` either.
pub fn resolve_format(declared: &str, bytes: &[u8]) -> Option<(String, String)> {
    let declared = declared.trim().to_ascii_lowercase();

    if let Ok(sniffed) = image::guess_format(bytes) {
        if ImageFormat::from_mime_type(&declared) != Some(sniffed) {
            debug!(
                "Declared type '{}' disagrees with content ({:?}); using content",
                declared, sniffed
            );
        }
        let ext = sniffed.extensions_str().first().copied().unwrap_or("img");
        return Some((sniffed.to_mime_type().to_string(), ext.to_string()));
    }

    let subtype = declared.strip_prefix("image/")?;
    Some((declared.clone(), extension_for_subtype(subtype)))
}

/// MIME type for a file picked from disk, from its extension.
pub fn mime_for_path(path: &Path) -> Option<String> {
    ImageFormat::from_path(path)
        .ok()
        .map(|f| f.to_mime_type().to_string())
        .or_else(|| {
            let ext = path.extension()?.to_str()?.to_ascii_lowercase();
            (ext == "svg").then(|| "image/svg+xml".to_string())
        })
}

/// `{prefix}-{uuid}.{ext}`: unique per upload, safe for any backend's
/// filename sanitiser.
pub fn synthetic_filename(prefix: &str, ext: &str) -> String {
    format!("{}-{}.{}", prefix, Uuid::new_v4().simple(), ext)
}

fn extension_for_subtype(subtype: &str) -> String {
    match subtype {
        "jpeg" | "jpg" | "pjpeg" => "jpg".to_string(),
        "svg+xml" => "svg".to_string(),
        "x-icon" | "vnd.microsoft.icon" => "ico".to_string(),
        other => {
            let bare = other.strip_prefix("x-").unwrap_or(other);
            if !bare.is_empty() && bare.chars().all(|c| c.is_ascii_alphanumeric()) {
                bare.to_ascii_lowercase()
            } else {
                "img".to_string()
            }
        }
    }
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}
