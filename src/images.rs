//! Fetching size-variant bytes from the gallery and preparing them for the
//! vision model.

use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use std::io::{Cursor, Read};
use std::time::Duration;

use crate::models::{SizeVariant, SizeVariantKind};

/// Upper bound on a single downloaded rendition.
const MAX_IMAGE_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to fetch image from {url}: {message}")]
    Transport { url: String, message: String },
    #[error("failed to fetch image from {url}: status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to read image data from {url}: {source}")]
    Read {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves a size variant to raw image bytes.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, variant: &SizeVariant) -> Result<FetchedImage, FetchError>;
}

/// Fetches renditions from a Lychee-style `uploads/` tree over HTTP.
pub struct HttpImageFetcher {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpImageFetcher {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: builder.build(),
        }
    }

    /// Public URL of a rendition. Short paths may or may not already carry
    /// the size directory as their first segment.
    pub fn upload_url(&self, variant: &SizeVariant) -> String {
        let dir = variant.kind.upload_dir();
        let short_path = variant.short_path.trim_start_matches('/');
        let relative = match short_path.strip_prefix(&format!("{}/", dir)) {
            Some(rest) => rest,
            None => short_path,
        };
        format!("{}/uploads/{}/{}", self.base_url, dir, relative)
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, variant: &SizeVariant) -> Result<FetchedImage, FetchError> {
        let url = self.upload_url(variant);
        tracing::debug!(%url, kind = ?variant.kind, "Fetching image");

        let response = self.agent.get(&url).call().map_err(|e| match e {
            ureq::Error::Status(status, _) => FetchError::Status {
                url: url.clone(),
                status,
            },
            ureq::Error::Transport(t) => FetchError::Transport {
                url: url.clone(),
                message: t.to_string(),
            },
        })?;

        let header_mime = response
            .header("Content-Type")
            .map(|value| value.split(';').next().unwrap_or("").trim().to_lowercase());

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_IMAGE_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|source| FetchError::Read {
                url: url.clone(),
                source,
            })?;

        Ok(FetchedImage {
            bytes,
            mime_type: resolve_mime(header_mime.as_deref(), &variant.short_path),
        })
    }
}

/// Prefer an image `Content-Type`, then the path extension, then JPEG.
fn resolve_mime(header: Option<&str>, short_path: &str) -> String {
    if let Some(header) = header.filter(|h| h.starts_with("image/")) {
        return header.to_string();
    }
    mime_guess::from_path(short_path)
        .first()
        .filter(|m| m.type_() == mime_guess::mime::IMAGE)
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "image/jpeg".to_string())
}

/// Downscale an image whose longest side exceeds `max_dimension` and
/// re-encode it as JPEG. Bytes that cannot be decoded are returned as is,
/// so formats the decoder lacks still reach the model.
pub fn prepare_for_inference(image: FetchedImage, max_dimension: u32) -> Vec<u8> {
    let decoded = match image::load_from_memory(&image.bytes) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::debug!(mime = %image.mime_type, error = %e, "Sending undecodable image unchanged");
            return image.bytes;
        }
    };

    let (width, height) = decoded.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return image.bytes;
    }

    let resized = decoded.resize(max_dimension, max_dimension, image::imageops::FilterType::Triangle);
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, 85);
    match resized.to_rgb8().write_with_encoder(encoder) {
        Ok(()) => buf.into_inner(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to re-encode resized image, sending original");
            image.bytes
        }
    }
}

/// Whether a variant kind is acceptable as inference input.
pub fn usable_for_inference(kind: SizeVariantKind) -> bool {
    matches!(kind, SizeVariantKind::Medium | SizeVariantKind::Original)
}
