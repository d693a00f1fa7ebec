use std::path::Path;
use std::sync::Arc;

use crate::images::{prepare_for_inference, usable_for_inference, FetchError, ImageFetcher};
use crate::llm::{prompts, GenerateRequest, InferenceClient, InferenceError};
use crate::models::{Photo, SizeVariant, SizeVariantKind};

/// Extensions treated as video. Videos are skipped, never described.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "avi", "mkv", "wmv", "flv", "webm", "ogv", "3gp", "m2v", "mpg", "mpeg",
    "mts", "m2ts",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoOutcome {
    Described(String),
    Skipped(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DescribeError {
    #[error("photo already has a description")]
    AlreadyDescribed,
    #[error("no usable size variant found")]
    NoSizeVariant,
    #[error("{0:?} rendition cannot be used for description")]
    UnusableVariant(SizeVariantKind),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("model returned an empty description")]
    EmptyDescription,
}

pub struct PhotoDescriber {
    client: InferenceClient,
    fetcher: Arc<dyn ImageFetcher>,
    model: String,
    max_dimension: u32,
}

impl PhotoDescriber {
    pub fn new(
        client: InferenceClient,
        fetcher: Arc<dyn ImageFetcher>,
        model: impl Into<String>,
        max_dimension: u32,
    ) -> Self {
        Self {
            client,
            fetcher,
            model: model.into(),
            max_dimension,
        }
    }

    /// Describe one photo from its best rendition. Videos are skipped.
    pub fn describe(&self, photo: &Photo, variant: &SizeVariant) -> Result<PhotoOutcome, DescribeError> {
        if let Some(ext) = video_marker(photo, variant) {
            return Ok(PhotoOutcome::Skipped(format!("video file ({})", ext)));
        }
        if photo.is_described() {
            return Err(DescribeError::AlreadyDescribed);
        }
        if !usable_for_inference(variant.kind) {
            return Err(DescribeError::UnusableVariant(variant.kind));
        }

        let image = self.fetcher.fetch(variant)?;
        let fetched_bytes = image.bytes.len();
        let bytes = prepare_for_inference(image, self.max_dimension);
        tracing::debug!(
            photo_id = %photo.id,
            fetched_bytes,
            sent_bytes = bytes.len(),
            "Prepared image for description"
        );

        let request = GenerateRequest::new(&self.model, prompts::photo_description(photo)).with_image(bytes);
        let description = self.client.complete(request)?;
        if description.is_empty() {
            return Err(DescribeError::EmptyDescription);
        }

        tracing::info!(photo_id = %photo.id, chars = description.len(), "Described photo");
        Ok(PhotoOutcome::Described(description))
    }
}

/// The video marker that matched, from the variant path or the declared type.
fn video_marker(photo: &Photo, variant: &SizeVariant) -> Option<String> {
    let path_ext = Path::new(&variant.short_path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    if let Some(ext) = path_ext.filter(|e| is_video_extension(e)) {
        return Some(ext);
    }

    let declared = photo.media_type.trim().to_lowercase();
    if declared.starts_with("video/") || is_video_extension(&declared) {
        return Some(declared);
    }
    None
}

fn is_video_extension(ext: &str) -> bool {
    let ext = ext.trim_start_matches('.');
    VIDEO_EXTENSIONS.contains(&ext)
}
