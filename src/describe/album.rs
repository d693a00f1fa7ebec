use super::compactor::{CompactionError, Compactor};
use crate::llm::{prompts, GenerateRequest, InferenceClient, InferenceError};
use crate::models::{Album, Photo};

#[derive(Debug, thiserror::Error)]
pub enum AlbumError {
    #[error("No photos found")]
    NoPhotos,
    #[error("no photo descriptions available")]
    NoDescriptions,
    #[error(transparent)]
    Compaction(#[from] CompactionError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

pub struct AlbumDescriber {
    client: InferenceClient,
    compactor: Compactor,
    model: String,
}

impl AlbumDescriber {
    pub fn new(client: InferenceClient, compactor: Compactor, model: impl Into<String>) -> Self {
        Self {
            client,
            compactor,
            model: model.into(),
        }
    }

    /// Summarise an album from its photos' descriptions and append the
    /// date span of every member photo.
    pub fn describe(&self, album: &Album, photos: &[Photo]) -> Result<String, AlbumError> {
        if photos.is_empty() {
            return Err(AlbumError::NoPhotos);
        }

        let descriptions: Vec<String> = photos
            .iter()
            .filter_map(|p| p.ai_description.clone())
            .collect();
        if descriptions.is_empty() {
            return Err(AlbumError::NoDescriptions);
        }

        let dates: Vec<String> = photos.iter().map(Photo::effective_date_string).collect();
        let (first, last) = date_span(&dates).ok_or(AlbumError::NoPhotos)?;

        let described = descriptions.len();
        let descriptions = if described > self.compactor.batch_size() {
            tracing::info!(album_id = %album.id, descriptions = described, "Album needs compaction");
            self.compactor.compact(descriptions)?
        } else {
            descriptions
        };

        let request = GenerateRequest::new(
            &self.model,
            prompts::album_summary(&descriptions, first, last),
        );
        let summary = self.client.complete(request)?;

        tracing::info!(
            album_id = %album.id,
            photos = photos.len(),
            described,
            "Described album"
        );
        Ok(format!(
            "{} The album contains photos from dates {} to {}.",
            summary, first, last
        ))
    }
}

/// Smallest and largest `YYYY-MM-DD` string.
fn date_span(dates: &[String]) -> Option<(&str, &str)> {
    let first = dates.iter().min()?;
    let last = dates.iter().max()?;
    Some((first.as_str(), last.as_str()))
}
