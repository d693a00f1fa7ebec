use std::sync::{Arc, Mutex, MutexGuard};

use super::cache::SuggestionCache;
use super::engine::{SuggestError, SuggestionEngine, MAX_SUGGESTIONS};
use crate::models::{Album, Photo};
use crate::repository::{AlbumFilter, Repository, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Suggest(#[from] SuggestError),
    #[error("photo {0} not found among unsorted photos")]
    PhotoNotFound(String),
    #[error("suggestion cache lock poisoned")]
    Poisoned,
}

/// Answers suggestion requests, serving repeats from the cache.
pub struct SuggestionService {
    repo: Arc<dyn Repository>,
    engine: SuggestionEngine,
    cache: Mutex<SuggestionCache>,
}

impl SuggestionService {
    pub fn new(repo: Arc<dyn Repository>, engine: SuggestionEngine, cache: SuggestionCache) -> Self {
        Self {
            repo,
            engine,
            cache: Mutex::new(cache),
        }
    }

    pub fn unsorted_photos(&self) -> Result<Vec<Photo>, ServiceError> {
        Ok(self.repo.unsorted_photos()?)
    }

    /// Suggested albums for an unsorted photo, best first.
    pub fn suggestions_for(&self, photo_id: &str) -> Result<Vec<Album>, ServiceError> {
        let cached = self.lock_cache()?.get(photo_id).map(<[String]>::to_vec);
        let albums = self.repo.top_level_albums(AlbumFilter::All)?;

        let ids = match cached {
            Some(ids) => {
                tracing::debug!(photo_id, "Suggestion cache hit");
                ids
            }
            None => self.rank(photo_id, &albums)?,
        };

        Ok(resolve(&ids, albums))
    }

    /// Make `album_id` the photo's only album.
    pub fn move_photo(&self, photo_id: &str, album_id: &str) -> Result<(), ServiceError> {
        Ok(self.repo.move_photo_to_album(photo_id, album_id)?)
    }

    fn rank(&self, photo_id: &str, albums: &[Album]) -> Result<Vec<String>, ServiceError> {
        let photo = self
            .repo
            .unsorted_photos()?
            .into_iter()
            .find(|p| p.id == photo_id)
            .ok_or_else(|| ServiceError::PhotoNotFound(photo_id.to_string()))?;

        let ids = self.engine.suggest(&photo, albums)?;

        let mut cache = self.lock_cache()?;
        if let Some(existing) = cache.get(photo_id) {
            // Another request finished first; keep what it stored.
            return Ok(existing.to_vec());
        }
        cache.set(photo_id, ids.clone());
        if let Err(e) = cache.save() {
            tracing::warn!(photo_id, error = %e, "Failed to persist suggestion cache");
        }
        Ok(ids)
    }

    fn lock_cache(&self) -> Result<MutexGuard<'_, SuggestionCache>, ServiceError> {
        self.cache.lock().map_err(|_| ServiceError::Poisoned)
    }
}

/// Albums for the given ids in order, skipping ids that no longer resolve.
fn resolve(ids: &[String], albums: Vec<Album>) -> Vec<Album> {
    let mut by_id: Vec<Option<Album>> = albums.into_iter().map(Some).collect();
    ids.iter()
        .filter_map(|id| {
            by_id
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|a| &a.id == id))
                .and_then(Option::take)
        })
        .take(MAX_SUGGESTIONS)
        .collect()
}
