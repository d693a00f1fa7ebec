//! On-disk memo of album suggestions, keyed by photo id.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to read suggestion cache {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse suggestion cache {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write suggestion cache {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode suggestion cache: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    photo_id: String,
    suggestions: Vec<String>,
}

/// Not synchronised; wrap it in a `Mutex` to share it.
#[derive(Debug)]
pub struct SuggestionCache {
    path: PathBuf,
    entries: HashMap<String, Vec<String>>,
}

impl SuggestionCache {
    /// Read the cache file. A missing file yields an empty cache.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => {
                let list: Vec<CacheEntry> =
                    serde_json::from_str(&content).map_err(|source| CacheError::Parse {
                        path: path.to_path_buf(),
                        source,
                    })?;
                list.into_iter().map(|e| (e.photo_id, e.suggestions)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(CacheError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Loaded suggestion cache");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn get(&self, photo_id: &str) -> Option<&[String]> {
        self.entries.get(photo_id).map(Vec::as_slice)
    }

    pub fn set(&mut self, photo_id: &str, suggestions: Vec<String>) {
        self.entries.insert(photo_id.to_string(), suggestions);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite the whole file.
    pub fn save(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        let list: Vec<CacheEntry> = self
            .entries
            .iter()
            .map(|(photo_id, suggestions)| CacheEntry {
                photo_id: photo_id.clone(),
                suggestions: suggestions.clone(),
            })
            .collect();
        let content = serde_json::to_string_pretty(&list)?;

        std::fs::write(&self.path, content).map_err(|source| CacheError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
