//! Storage seam for gallery records and generated descriptions.
//!
//! The pipeline only talks to [`Repository`]; [`SqliteRepository`] is the
//! bundled implementation over a Lychee-shaped schema.

mod schema;
pub mod sqlite;

pub use schema::SCHEMA;
pub use sqlite::SqliteRepository;

use crate::models::{Album, Photo, SizeVariant};

/// Which photos a "describe missing" query may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoPool {
    /// Every undescribed photo outside blocklisted albums.
    All,
    /// Undescribed photos that are unsorted or live in a top-level album.
    UnsortedOrTopLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumFilter {
    All,
    MissingDescription,
}

/// Album selection rules applied to every album query.
#[derive(Debug, Clone, Default)]
pub struct AlbumScope {
    pub blocklist: Vec<String>,
    pub pinned_only: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("photo {0} not found")]
    PhotoNotFound(String),
    #[error("album {0} not found")]
    AlbumNotFound(String),
    #[error("photo {0} already has a description")]
    AlreadyDescribed(String),
    #[error("invalid {column} value {value:?} for {id}")]
    InvalidValue {
        id: String,
        column: &'static str,
        value: String,
    },
    #[error("database connection lock poisoned")]
    Poisoned,
}

/// Everything the pipeline reads from and writes to the gallery.
pub trait Repository: Send + Sync {
    /// Photos without a generated description. Never returns a described photo.
    fn photos_missing_description(&self, pool: PhotoPool) -> Result<Vec<Photo>, RepositoryError>;

    /// Parentless albums after blocklist and pinned filtering.
    fn top_level_albums(&self, filter: AlbumFilter) -> Result<Vec<Album>, RepositoryError>;

    fn photos_in_album(&self, album_id: &str) -> Result<Vec<Photo>, RepositoryError>;

    /// Photos with no album membership.
    fn unsorted_photos(&self) -> Result<Vec<Photo>, RepositoryError>;

    /// Medium rendition if present, else the original.
    fn best_size_variant(&self, photo_id: &str) -> Result<Option<SizeVariant>, RepositoryError>;

    /// Store a photo description. Refuses to replace an existing one.
    fn save_photo_description(&self, photo_id: &str, description: &str) -> Result<(), RepositoryError>;

    /// Store an album description, replacing any previous one.
    fn save_album_description(&self, album_id: &str, description: &str) -> Result<(), RepositoryError>;

    /// Make `album_id` the photo's only album.
    fn move_photo_to_album(&self, photo_id: &str, album_id: &str) -> Result<(), RepositoryError>;
}
