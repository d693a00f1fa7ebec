//! SQLite implementation of [`Repository`].

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{AlbumFilter, AlbumScope, PhotoPool, Repository, RepositoryError, SCHEMA};
use crate::models::{parse_db_timestamp, Album, Photo, SizeVariant, SizeVariantKind};

const PHOTO_COLUMNS: &str = "p.id, p.title, p.type, p.make, p.model, p.location, \
                             p.taken_at, p.created_at, p._ai_description, p._ai_description_ts";

const PHOTO_ORDER: &str = "ORDER BY p.taken_at DESC, p.created_at DESC";

/// Matches albums without a parent, including base albums that have no
/// `albums` row at all (tag albums).
const TOP_LEVEL: &str = "(a.parent_id IS NULL OR a.id IS NULL)";

pub struct SqliteRepository {
    conn: Mutex<Connection>,
    scope: AlbumScope,
}

impl SqliteRepository {
    pub fn open(path: &Path, scope: AlbumScope) -> Result<Self, RepositoryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "Could not create database directory");
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn: Mutex::new(conn),
            scope,
        })
    }

    pub fn open_in_memory(scope: AlbumScope) -> Result<Self, RepositoryError> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            scope,
        })
    }

    /// Create any missing tables. Existing gallery tables are left untouched.
    pub fn initialize(&self) -> Result<(), RepositoryError> {
        self.lock()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<(), RepositoryError> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn.lock().map_err(|_| RepositoryError::Poisoned)
    }

    /// `AND <column> NOT IN (?, ...)` for the blocklist, or an empty string.
    fn blocklist_condition(&self, column: &str) -> String {
        if self.scope.blocklist.is_empty() {
            return String::new();
        }
        let placeholders = vec!["?"; self.scope.blocklist.len()].join(", ");
        format!(" AND {} NOT IN ({})", column, placeholders)
    }

    /// Excludes photos that belong to any blocklisted album.
    fn blocked_photo_condition(&self) -> String {
        if self.scope.blocklist.is_empty() {
            return String::new();
        }
        let placeholders = vec!["?"; self.scope.blocklist.len()].join(", ");
        format!(
            " AND p.id NOT IN (SELECT photo_id FROM photo_album WHERE album_id IN ({}))",
            placeholders
        )
    }

    fn query_photos(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Photo>, RepositoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, PhotoRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(PhotoRow::into_photo).collect()
    }
}

impl Repository for SqliteRepository {
    fn photos_missing_description(&self, pool: PhotoPool) -> Result<Vec<Photo>, RepositoryError> {
        let blocklist = &self.scope.blocklist;
        match pool {
            PhotoPool::All => {
                let sql = format!(
                    "SELECT {} FROM photos p WHERE p._ai_description IS NULL{} {}",
                    PHOTO_COLUMNS,
                    self.blocked_photo_condition(),
                    PHOTO_ORDER
                );
                self.query_photos(&sql, params_from_iter(blocklist.iter()))
            }
            PhotoPool::UnsortedOrTopLevel => {
                let sql = format!(
                    r#"
                    SELECT {}
                    FROM photos p
                    WHERE p._ai_description IS NULL AND (
                        p.id NOT IN (SELECT photo_id FROM photo_album)
                        OR p.id IN (
                            SELECT pa.photo_id FROM photo_album pa
                            JOIN base_albums ba ON pa.album_id = ba.id
                            LEFT JOIN albums a ON ba.id = a.id
                            WHERE {}{}
                        )
                    ){}
                    {}
                    "#,
                    PHOTO_COLUMNS,
                    TOP_LEVEL,
                    self.blocklist_condition("ba.id"),
                    self.blocked_photo_condition(),
                    PHOTO_ORDER
                );
                self.query_photos(&sql, params_from_iter(blocklist.iter().chain(blocklist.iter())))
            }
        }
    }

    fn top_level_albums(&self, filter: AlbumFilter) -> Result<Vec<Album>, RepositoryError> {
        let missing = match filter {
            AlbumFilter::All => "",
            AlbumFilter::MissingDescription => " AND ba._ai_description IS NULL",
        };
        let pinned = if self.scope.pinned_only {
            " AND ba.is_pinned = 1"
        } else {
            ""
        };
        let sql = format!(
            r#"
            SELECT ba.id, ba.title, ba.is_pinned, ba._ai_description, ba._ai_description_ts
            FROM base_albums ba
            LEFT JOIN albums a ON ba.id = a.id
            WHERE {}{}{}{}
            ORDER BY ba.title
            "#,
            TOP_LEVEL,
            missing,
            self.blocklist_condition("ba.id"),
            pinned
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let albums = stmt
            .query_map(params_from_iter(self.scope.blocklist.iter()), |row| {
                let described_at: Option<String> = row.get(4)?;
                Ok(Album {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    is_pinned: row.get::<_, Option<bool>>(2)?.unwrap_or(false),
                    ai_description: row.get(3)?,
                    ai_description_at: described_at.as_deref().and_then(parse_db_timestamp),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(albums)
    }

    fn photos_in_album(&self, album_id: &str) -> Result<Vec<Photo>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM photos p JOIN photo_album pa ON p.id = pa.photo_id \
             WHERE pa.album_id = ? {}",
            PHOTO_COLUMNS, PHOTO_ORDER
        );
        self.query_photos(&sql, [album_id])
    }

    fn unsorted_photos(&self) -> Result<Vec<Photo>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM photos p WHERE p.id NOT IN (SELECT photo_id FROM photo_album) {}",
            PHOTO_COLUMNS, PHOTO_ORDER
        );
        self.query_photos(&sql, params![])
    }

    fn best_size_variant(&self, photo_id: &str) -> Result<Option<SizeVariant>, RepositoryError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                r#"
                SELECT photo_id, type, short_path, width, height
                FROM size_variants
                WHERE photo_id = ?1 AND type IN (?2, ?3)
                ORDER BY CASE type WHEN ?2 THEN 0 ELSE 1 END
                LIMIT 1
                "#,
                params![
                    photo_id,
                    SizeVariantKind::Medium.code(),
                    SizeVariantKind::Original.code()
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((photo_id, code, short_path, width, height)) = row else {
            return Ok(None);
        };
        let kind = SizeVariantKind::from_code(code).ok_or_else(|| RepositoryError::InvalidValue {
            id: photo_id.clone(),
            column: "size_variants.type",
            value: code.to_string(),
        })?;
        Ok(Some(SizeVariant {
            photo_id,
            kind,
            short_path,
            width: width.and_then(|w| u32::try_from(w).ok()).unwrap_or(0),
            height: height.and_then(|h| u32::try_from(h).ok()).unwrap_or(0),
        }))
    }

    fn save_photo_description(&self, photo_id: &str, description: &str) -> Result<(), RepositoryError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            r#"
            UPDATE photos
            SET _ai_description = ?, _ai_description_ts = CURRENT_TIMESTAMP
            WHERE id = ? AND _ai_description IS NULL
            "#,
            params![description, photo_id],
        )?;
        if updated == 1 {
            return Ok(());
        }

        let exists = conn
            .query_row("SELECT 1 FROM photos WHERE id = ?", [photo_id], |_| Ok(()))
            .optional()?
            .is_some();
        if exists {
            Err(RepositoryError::AlreadyDescribed(photo_id.to_string()))
        } else {
            Err(RepositoryError::PhotoNotFound(photo_id.to_string()))
        }
    }

    fn save_album_description(&self, album_id: &str, description: &str) -> Result<(), RepositoryError> {
        let updated = self.lock()?.execute(
            r#"
            UPDATE base_albums
            SET _ai_description = ?, _ai_description_ts = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
            params![description, album_id],
        )?;
        tracing::debug!(album_id, updated, chars = description.len(), "Saved album description");
        if updated == 0 {
            return Err(RepositoryError::AlbumNotFound(album_id.to_string()));
        }
        Ok(())
    }

    fn move_photo_to_album(&self, photo_id: &str, album_id: &str) -> Result<(), RepositoryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let photo_exists = tx
            .query_row("SELECT 1 FROM photos WHERE id = ?", [photo_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !photo_exists {
            return Err(RepositoryError::PhotoNotFound(photo_id.to_string()));
        }
        let album_exists = tx
            .query_row("SELECT 1 FROM base_albums WHERE id = ?", [album_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !album_exists {
            return Err(RepositoryError::AlbumNotFound(album_id.to_string()));
        }

        tx.execute("DELETE FROM photo_album WHERE photo_id = ?", [photo_id])?;
        tx.execute(
            "INSERT INTO photo_album (album_id, photo_id) VALUES (?, ?)",
            params![album_id, photo_id],
        )?;
        tx.commit()?;

        tracing::info!(photo_id, album_id, "Moved photo to album");
        Ok(())
    }
}

/// Raw column values, converted after the statement finishes.
struct PhotoRow {
    id: String,
    title: Option<String>,
    media_type: Option<String>,
    make: Option<String>,
    model: Option<String>,
    location: Option<String>,
    taken_at: Option<String>,
    created_at: Option<String>,
    ai_description: Option<String>,
    ai_description_at: Option<String>,
}

impl PhotoRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            media_type: row.get(2)?,
            make: row.get(3)?,
            model: row.get(4)?,
            location: row.get(5)?,
            taken_at: row.get(6)?,
            created_at: row.get(7)?,
            ai_description: row.get(8)?,
            ai_description_at: row.get(9)?,
        })
    }

    fn into_photo(self) -> Result<Photo, RepositoryError> {
        let raw_created = self.created_at.unwrap_or_default();
        let created_at = parse_db_timestamp(&raw_created).ok_or_else(|| RepositoryError::InvalidValue {
            id: self.id.clone(),
            column: "photos.created_at",
            value: raw_created.clone(),
        })?;

        Ok(Photo {
            title: self.title.unwrap_or_default(),
            media_type: self.media_type.unwrap_or_default(),
            make: self.make,
            model: self.model,
            location: self.location,
            taken_at: self.taken_at.as_deref().and_then(parse_db_timestamp),
            created_at,
            ai_description: self.ai_description,
            ai_description_at: self.ai_description_at.as_deref().and_then(parse_db_timestamp),
            id: self.id,
        })
    }
}
