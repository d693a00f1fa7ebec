/// Subset of the Lychee gallery schema the organizer reads, plus the two
/// `_ai_description` columns it owns.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS base_albums (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    is_pinned INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    _ai_description TEXT,
    _ai_description_ts TEXT
);

CREATE TABLE IF NOT EXISTS albums (
    id TEXT PRIMARY KEY REFERENCES base_albums(id),
    parent_id TEXT REFERENCES albums(id)
);

CREATE TABLE IF NOT EXISTS photos (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT '',
    make TEXT,
    model TEXT,
    location TEXT,
    taken_at TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    _ai_description TEXT,
    _ai_description_ts TEXT
);

CREATE TABLE IF NOT EXISTS photo_album (
    album_id TEXT NOT NULL REFERENCES base_albums(id),
    photo_id TEXT NOT NULL REFERENCES photos(id),
    PRIMARY KEY (album_id, photo_id)
);

CREATE TABLE IF NOT EXISTS size_variants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    photo_id TEXT NOT NULL REFERENCES photos(id),
    type INTEGER NOT NULL,
    short_path TEXT NOT NULL,
    width INTEGER NOT NULL DEFAULT 0,
    height INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_photo_album_photo ON photo_album(photo_id);
CREATE INDEX IF NOT EXISTS idx_size_variants_photo ON size_variants(photo_id);
CREATE INDEX IF NOT EXISTS idx_photos_ai_description ON photos(_ai_description);
"#;
