//! Gallery records consumed by the describers and the suggestion engine.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Format used for every date that reaches a prompt or the album date range.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format used for capture times shown to the model.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A photo as stored by the gallery.
#[derive(Debug, Clone, Serialize)]
pub struct Photo {
    pub id: String,
    pub title: String,
    /// Declared media type. Lychee stores either an extension or a MIME type.
    pub media_type: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub location: Option<String>,
    pub taken_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub ai_description: Option<String>,
    pub ai_description_at: Option<NaiveDateTime>,
}

impl Photo {
    /// Capture date, falling back to the upload date.
    pub fn effective_date(&self) -> NaiveDate {
        self.taken_at.unwrap_or(self.created_at).date()
    }

    /// `YYYY-MM-DD` form of [`Photo::effective_date`].
    pub fn effective_date_string(&self) -> String {
        self.effective_date().format(DATE_FORMAT).to_string()
    }

    pub fn is_described(&self) -> bool {
        self.ai_description.is_some()
    }
}

/// A gallery album. Only parentless albums are ever loaded.
#[derive(Debug, Clone, Serialize)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub is_pinned: bool,
    pub ai_description: Option<String>,
    pub ai_description_at: Option<NaiveDateTime>,
}

/// Rendition rank of a size variant, using Lychee's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeVariantKind {
    Original,
    Medium,
    Thumbnail,
}

impl SizeVariantKind {
    pub fn code(self) -> i64 {
        match self {
            SizeVariantKind::Original => 0,
            SizeVariantKind::Medium => 2,
            SizeVariantKind::Thumbnail => 6,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(SizeVariantKind::Original),
            2 => Some(SizeVariantKind::Medium),
            6 => Some(SizeVariantKind::Thumbnail),
            _ => None,
        }
    }

    /// Directory under `uploads/` holding this rendition.
    pub fn upload_dir(self) -> &'static str {
        match self {
            SizeVariantKind::Original => "original",
            SizeVariantKind::Medium => "medium",
            SizeVariantKind::Thumbnail => "thumb",
        }
    }
}

/// One stored rendition of a photo.
#[derive(Debug, Clone, Serialize)]
pub struct SizeVariant {
    pub photo_id: String,
    pub kind: SizeVariantKind,
    pub short_path: String,
    pub width: u32,
    pub height: u32,
}

/// Parse a timestamp as stored in the gallery database.
/// Accepts `YYYY-MM-DD HH:MM:SS`, the ISO `T` separator and bare dates.
pub fn parse_db_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(value: &str) -> NaiveDateTime {
        parse_db_timestamp(value).expect("valid timestamp")
    }

    #[test]
    fn test_effective_date_prefers_taken_at() {
        let mut photo = Photo {
            id: "p1".to_string(),
            title: "Beach".to_string(),
            media_type: "image/jpeg".to_string(),
            make: None,
            model: None,
            location: None,
            taken_at: Some(at("2024-01-15 10:30:00")),
            created_at: at("2024-03-01 08:00:00"),
            ai_description: None,
            ai_description_at: None,
        };
        assert_eq!(photo.effective_date_string(), "2024-01-15");

        photo.taken_at = None;
        assert_eq!(photo.effective_date_string(), "2024-03-01");
    }

    #[test]
    fn test_parse_db_timestamp_formats() {
        assert!(parse_db_timestamp("2024-01-15 10:30:00").is_some());
        assert!(parse_db_timestamp("2024-01-15T10:30:00").is_some());
        assert!(parse_db_timestamp("2024-01-15 10:30:00.123").is_some());
        assert_eq!(
            parse_db_timestamp("2024-01-15").map(|d| d.format(DATETIME_FORMAT).to_string()),
            Some("2024-01-15 00:00:00".to_string())
        );
        assert!(parse_db_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_size_variant_codes() {
        for kind in [
            SizeVariantKind::Original,
            SizeVariantKind::Medium,
            SizeVariantKind::Thumbnail,
        ] {
            assert_eq!(SizeVariantKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(SizeVariantKind::from_code(3), None);
    }
}
