//! Prompt templates. Every prompt is bounded: callers hand in at most one
//! compaction batch worth of descriptions.

use crate::models::{Album, Photo, DATETIME_FORMAT};

const UNKNOWN: &str = "Unknown";

fn or_unknown(value: Option<&str>) -> &str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or(UNKNOWN)
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Vision prompt for a single photo.
pub fn photo_description(photo: &Photo) -> String {
    let taken_at = photo
        .taken_at
        .map(|t| t.format(DATETIME_FORMAT).to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    format!(
        "Analyze this photo and describe it in at most 2 sentences. Cover:\n\
         - The subject matter and composition\n\
         - The photographic style and anything distinctive about it\n\
         - The overall mood and atmosphere\n\n\
         Photo details:\n\
         - Title: {}\n\
         - Taken at: {}\n\
         - Camera: {} {}\n\
         - Location: {}\n\n\
         Reply with the description only.",
        photo.title,
        taken_at,
        or_unknown(photo.make.as_deref()),
        or_unknown(photo.model.as_deref()),
        or_unknown(photo.location.as_deref()),
    )
}

/// Merge one batch of descriptions into a single summary.
pub fn batch_compression(descriptions: &[String]) -> String {
    format!(
        "Merge the following photo descriptions into one summary of the whole group.\n\n\
         Photo descriptions:\n{}\n\n\
         The summary should:\n\
         - Name the subjects, themes and visual elements the photos share\n\
         - Capture the overall mood and style\n\
         - Mention the main activities or events shown\n\
         - Note recurring compositional or photographic patterns\n\n\
         Use 2 to 4 sentences and focus on what ties the photos together.\n\n\
         Reply with the summary only.",
        bullet_list(descriptions)
    )
}

/// Album summary over (possibly compacted) descriptions and the date span.
pub fn album_summary(descriptions: &[String], first_date: &str, last_date: &str) -> String {
    format!(
        "These descriptions come from the photos of one album:\n\n{}\n\n\
         Date range: {} to {}\n\n\
         Write a cohesive summary of the collection that brings together its common \
         themes, subjects and mood.\n\n\
         Use at most 2 sentences.\n\n\
         Reply with the summary only.",
        bullet_list(descriptions),
        first_date,
        last_date
    )
}

/// Ranking prompt asking for `{"album_ids": [...]}`.
/// Only albums that carry a description are listed.
pub fn album_ranking(photo_description: &str, photo_date: &str, albums: &[&Album]) -> String {
    let listing = albums
        .iter()
        .filter_map(|album| {
            album
                .ai_description
                .as_deref()
                .map(|desc| format!("Album ID {}: \"{}\": {}", album.id, album.title, desc.trim()))
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "A photo is described as:\n{}\n\n\
         Photo date: {}\n\n\
         Available albums:\n{}\n\n\
         Pick the 3 albums this photo fits best. Weigh:\n\
         - Thematic similarity (subject matter, kind of content)\n\
         - Contextual relevance (setting, event, activity)\n\
         - Supporting clues (album title against photo subject, album dates against photo date)\n\n\
         Respond with JSON in exactly this shape:\n\
         {{\n  \"album_ids\": [\"AlbumID1\", \"AlbumID2\", \"AlbumID3\"]\n}}\n\n\
         Rules:\n\
         - Only use Album IDs from the list above\n\
         - Order the ids from best to worst match\n\
         - \"album_ids\" must be an array of strings\n\
         - Output the JSON object and nothing else",
        photo_description.trim(),
        photo_date,
        listing
    )
}
