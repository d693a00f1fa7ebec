use serde::Deserialize;

use crate::llm::{prompts, GenerateRequest, InferenceClient, InferenceError};
use crate::models::{Album, Photo};

/// Most suggestions returned for one photo.
pub const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SuggestError {
    #[error("photo {0} has no description yet")]
    PhotoNotDescribed(String),
    #[error("no described albums to choose from")]
    NoAlbums,
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("could not parse album ranking: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Deserialize)]
struct Ranking {
    album_ids: Vec<serde_json::Value>,
}

pub struct SuggestionEngine {
    client: InferenceClient,
    model: String,
}

impl SuggestionEngine {
    pub fn new(client: InferenceClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Rank the described albums for a described photo, best first.
    pub fn suggest(&self, photo: &Photo, albums: &[Album]) -> Result<Vec<String>, SuggestError> {
        let description = photo
            .ai_description
            .as_deref()
            .ok_or_else(|| SuggestError::PhotoNotDescribed(photo.id.clone()))?;

        let candidates: Vec<&Album> = albums.iter().filter(|a| a.ai_description.is_some()).collect();
        if candidates.is_empty() {
            return Err(SuggestError::NoAlbums);
        }

        let prompt = prompts::album_ranking(description, &photo.effective_date_string(), &candidates);
        let answer = self
            .client
            .complete(GenerateRequest::new(&self.model, prompt).json())?;

        let ranked = parse_ranking(&answer)?;
        let suggestions = filter_suggestions(ranked, &candidates);
        tracing::info!(
            photo_id = %photo.id,
            candidates = candidates.len(),
            suggestions = suggestions.len(),
            "Ranked albums for photo"
        );
        Ok(suggestions)
    }
}

/// Album ids from the model answer, tolerating a markdown code fence.
fn parse_ranking(answer: &str) -> Result<Vec<String>, SuggestError> {
    let json = strip_code_fence(answer);
    let ranking: Ranking =
        serde_json::from_str(json).map_err(|e| SuggestError::MalformedResponse(e.to_string()))?;

    Ok(ranking
        .album_ids
        .into_iter()
        .filter_map(|id| match id {
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```") {
        if let Some(start) = trimmed.find('\n') {
            let body = &trimmed[start + 1..];
            if let Some(end) = body.rfind("```") {
                return body[..end].trim();
            }
        }
    }
    trimmed
}

/// Keep ids that name an offered album, first occurrence only, at most
/// [`MAX_SUGGESTIONS`].
pub fn filter_suggestions(ranked: Vec<String>, albums: &[&Album]) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(MAX_SUGGESTIONS);
    for id in ranked {
        if kept.len() == MAX_SUGGESTIONS {
            break;
        }
        if albums.iter().any(|a| a.id == id) && !kept.contains(&id) {
            kept.push(id);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, album, photo, ScriptedBackend};
    use crate::llm::ResponseFormat;
    use std::sync::Arc;

    fn albums() -> Vec<Album> {
        vec![
            album("a1", "Alps", Some("Mountains in winter.")),
            album("a2", "Beach", Some("Summer by the sea.")),
            album("a3", "City", Some("Streets at night.")),
            album("a4", "Forest", Some("Hikes under trees.")),
            album("a5", "Unsorted dump", None),
        ]
    }

    fn described_photo() -> Photo {
        photo("p1", Some("2023-02-01 10:00:00"), "2023-02-02 10:00:00", Some("A ski lift."))
    }

    #[test]
    fn test_filter_keeps_known_ids_in_order() {
        let albums = albums();
        let offered: Vec<&Album> = albums.iter().collect();
        let ranked = ["a3", "zz", "a1", "a3", "a2", "a4"].iter().map(|s| s.to_string()).collect();

        assert_eq!(filter_suggestions(ranked, &offered), vec!["a3", "a1", "a2"]);
        assert!(filter_suggestions(vec!["nope".to_string()], &offered).is_empty());
    }

    #[test]
    fn test_filter_never_exceeds_limit_or_album_set() {
        let albums = albums();
        let offered: Vec<&Album> = albums.iter().take(2).collect();
        for ranked in [
            vec!["a1", "a2", "a3", "a4"],
            vec!["a4", "a3", "a2"],
            vec![],
            vec!["a2", "a2", "a2", "a1"],
        ] {
            let out = filter_suggestions(ranked.into_iter().map(String::from).collect(), &offered);
            assert!(out.len() <= MAX_SUGGESTIONS);
            assert!(out.iter().all(|id| id == "a1" || id == "a2"));
        }
    }

    #[test]
    fn test_suggest_sends_json_request_over_described_albums() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(
            "```json\n{\"album_ids\": [\"a1\", \"a5\", \"a4\", \"a2\"]}\n```".to_string(),
        )]));
        let engine = SuggestionEngine::new(test_support::client(&backend), "llama3.1:8b");

        let ids = engine.suggest(&described_photo(), &albums()).unwrap();
        assert_eq!(ids, vec!["a1", "a4", "a2"]);

        let request = &backend.requests()[0];
        assert_eq!(request.format, Some(ResponseFormat::Json));
        assert!(request.prompt.contains("Photo date: 2023-02-01"));
        assert!(!request.prompt.contains("Album ID a5"));
    }

    #[test]
    fn test_numeric_ids_are_accepted() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("{\"album_ids\": [7, \"a2\"]}".to_string())]));
        let engine = SuggestionEngine::new(test_support::client(&backend), "m");

        let mut albums = albums();
        albums.push(album("7", "Seven", Some("Numbered.")));
        assert_eq!(engine.suggest(&described_photo(), &albums).unwrap(), vec!["7", "a2"]);
    }

    #[test]
    fn test_malformed_answer_is_an_error() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("I think a1 fits best.".to_string())]));
        let engine = SuggestionEngine::new(test_support::client(&backend), "m");
        assert!(matches!(
            engine.suggest(&described_photo(), &albums()),
            Err(SuggestError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_preconditions() {
        let backend = Arc::new(ScriptedBackend::new(Vec::new()));
        let engine = SuggestionEngine::new(test_support::client(&backend), "m");

        let bare = photo("p9", None, "2023-02-02 10:00:00", None);
        assert!(matches!(
            engine.suggest(&bare, &albums()),
            Err(SuggestError::PhotoNotDescribed(id)) if id == "p9"
        ));
        assert!(matches!(
            engine.suggest(&described_photo(), &[album("a5", "Bare", None)]),
            Err(SuggestError::NoAlbums)
        ));
        assert_eq!(backend.calls(), 0);
    }
}
