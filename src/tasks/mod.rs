//! Batch description jobs and the events they report.
//!
//! A job runs on its own thread and reports through an `mpsc` channel of
//! [`JobEvent`]s: progress before every item, then exactly one terminal
//! `complete` or `error` event.

pub mod manager;
pub mod runner;

use serde::{Deserialize, Serialize};

pub use manager::{JobController, Reporter};
pub use runner::JobRunner;

use crate::repository::RepositoryError;

/// Batch jobs a client can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Rescan,
    DescribePhotos,
    DescribeAllAlbums,
    RetryAlbumFailures,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Rescan,
        JobKind::DescribePhotos,
        JobKind::DescribeAllAlbums,
        JobKind::RetryAlbumFailures,
    ];

    /// Command name on the progress channel.
    pub fn command(&self) -> &'static str {
        match self {
            JobKind::Rescan => "start_rescan",
            JobKind::DescribePhotos => "describe_photos",
            JobKind::DescribeAllAlbums => "describe_all_albums",
            JobKind::RetryAlbumFailures => "retry_album_failures",
        }
    }

    pub fn from_command(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.command() == name)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            JobKind::Rescan => "Rescan",
            JobKind::DescribePhotos => "Describe photos",
            JobKind::DescribeAllAlbums => "Describe all albums",
            JobKind::RetryAlbumFailures => "Retry album failures",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Photos,
    Albums,
}

/// Sent before each item; `current` counts from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub stage: Stage,
    pub current: usize,
    pub total: usize,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub photo_errors: Vec<String>,
    pub album_errors: Vec<String>,
    pub total_errors: usize,
}

impl ErrorSummary {
    pub fn new(photo_errors: Vec<String>, album_errors: Vec<String>) -> Self {
        let total_errors = photo_errors.len() + album_errors.len();
        Self {
            photo_errors,
            album_errors,
            total_errors,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub message: String,
    pub errors: ErrorSummary,
    pub photos_described: usize,
    pub albums_described: usize,
    pub skipped: usize,
}

impl CompletionReport {
    /// Report for a job that found nothing to do.
    pub fn nothing_to_do(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Outbound message on the progress channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum JobEvent {
    Progress(ProgressUpdate),
    Complete(CompletionReport),
    Error { error: String },
}

impl JobEvent {
    pub fn error(message: impl Into<String>) -> Self {
        JobEvent::Error {
            error: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress(_))
    }
}

/// Lifecycle of the most recent job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running {
        stage: Stage,
        current: usize,
        total: usize,
    },
    Complete,
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("a job is already running")]
    AlreadyRunning,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("malformed command: {0}")]
    MalformedCommand(String),
    #[error("Failed to get {what}: {source}")]
    Enumerate {
        what: &'static str,
        #[source]
        source: RepositoryError,
    },
    #[error("failed to start job thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct CommandEnvelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Parse an inbound `{"type": "<command>"}` frame.
pub fn parse_command(text: &str) -> Result<JobKind, JobError> {
    let envelope: CommandEnvelope =
        serde_json::from_str(text).map_err(|e| JobError::MalformedCommand(e.to_string()))?;
    JobKind::from_command(&envelope.kind).ok_or(JobError::UnknownCommand(envelope.kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_commands() {
        for kind in JobKind::ALL {
            let frame = json!({ "type": kind.command() }).to_string();
            assert_eq!(parse_command(&frame).unwrap(), kind);
        }
        assert!(matches!(
            parse_command(r#"{"type": "reboot"}"#),
            Err(JobError::UnknownCommand(name)) if name == "reboot"
        ));
        assert!(matches!(parse_command("describe_photos"), Err(JobError::MalformedCommand(_))));
        assert!(matches!(parse_command(r#"{"kind": "x"}"#), Err(JobError::MalformedCommand(_))));
    }

    #[test]
    fn test_event_wire_format() {
        let progress = JobEvent::Progress(ProgressUpdate {
            stage: Stage::Albums,
            current: 2,
            total: 5,
            description: "Describing album: Alps".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&progress).unwrap(),
            json!({
                "type": "progress",
                "payload": {"stage": "albums", "current": 2, "total": 5, "description": "Describing album: Alps"}
            })
        );

        let complete = JobEvent::Complete(CompletionReport {
            message: "Described 1 photos".to_string(),
            errors: ErrorSummary::new(vec!["Photo p2 (Dunes): boom".to_string()], Vec::new()),
            photos_described: 1,
            albums_described: 0,
            skipped: 0,
        });
        assert_eq!(
            serde_json::to_value(&complete).unwrap(),
            json!({
                "type": "complete",
                "payload": {
                    "message": "Described 1 photos",
                    "errors": {"photo_errors": ["Photo p2 (Dunes): boom"], "album_errors": [], "total_errors": 1},
                    "photos_described": 1,
                    "albums_described": 0,
                    "skipped": 0
                }
            })
        );

        assert_eq!(
            serde_json::to_value(JobEvent::error("a job is already running")).unwrap(),
            json!({"type": "error", "payload": {"error": "a job is already running"}})
        );
    }
}
