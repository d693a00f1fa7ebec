//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::describe::{AlbumDescriber, Compactor, PhotoDescriber};
use crate::images::{FetchError, FetchedImage, ImageFetcher};
use crate::llm::{GenerateBackend, GenerateRequest, InferenceClient, InferenceError, InferenceOptions, RetryPolicy};
use crate::models::{parse_db_timestamp, Album, Photo, SizeVariant, SizeVariantKind};
use crate::repository::{AlbumScope, SqliteRepository};
use crate::tasks::JobRunner;

type Responder = Box<dyn Fn(&GenerateRequest) -> Result<String, InferenceError> + Send + Sync>;

/// Backend that replays queued results, then falls back to a responder.
pub struct ScriptedBackend {
    queue: Mutex<VecDeque<Result<String, InferenceError>>>,
    fallback: Option<Responder>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Result<String, InferenceError>>) -> Self {
        Self {
            queue: Mutex::new(responses.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with the given closure.
    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&GenerateRequest) -> Result<String, InferenceError> + Send + Sync + 'static,
    {
        Self {
            fallback: Some(Box::new(responder)),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl GenerateBackend for ScriptedBackend {
    fn generate(&self, request: &GenerateRequest) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(next) = self.queue.lock().unwrap().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(responder) => responder(request),
            None => Err(InferenceError::Status {
                status: 400,
                body: "script exhausted".to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Client over a backend with no backoff delay.
pub fn client(backend: &Arc<ScriptedBackend>) -> InferenceClient {
    InferenceClient::new(
        backend.clone(),
        RetryPolicy::new(3, Duration::ZERO),
        InferenceOptions::default(),
    )
}

/// Fetcher returning fixed bytes, or failing for listed paths.
pub struct StaticFetcher {
    pub bytes: Vec<u8>,
    pub failing_paths: Vec<String>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            failing_paths: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageFetcher for StaticFetcher {
    fn fetch(&self, variant: &SizeVariant) -> Result<FetchedImage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_paths.contains(&variant.short_path) {
            return Err(FetchError::Status {
                url: variant.short_path.clone(),
                status: 404,
            });
        }
        Ok(FetchedImage {
            bytes: self.bytes.clone(),
            mime_type: "image/jpeg".to_string(),
        })
    }
}

pub fn photo(id: &str, taken_at: Option<&str>, created_at: &str, description: Option<&str>) -> Photo {
    Photo {
        id: id.to_string(),
        title: format!("Photo {}", id),
        media_type: "jpg".to_string(),
        make: None,
        model: None,
        location: None,
        taken_at: taken_at.and_then(parse_db_timestamp),
        created_at: parse_db_timestamp(created_at).expect("valid created_at"),
        ai_description: description.map(str::to_string),
        ai_description_at: None,
    }
}

pub fn album(id: &str, title: &str, description: Option<&str>) -> Album {
    Album {
        id: id.to_string(),
        title: title.to_string(),
        is_pinned: false,
        ai_description: description.map(str::to_string),
        ai_description_at: None,
    }
}

pub fn variant(photo_id: &str, short_path: &str) -> SizeVariant {
    SizeVariant {
        photo_id: photo_id.to_string(),
        kind: SizeVariantKind::Medium,
        short_path: short_path.to_string(),
        width: 1024,
        height: 768,
    }
}

/// In-memory repository with the schema applied and `fixture` executed.
pub fn repository(fixture: &str) -> Arc<SqliteRepository> {
    let repo = SqliteRepository::open_in_memory(AlbumScope::default()).unwrap();
    repo.initialize().unwrap();
    repo.execute_batch(fixture).unwrap();
    Arc::new(repo)
}

/// Job runner with both describers on one scripted backend.
pub fn job_runner(repo: Arc<SqliteRepository>, backend: &Arc<ScriptedBackend>, fetcher: StaticFetcher) -> JobRunner {
    let client = client(backend);
    let photos = PhotoDescriber::new(client.clone(), Arc::new(fetcher), "vision", 1024);
    let albums = AlbumDescriber::new(client.clone(), Compactor::new(client, "text", 30), "text");
    JobRunner::new(repo, photos, albums)
}
