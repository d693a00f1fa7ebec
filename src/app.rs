//! Wires every component together from a [`Config`].

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::describe::{AlbumDescriber, Compactor, PhotoDescriber};
use crate::images::HttpImageFetcher;
use crate::llm::{InferenceClient, OllamaBackend};
use crate::repository::{AlbumScope, SqliteRepository};
use crate::suggest::{SuggestionCache, SuggestionEngine, SuggestionService};
use crate::tasks::{JobController, JobRunner};

pub struct App {
    pub config: Config,
    pub jobs: Arc<JobController>,
    pub suggestions: Arc<SuggestionService>,
}

impl App {
    /// Build the application. Fails if the database cannot be opened or the
    /// suggestion cache cannot be read.
    pub fn new(config: Config) -> Result<Self> {
        let inference = &config.inference;

        let backend = OllamaBackend::new(&inference.endpoint, inference.timeout());
        let client = InferenceClient::new(
            Arc::new(backend),
            inference.retry_policy(),
            inference.model_options(),
        );
        tracing::info!(
            backend = client.backend_name(),
            endpoint = %inference.endpoint,
            image_model = %inference.image_model,
            synthesis_model = %inference.synthesis_model,
            "Inference client ready"
        );

        let scope = AlbumScope {
            blocklist: config.albums.blocklist.clone(),
            pinned_only: config.albums.pinned_only,
        };
        let repo = SqliteRepository::open(&config.database.path, scope)
            .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
        repo.initialize().context("Failed to initialize database schema")?;
        let repo = Arc::new(repo);

        let fetcher = HttpImageFetcher::new(&config.gallery.base_url, inference.timeout());
        let photos = PhotoDescriber::new(
            client.clone(),
            Arc::new(fetcher),
            &inference.image_model,
            inference.max_image_dimension,
        );
        let compactor = Compactor::new(
            client.clone(),
            &inference.synthesis_model,
            inference.compaction_batch_size,
        );
        let albums = AlbumDescriber::new(client.clone(), compactor, &inference.synthesis_model);
        let runner = JobRunner::new(repo.clone(), photos, albums);

        let cache = SuggestionCache::load(&config.cache.path)
            .with_context(|| format!("Failed to load suggestion cache {}", config.cache.path.display()))?;
        tracing::info!(entries = cache.len(), "Suggestion cache loaded");
        let engine = SuggestionEngine::new(client, &inference.synthesis_model);
        let suggestions = SuggestionService::new(repo, engine, cache);

        Ok(Self {
            jobs: Arc::new(JobController::new(Arc::new(runner))),
            suggestions: Arc::new(suggestions),
            config,
        })
    }
}
