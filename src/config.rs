use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::describe::DEFAULT_BATCH_SIZE;
use crate::llm::{InferenceOptions, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub gallery: GalleryConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub albums: AlbumsConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("albumsort")
        .join("gallery.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_endpoint")]
    pub endpoint: String,

    /// Vision model used for per-photo descriptions.
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Text model used for compaction, album summaries and ranking.
    #[serde(default = "default_synthesis_model")]
    pub synthesis_model: String,

    #[serde(default)]
    pub context_window: Option<u32>,

    #[serde(default)]
    pub temperature: Option<f64>,

    #[serde(default)]
    pub top_p: Option<f64>,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    /// Per-request timeout. Unset means the request may block indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Maximum number of descriptions summarised in a single prompt.
    #[serde(default = "default_compaction_batch_size")]
    pub compaction_batch_size: usize,

    /// Longest image side sent to the vision model.
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,

    /// Extra model options passed through verbatim.
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

fn default_inference_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_image_model() -> String {
    "llava:13b".to_string()
}

fn default_synthesis_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    1000
}

fn default_compaction_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_image_dimension() -> u32 {
    1024
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_inference_endpoint(),
            image_model: default_image_model(),
            synthesis_model: default_synthesis_model(),
            context_window: None,
            temperature: None,
            top_p: None,
            retry_attempts: default_retry_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            timeout_secs: None,
            compaction_batch_size: default_compaction_batch_size(),
            max_image_dimension: default_max_image_dimension(),
            options: BTreeMap::new(),
        }
    }
}

impl InferenceConfig {
    /// Typed options layered over the passthrough table.
    pub fn model_options(&self) -> InferenceOptions {
        InferenceOptions {
            num_ctx: self.context_window,
            temperature: self.temperature,
            top_p: self.top_p,
            extra: self.options.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_initial_delay_ms),
        )
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryConfig {
    /// Base URL of the gallery serving `uploads/`.
    #[serde(default = "default_gallery_url")]
    pub base_url: String,
}

fn default_gallery_url() -> String {
    "http://localhost:8000".to_string()
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            base_url: default_gallery_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "localhost".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlbumsConfig {
    /// Album ids never described, ranked, or mined for photos.
    #[serde(default)]
    pub blocklist: Vec<String>,

    /// Only consider pinned albums.
    #[serde(default)]
    pub pinned_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("albumsort")
        .join("suggestions.json")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Directory for rolling log files when journald is unavailable.
    /// Logs go to stderr when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            inference: InferenceConfig::default(),
            gallery: GalleryConfig::default(),
            server: ServerConfig::default(),
            albums: AlbumsConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load from the `ALBUMSORT_CONFIG` path or the default location,
    /// writing a default file when none exists yet.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            tracing::info!(path = %config_path.display(), "Wrote default configuration");
            config.validated()
        }
    }

    /// Load from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validated()
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("ALBUMSORT_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("albumsort")
            .join("config.toml")
    }

    fn validated(mut self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&mut self) -> Result<()> {
        let inference = &self.inference;
        if inference.endpoint.trim().is_empty() {
            bail!("inference endpoint is required");
        }
        check_http_url(&inference.endpoint)
            .with_context(|| format!("invalid inference endpoint {}", inference.endpoint))?;
        if inference.image_model.trim().is_empty() {
            bail!("inference image model is required");
        }
        if inference.synthesis_model.trim().is_empty() {
            bail!("inference synthesis model is required");
        }
        if inference.retry_attempts == 0 {
            bail!("inference retry_attempts must be at least 1");
        }
        if inference.compaction_batch_size < 2 {
            bail!("inference compaction_batch_size must be at least 2");
        }
        if inference.max_image_dimension == 0 {
            bail!("inference max_image_dimension must be positive");
        }
        inference
            .model_options()
            .validate()
            .context("invalid inference options")?;

        if self.gallery.base_url.trim().is_empty() {
            bail!("gallery base URL is required");
        }
        check_http_url(&self.gallery.base_url)
            .with_context(|| format!("invalid gallery base URL {}", self.gallery.base_url))?;
        self.gallery.base_url = self.gallery.base_url.trim_end_matches('/').to_string();

        if self.server.port == 0 {
            bail!("server port must be between 1 and 65535");
        }

        Ok(())
    }
}

fn check_http_url(value: &str) -> Result<()> {
    let url = Url::parse(value)?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("unsupported scheme {}", url.scheme());
    }
    if url.host_str().is_none() {
        bail!("missing host");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let mut config = Config::default();
        config.validate().expect("default config validates");
        assert_eq!(config.inference.compaction_batch_size, 30);
        assert_eq!(config.inference.retry_attempts, 3);
    }

    #[test]
    fn test_load_from_toml_with_passthrough_options() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[inference]
endpoint = "http://gpu-box:11434"
image_model = "llava:7b"
synthesis_model = "qwen3:8b"
context_window = 8192
temperature = 0.2

[inference.options]
repeat_penalty = 1.1
seed = 42

[gallery]
base_url = "https://photos.example.org/"

[albums]
blocklist = ["a1", "a2"]
pinned_only = true
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.gallery.base_url, "https://photos.example.org");
        assert_eq!(config.albums.blocklist, vec!["a1", "a2"]);
        assert!(config.albums.pinned_only);

        let options = config.inference.model_options();
        assert_eq!(options.num_ctx, Some(8192));
        assert_eq!(options.temperature, Some(0.2));
        assert_eq!(options.extra.len(), 2);
        assert_eq!(options.extra["seed"], serde_json::json!(42));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut config = Config::default();
        config.inference.synthesis_model = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.inference.compaction_batch_size = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.inference.top_p = Some(1.5);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gallery.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config
            .inference
            .options
            .insert("stop".to_string(), serde_json::json!(["\n"]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(&dir.path().join("absent.toml")).is_err());
    }
}
