use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::options::InferenceOptions;
use super::provider::GenerateBackend;

/// Structured output mode requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
}

impl ResponseFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseFormat::Json => "json",
        }
    }
}

/// One completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    /// Raw image bytes; the backend handles wire encoding.
    pub images: Vec<Vec<u8>>,
    pub format: Option<ResponseFormat>,
    pub options: InferenceOptions,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            images: Vec::new(),
            format: None,
            options: InferenceOptions::default(),
        }
    }

    pub fn with_image(mut self, bytes: Vec<u8>) -> Self {
        self.images.push(bytes);
        self
    }

    pub fn json(mut self) -> Self {
        self.format = Some(ResponseFormat::Json);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("inference transport error: {0}")]
    Transport(String),
    #[error("inference service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed inference response: {0}")]
    MalformedResponse(String),
    #[error("inference service returned no response fragments")]
    EmptyResponse,
    #[error("inference failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<InferenceError>,
    },
}

impl InferenceError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            InferenceError::Transport(_)
            | InferenceError::MalformedResponse(_)
            | InferenceError::EmptyResponse => true,
            InferenceError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            InferenceError::RetriesExhausted { .. } => false,
        }
    }
}

/// Number of attempts and the doubling delay between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Delay after the given failed attempt (1-based): 1x, 2x, 4x ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Shared entry point for every completion the pipeline makes.
///
/// Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct InferenceClient {
    backend: Arc<dyn GenerateBackend>,
    retry: RetryPolicy,
    options: InferenceOptions,
}

impl InferenceClient {
    pub fn new(backend: Arc<dyn GenerateBackend>, retry: RetryPolicy, options: InferenceOptions) -> Self {
        Self {
            backend,
            retry,
            options,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Run one completion with the configured options injected, retrying
    /// transient failures. Returns the cleaned, trimmed text.
    pub fn complete(&self, mut request: GenerateRequest) -> Result<String, InferenceError> {
        request.options = self.options.clone();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.backend.generate(&request) {
                Ok(text) => {
                    if attempt > 1 {
                        tracing::info!(model = %request.model, attempt, "Inference succeeded after retry");
                    }
                    return Ok(strip_think_blocks(&text));
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        model = %request.model,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Inference attempt failed, retrying"
                    );
                    std::thread::sleep(delay);
                }
                Err(e) if e.is_transient() => {
                    return Err(InferenceError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn think_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\s*<think>.*?</think>\s*").expect("valid think pattern"))
}

fn think_tail_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\s*<think>.*$").expect("valid think tail pattern"))
}

/// Remove `<think>` reasoning blocks, including an unterminated trailing one.
/// Best effort: stray fragments that do not match are left alone.
pub fn strip_think_blocks(text: &str) -> String {
    let without_blocks = think_block_pattern().replace_all(text, " ");
    let without_tail = think_tail_pattern().replace(&without_blocks, "");
    without_tail.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedBackend;

    #[test]
    fn test_strip_think_blocks() {
        assert_eq!(strip_think_blocks("  Hello <think>ignore</think> World  "), "Hello World");
        assert_eq!(
            strip_think_blocks("<think>\nplan\nsteps\n</think>\n\nA sunny beach."),
            "A sunny beach."
        );
        assert_eq!(strip_think_blocks("Answer <think>never closed\nmore"), "Answer");
        assert_eq!(strip_think_blocks("plain text"), "plain text");
        assert_eq!(
            strip_think_blocks("a<think>1</think>b<think>2</think>c"),
            "a b c"
        );
    }

    #[test]
    fn test_retry_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_retries_transient_failures_then_succeeds() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(InferenceError::Transport("connection refused".to_string())),
            Err(InferenceError::Status {
                status: 503,
                body: "loading model".to_string(),
            }),
            Ok("  Hello <think>ignore</think> World  ".to_string()),
        ]));
        let client = InferenceClient::new(
            backend.clone(),
            RetryPolicy::new(3, Duration::ZERO),
            InferenceOptions::default(),
        );

        let text = client.complete(GenerateRequest::new("m", "p")).unwrap();
        assert_eq!(text, "Hello World");
        assert_eq!(backend.calls(), 3);
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(InferenceError::EmptyResponse),
            Err(InferenceError::EmptyResponse),
            Err(InferenceError::EmptyResponse),
            Ok("never reached".to_string()),
        ]));
        let client = InferenceClient::new(
            backend.clone(),
            RetryPolicy::new(3, Duration::ZERO),
            InferenceOptions::default(),
        );

        let err = client.complete(GenerateRequest::new("m", "p")).unwrap_err();
        assert!(matches!(err, InferenceError::RetriesExhausted { attempts: 3, .. }));
        assert!(!err.is_transient());
        assert_eq!(backend.calls(), 3);
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(InferenceError::Status {
            status: 404,
            body: "model not found".to_string(),
        })]));
        let client = InferenceClient::new(
            backend.clone(),
            RetryPolicy::new(3, Duration::ZERO),
            InferenceOptions::default(),
        );

        let err = client.complete(GenerateRequest::new("m", "p")).unwrap_err();
        assert!(matches!(err, InferenceError::Status { status: 404, .. }));
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_configured_options_are_injected() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("ok".to_string())]));
        let options = InferenceOptions {
            num_ctx: Some(8192),
            ..Default::default()
        };
        let client = InferenceClient::new(backend.clone(), RetryPolicy::default(), options.clone());

        client
            .complete(GenerateRequest::new("m", "p").json())
            .unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].options, options);
        assert_eq!(requests[0].format, Some(ResponseFormat::Json));
    }
}
