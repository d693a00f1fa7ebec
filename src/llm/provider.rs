use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::client::{GenerateRequest, InferenceError};
use super::options::InferenceOptions;

/// A single request/response exchange with an inference service.
/// Implementations do not retry; [`super::InferenceClient`] does.
pub trait GenerateBackend: Send + Sync {
    /// Run one completion and return the raw concatenated text.
    fn generate(&self, request: &GenerateRequest) -> Result<String, InferenceError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

// ============================================================================
// Ollama backend
// ============================================================================

pub struct OllamaBackend {
    endpoint: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    #[serde(skip_serializing_if = "InferenceOptions::is_empty")]
    options: &'a InferenceOptions,
}

#[derive(Debug, Deserialize)]
struct OllamaFragment {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaBackend {
    pub fn new(endpoint: &str, timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            agent: builder.build(),
        }
    }

    fn wire_request<'a>(request: &'a GenerateRequest) -> OllamaRequest<'a> {
        OllamaRequest {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            images: request.images.iter().map(|bytes| BASE64.encode(bytes)).collect(),
            format: request.format.map(|f| f.as_str()),
            options: &request.options,
        }
    }
}

impl GenerateBackend for OllamaBackend {
    fn generate(&self, request: &GenerateRequest) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.endpoint);
        let body = Self::wire_request(request);

        tracing::debug!(
            model = %request.model,
            prompt_chars = request.prompt.len(),
            images = request.images.len(),
            "Sending generate request"
        );

        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(&body)
            .map_err(|e| match e {
                ureq::Error::Status(status, response) => InferenceError::Status {
                    status,
                    body: response.into_string().unwrap_or_default(),
                },
                ureq::Error::Transport(transport) => InferenceError::Transport(transport.to_string()),
            })?;

        let text = response
            .into_string()
            .map_err(|e| InferenceError::Transport(format!("failed to read response body: {}", e)))?;

        concat_fragments(&text)
    }

    fn name(&self) -> &'static str {
        "Ollama"
    }
}

/// Join the `response` field of every JSON fragment in a body, stopping at
/// the fragment marked `done`. A non-streaming reply is a single fragment.
fn concat_fragments(body: &str) -> Result<String, InferenceError> {
    let mut text = String::new();
    let mut fragments = 0;

    for fragment in serde_json::Deserializer::from_str(body).into_iter::<OllamaFragment>() {
        let fragment = fragment.map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;
        if let Some(error) = fragment.error {
            return Err(InferenceError::MalformedResponse(error));
        }
        fragments += 1;
        text.push_str(&fragment.response);
        if fragment.done {
            break;
        }
    }

    if fragments == 0 {
        return Err(InferenceError::EmptyResponse);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_fragment() {
        let body = r#"{"model":"llava","response":"A red bicycle.","done":true}"#;
        assert_eq!(concat_fragments(body).unwrap(), "A red bicycle.");
    }

    #[test]
    fn test_streamed_fragments_stop_at_done() {
        let body = concat!(
            "{\"response\":\"A red \",\"done\":false}\n",
            "{\"response\":\"bicycle.\",\"done\":true}\n",
            "{\"response\":\" ignored\",\"done\":false}\n",
        );
        assert_eq!(concat_fragments(body).unwrap(), "A red bicycle.");
    }

    #[test]
    fn test_empty_and_broken_bodies() {
        assert!(matches!(concat_fragments(""), Err(InferenceError::EmptyResponse)));
        assert!(matches!(
            concat_fragments("{\"response\": \"trunc"),
            Err(InferenceError::MalformedResponse(_))
        ));
        assert!(matches!(
            concat_fragments(r#"{"error":"out of memory"}"#),
            Err(InferenceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_wire_request_shape() {
        let mut request = GenerateRequest::new("qwen3", "rank these").json();
        request.options.num_ctx = Some(4096);
        let wire = serde_json::to_value(OllamaBackend::wire_request(&request)).unwrap();
        assert_eq!(
            wire,
            json!({
                "model": "qwen3",
                "prompt": "rank these",
                "stream": false,
                "format": "json",
                "options": {"num_ctx": 4096}
            })
        );

        let request = GenerateRequest::new("llava", "describe").with_image(vec![1, 2, 3]);
        let wire = serde_json::to_value(OllamaBackend::wire_request(&request)).unwrap();
        assert_eq!(wire["images"], json!(["AQID"]));
        assert!(wire.get("options").is_none());
        assert!(wire.get("format").is_none());
    }
}
