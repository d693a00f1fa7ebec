pub mod client;
pub mod options;
pub mod prompts;
pub mod provider;

pub use client::{strip_think_blocks, GenerateRequest, InferenceClient, InferenceError, ResponseFormat, RetryPolicy};
pub use options::{InferenceOptions, OptionsError};
pub use provider::{GenerateBackend, OllamaBackend};
