//! Album suggestions for unsorted photos.

pub mod cache;
pub mod engine;
pub mod service;

pub use cache::{CacheError, SuggestionCache};
pub use engine::{filter_suggestions, SuggestError, SuggestionEngine, MAX_SUGGESTIONS};
pub use service::{ServiceError, SuggestionService};
