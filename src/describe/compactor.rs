//! Hierarchical reduction of long description lists.
//!
//! Each level splits its input into contiguous batches of at most
//! `batch_size`, compresses every batch with one completion, and feeds the
//! summaries to the next level until the list fits a single prompt.

use std::collections::VecDeque;

use crate::llm::{prompts, GenerateRequest, InferenceClient, InferenceError};

pub const DEFAULT_BATCH_SIZE: usize = 30;

#[derive(Debug, thiserror::Error)]
#[error("compaction failed at level {level}, batch {batch}: {source}")]
pub struct CompactionError {
    pub level: usize,
    pub batch: usize,
    #[source]
    pub source: InferenceError,
}

pub struct Compactor {
    client: InferenceClient,
    model: String,
    batch_size: usize,
}

impl Compactor {
    /// `batch_size` is clamped to at least 2 so every level shrinks.
    pub fn new(client: InferenceClient, model: impl Into<String>, batch_size: usize) -> Self {
        Self {
            client,
            model: model.into(),
            batch_size: batch_size.max(2),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Reduce `descriptions` to at most `batch_size` items, preserving order.
    /// Lists that already fit are returned unchanged without any calls.
    pub fn compact(&self, descriptions: Vec<String>) -> Result<Vec<String>, CompactionError> {
        let mut current = descriptions;
        let mut level = 0;

        while current.len() > self.batch_size {
            level += 1;
            let mut batches: VecDeque<Vec<String>> = VecDeque::new();
            let mut items = current.into_iter().peekable();
            while items.peek().is_some() {
                batches.push_back(items.by_ref().take(self.batch_size).collect());
            }

            tracing::info!(level, batches = batches.len(), "Compacting descriptions");

            let mut next = Vec::with_capacity(batches.len());
            let mut batch_index = 0;
            while let Some(batch) = batches.pop_front() {
                batch_index += 1;
                let request = GenerateRequest::new(&self.model, prompts::batch_compression(&batch));
                let summary = self.client.complete(request).map_err(|source| CompactionError {
                    level,
                    batch: batch_index,
                    source,
                })?;
                tracing::debug!(level, batch = batch_index, items = batch.len(), "Compressed batch");
                next.push(summary);
            }
            current = next;
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, ScriptedBackend};
    use std::sync::Arc;

    fn numbered(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("description {}", i)).collect()
    }

    fn summarising_backend() -> Arc<ScriptedBackend> {
        Arc::new(ScriptedBackend::responding(|request| {
            let items = request.prompt.lines().filter(|l| l.starts_with("- description")).count();
            Ok(format!("summary of {}", items))
        }))
    }

    #[test]
    fn test_small_lists_are_unchanged() {
        let backend = summarising_backend();
        let compactor = Compactor::new(test_support::client(&backend), "m", 30);

        let input = numbered(30);
        assert_eq!(compactor.compact(input.clone()).unwrap(), input);
        assert!(compactor.compact(Vec::new()).unwrap().is_empty());
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn test_single_level_keeps_batch_order() {
        let backend = summarising_backend();
        let compactor = Compactor::new(test_support::client(&backend), "m", 30);

        let out = compactor.compact(numbered(65)).unwrap();
        assert_eq!(out, vec!["summary of 30", "summary of 30", "summary of 5"]);
        assert_eq!(backend.calls(), 3);
        assert!(backend.requests()[2].prompt.contains("- description 61"));
    }

    #[test]
    fn test_multiple_levels_until_fit() {
        for (n, batch_size) in [(10, 2), (31, 3), (100, 7), (901, 30), (2, 2)] {
            let backend = Arc::new(ScriptedBackend::responding(|_| Ok("merged".to_string())));
            let compactor = Compactor::new(test_support::client(&backend), "m", batch_size);

            let out = compactor.compact(numbered(n)).unwrap();
            assert!(out.len() <= batch_size, "n={} b={} -> {}", n, batch_size, out.len());
            if n <= batch_size {
                assert_eq!(out.len(), n);
            }
        }
    }

    #[test]
    fn test_batch_size_is_clamped() {
        let backend = summarising_backend();
        let compactor = Compactor::new(test_support::client(&backend), "m", 1);
        assert_eq!(compactor.batch_size(), 2);
        assert_eq!(compactor.compact(numbered(5)).unwrap().len(), 2);
    }

    #[test]
    fn test_failure_reports_level_and_batch() {
        // Level 1 has 4 batches; the third fails permanently.
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("a".to_string()),
            Ok("b".to_string()),
            Err(InferenceError::Status {
                status: 404,
                body: "model not found".to_string(),
            }),
        ]));
        let compactor = Compactor::new(test_support::client(&backend), "m", 3);

        let err = compactor.compact(numbered(10)).unwrap_err();
        assert_eq!(err.level, 1);
        assert_eq!(err.batch, 3);
        assert_eq!(backend.calls(), 3);
    }
}
