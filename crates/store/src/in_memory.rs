//! In-memory state sink: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::sync::Arc;
use switchyard_core::error::{Failure, SinkError};
use switchyard_core::{CompletionResult, StateSink};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::apply_failure;

/// A state sink that keeps records in a Vec, in creation order.
#[derive(Clone, Default)]
pub struct InMemoryStateSink {
    records: Arc<RwLock<Vec<CompletionResult>>>,
}

impl InMemoryStateSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record.
    pub async fn records(&self) -> Vec<CompletionResult> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StateSink for InMemoryStateSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(&self, result: &CompletionResult) -> Result<String, SinkError> {
        let id = Uuid::new_v4().to_string();
        let mut record = result.clone();
        record.id = id.clone();
        self.records.write().await.push(record);
        Ok(id)
    }

    async fn update(&self, id: &str, result: &CompletionResult) -> Result<(), SinkError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| SinkError::NotFound(id.to_string()))?;
        *record = result.clone();
        record.id = id.to_string();
        Ok(())
    }

    async fn mark_failed(&self, id: &str, failure: &Failure, retry_count: u32) -> Result<(), SinkError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| SinkError::NotFound(id.to_string()))?;
        apply_failure(record, failure, retry_count);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CompletionResult>, SinkError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{FailureKind, ProviderKind, ResponseFormat};

    fn result() -> CompletionResult {
        CompletionResult::new(ProviderKind::Google, "gemini-2.0-flash", ResponseFormat::Text, false)
    }

    #[tokio::test]
    async fn create_assigns_id() {
        let sink = InMemoryStateSink::new();
        assert!(sink.is_empty().await);
        let id = sink.create(&result()).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(sink.get(&id).await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn update_replaces_record() {
        let sink = InMemoryStateSink::new();
        let id = sink.create(&result()).await.unwrap();
        let mut r = result();
        r.raw_response = "done".into();
        sink.update(&id, &r).await.unwrap();

        let stored = sink.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.raw_response, "done");
        assert_eq!(stored.id, id);
        assert_eq!(sink.len().await, 1);
    }

    #[tokio::test]
    async fn update_unknown_id_fails() {
        let sink = InMemoryStateSink::new();
        let err = sink.update("missing", &result()).await.unwrap_err();
        assert!(matches!(err, SinkError::NotFound(_)));
    }

    #[tokio::test]
    async fn mark_failed_is_idempotent() {
        let sink = InMemoryStateSink::new();
        let id = sink.create(&result()).await.unwrap();
        let failure = Failure::new(FailureKind::Timeout, "timed out");

        sink.mark_failed(&id, &failure, 2).await.unwrap();
        let first = sink.get(&id).await.unwrap().unwrap();
        sink.mark_failed(&id, &failure, 2).await.unwrap();
        let second = sink.get(&id).await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(second.retry_count, 2);
        assert_eq!(second.failure.unwrap().kind, FailureKind::Timeout);
    }
}
