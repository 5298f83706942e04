//! No-op state sink: hands out identifiers but records nothing.

use async_trait::async_trait;
use switchyard_core::error::{Failure, SinkError};
use switchyard_core::{CompletionResult, StateSink};
use uuid::Uuid;

/// A state sink that stores nothing.
pub struct NoopStateSink;

#[async_trait]
impl StateSink for NoopStateSink {
    fn name(&self) -> &str {
        "none"
    }

    async fn create(&self, _result: &CompletionResult) -> Result<String, SinkError> {
        Ok(Uuid::new_v4().to_string())
    }

    async fn update(&self, _id: &str, _result: &CompletionResult) -> Result<(), SinkError> {
        Ok(())
    }

    async fn mark_failed(
        &self,
        _id: &str,
        _failure: &Failure,
        _retry_count: u32,
    ) -> Result<(), SinkError> {
        Ok(())
    }

    async fn get(&self, _id: &str) -> Result<Option<CompletionResult>, SinkError> {
        Ok(None)
    }
}
