//! State sink trait: durable record of completion attempts.
//!
//! The gateway creates one record per call before the first network attempt,
//! updates it once the call finishes, and marks it failed when the call
//! ends in an error. Storage technology is the implementation's business.

use async_trait::async_trait;

use crate::error::{Failure, SinkError};
use crate::result::CompletionResult;

#[async_trait]
pub trait StateSink: Send + Sync {
    /// A short name for this sink (e.g., "memory", "jsonl").
    fn name(&self) -> &str;

    /// Persist a new record and return its generated identifier.
    async fn create(&self, result: &CompletionResult) -> std::result::Result<String, SinkError>;

    /// Replace the stored record with the current state of `result`.
    async fn update(
        &self,
        id: &str,
        result: &CompletionResult,
    ) -> std::result::Result<(), SinkError>;

    /// Record a terminal failure. Calling this twice with the same
    /// arguments leaves the record unchanged.
    async fn mark_failed(
        &self,
        id: &str,
        failure: &Failure,
        retry_count: u32,
    ) -> std::result::Result<(), SinkError>;

    /// Fetch a stored record.
    async fn get(&self, id: &str) -> std::result::Result<Option<CompletionResult>, SinkError>;
}
