//! State sink implementations for Switchyard.
//!
//! A state sink keeps one record per gateway call. `jsonl` is durable,
//! `memory` is for tests and ephemeral sessions, `none` records nothing.

pub mod in_memory;
pub mod jsonl;
pub mod noop;

pub use in_memory::InMemoryStateSink;
pub use jsonl::JsonlStateSink;
pub use noop::NoopStateSink;

use switchyard_core::{CompletionResult, Failure};

/// Apply a failure to a stored record. Returns false when the record
/// already carries exactly this failure, leaving it untouched.
pub(crate) fn apply_failure(record: &mut CompletionResult, failure: &Failure, retry_count: u32) -> bool {
    if record.failure.as_ref() == Some(failure) && record.retry_count == retry_count {
        return false;
    }
    record.retry_count = retry_count;
    record.fail(failure.clone());
    true
}
