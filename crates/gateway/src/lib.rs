//! Chat gateway for Switchyard.
//!
//! Validates completion requests, picks the vendor adapter, records each
//! attempt through a state sink and runs it under a bounded retry policy.
//! Streamed responses go through the [`StreamAccumulator`].

pub mod chat;
pub mod retry;
pub mod streaming;

#[cfg(test)]
pub(crate) mod testing;

pub use chat::ChatGateway;
pub use retry::{RetryOutcome, RetryPolicy};
pub use streaming::{DeltaCallback, StreamAccumulator};
