//! Per-job retry accounting.
//!
//! The counter travels inside the queued job, so each `(submission, system)`
//! lineage keeps its own count and concurrent dispatches never share one.

use std::time::Duration;

use adu_core::RetryPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCounter {
    /// Failed attempts so far in this lineage.
    pub failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

impl RetryCounter {
    /// Count one more failure and decide what happens next.
    ///
    /// With `max_retries = n` the lineage gives up on the n-th failure, so at
    /// most `n` attempts are ever made.
    pub fn record_failure(&mut self, policy: &RetryPolicy) -> RetryDecision {
        self.failures = self.failures.saturating_add(1);
        match policy.max_retries {
            Some(max) if self.failures >= max => RetryDecision::GiveUp,
            _ => RetryDecision::RetryAfter(policy.interval()),
        }
    }
}
