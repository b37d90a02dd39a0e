//! Per-batch processing reports.

/// Coarse result of processing one notification batch.
///
/// Every record in a batch is counted exactly once. The consumer maps this
/// to a commit-or-redeliver decision: a batch with retryable failures is
/// left uncommitted so the event system delivers it again, which is safe
/// because both handlers are idempotent per record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Records processed to completion.
    pub ok: usize,
    /// Records that failed on a transient collaborator error.
    pub retryable_failures: usize,
    /// Records that failed in a way redelivery cannot fix.
    pub fatal_failures: usize,
}

impl BatchReport {
    pub fn record_ok(&mut self) {
        self.ok += 1;
    }

    pub fn record_failure(&mut self, retryable: bool) {
        if retryable {
            self.retryable_failures += 1;
        } else {
            self.fatal_failures += 1;
        }
    }

    pub fn merge(&mut self, other: &BatchReport) {
        self.ok += other.ok;
        self.retryable_failures += other.retryable_failures;
        self.fatal_failures += other.fatal_failures;
    }

    /// Whether every record in the batch completed.
    pub fn is_clean(&self) -> bool {
        self.retryable_failures == 0 && self.fatal_failures == 0
    }

    /// Whether the batch should be delivered again.
    pub fn should_redeliver(&self) -> bool {
        self.retryable_failures > 0
    }

    pub fn total(&self) -> usize {
        self.ok + self.retryable_failures + self.fatal_failures
    }
}
