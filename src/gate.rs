use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Final state of a background operation, as recorded in a [`CompletionCell`].
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement<T> {
    Succeeded(T),
    Failed(String),
}

/// What a bounded wait observed before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The cell settled within the allotted ticks.
    Settled,
    /// The schedule ran out first. The operation may still settle later.
    Pending,
}

/// Fixed-interval polling schedule for [`await_completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollSchedule {
    fn default() -> Self {
        PollSchedule {
            interval: Duration::from_millis(1000),
            max_polls: 5,
        }
    }
}

/// Write-once outcome slot shared between one in-flight operation and the
/// caller waiting on it. The first settlement wins, later ones are ignored.
#[derive(Debug)]
pub struct CompletionCell<T> {
    slot: Mutex<Option<Settlement<T>>>,
}

impl<T> Default for CompletionCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CompletionCell<T> {
    pub fn new() -> Self {
        CompletionCell {
            slot: Mutex::new(None),
        }
    }

    /// Records the outcome. Returns false if the cell was already settled,
    /// in which case the new outcome is discarded.
    pub fn settle(&self, outcome: Settlement<T>) -> bool {
        let mut slot = self.lock();
        if slot.is_some() {
            debug!("completion cell already settled, ignoring late outcome");
            return false;
        }
        *slot = Some(outcome);
        true
    }

    pub fn succeed(&self, value: T) -> bool {
        self.settle(Settlement::Succeeded(value))
    }

    pub fn fail(&self, error: impl Into<String>) -> bool {
        self.settle(Settlement::Failed(error.into()))
    }

    pub fn is_settled(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Settlement<T>>> {
        // the slot is write-once, a panicked writer cannot leave it half-written
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> CompletionCell<T> {
    /// Copy of the recorded outcome, if any.
    pub fn snapshot(&self) -> Option<Settlement<T>> {
        self.lock().clone()
    }
}

/// Waits for `cell` to settle, checking once per schedule interval.
///
/// Returns [`PollOutcome::Settled`] on the first tick that observes a settled
/// cell, or immediately without sleeping when the cell is already settled.
/// Returns [`PollOutcome::Pending`] once `max_polls` ticks have passed, so the
/// total wait never exceeds `interval * max_polls`. Giving up does not cancel
/// the underlying operation and this function itself never fails.
pub async fn await_completion<T>(cell: &CompletionCell<T>, schedule: PollSchedule) -> PollOutcome {
    if cell.is_settled() {
        debug!("cell already settled, no polling needed");
        return PollOutcome::Settled;
    }

    for tick in 1..=schedule.max_polls {
        tokio::time::sleep(schedule.interval).await;
        if cell.is_settled() {
            debug!(tick, "cell settled");
            return PollOutcome::Settled;
        }
        debug!(tick, max_polls = schedule.max_polls, "cell not settled yet");
    }

    warn!(
        max_polls = schedule.max_polls,
        interval_ms = schedule.interval.as_millis() as u64,
        "gave up waiting for completion"
    );
    PollOutcome::Pending
}
