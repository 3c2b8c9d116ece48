use serde::{Deserialize, Serialize};

/// Per-unit result of a checkpointed stage.
///
/// `Done` and `FailedTerminal` are committed to the stage's checkpoint and
/// never revisited. `FailedRetryable` is reported but left out of the
/// checkpoint, so the next run picks the unit up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    Done,
    FailedTerminal,
    FailedRetryable,
}

impl UnitOutcome {
    pub fn is_committed(self) -> bool {
        !matches!(self, UnitOutcome::FailedRetryable)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTally {
    pub done: usize,
    pub failed_terminal: usize,
    pub failed_retryable: usize,
}

impl OutcomeTally {
    pub fn record(&mut self, outcome: UnitOutcome) {
        self.record_n(outcome, 1);
    }

    pub fn record_n(&mut self, outcome: UnitOutcome, n: usize) {
        match outcome {
            UnitOutcome::Done => self.done += n,
            UnitOutcome::FailedTerminal => self.failed_terminal += n,
            UnitOutcome::FailedRetryable => self.failed_retryable += n,
        }
    }

    pub fn total(&self) -> usize {
        self.done + self.failed_terminal + self.failed_retryable
    }

    pub fn committed(&self) -> usize {
        self.done + self.failed_terminal
    }
}
