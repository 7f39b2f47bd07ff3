use std::fmt;

/// Result of one batch: how many sends succeeded and how many failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub success: u64,
    pub failure: u64,
}

impl BatchOutcome {
    pub fn attempted(&self) -> u64 {
        self.success + self.failure
    }
}

/// Running and final aggregate of one dispatch run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunTally {
    pub total_success: u64,
    pub total_failure: u64,
    pub batches_completed: u64,
    /// Known up front for materialized sources only.
    pub total_batches: Option<u64>,
    /// The run stopped early on request; remaining recipients were not attempted.
    pub cancelled: bool,
}

impl RunTally {
    pub fn new(total_batches: Option<u64>) -> Self {
        Self {
            total_batches,
            ..Self::default()
        }
    }

    /// Fold one batch outcome into the tally.
    #[must_use]
    pub fn fold(self, outcome: BatchOutcome) -> Self {
        Self {
            total_success: self.total_success + outcome.success,
            total_failure: self.total_failure + outcome.failure,
            batches_completed: self.batches_completed + 1,
            ..self
        }
    }

    pub fn attempted(&self) -> u64 {
        self.total_success + self.total_failure
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            batches_completed: self.batches_completed,
            total_batches: self.total_batches,
            success: self.total_success,
            failure: self.total_failure,
        }
    }
}

/// Point-in-time view of a run, rendered for logs and operator status messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub batches_completed: u64,
    pub total_batches: Option<u64>,
    pub success: u64,
    pub failure: u64,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total_batches {
            Some(total) => write!(
                f,
                "Progress: {}/{total} batches completed.",
                self.batches_completed
            )?,
            None => write!(f, "Progress: {} batches completed.", self.batches_completed)?,
        }
        write!(f, " Success: {}, Failed: {}", self.success, self.failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_accumulates_counts_and_batches() {
        let tally = RunTally::new(Some(3))
            .fold(BatchOutcome {
                success: 8,
                failure: 2,
            })
            .fold(BatchOutcome {
                success: 5,
                failure: 0,
            });

        assert_eq!(tally.total_success, 13);
        assert_eq!(tally.total_failure, 2);
        assert_eq!(tally.batches_completed, 2);
        assert_eq!(tally.attempted(), 15);
        assert_eq!(tally.total_batches, Some(3));
    }

    #[test]
    fn snapshot_renders_with_and_without_total() {
        let tally = RunTally::new(Some(10)).fold(BatchOutcome {
            success: 19,
            failure: 1,
        });
        assert_eq!(
            tally.snapshot().to_string(),
            "Progress: 1/10 batches completed. Success: 19, Failed: 1"
        );

        let streaming = RunTally::new(None).fold(BatchOutcome::default());
        assert_eq!(
            streaming.snapshot().to_string(),
            "Progress: 1 batches completed. Success: 0, Failed: 0"
        );
    }
}
