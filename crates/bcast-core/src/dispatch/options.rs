use std::time::Duration;

use crate::{errors::Error, Result};

/// Per-run tuning. Immutable for the duration of one dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Recipients per batch; also the number of concurrent sends.
    pub batch_size: usize,
    /// Pause after every batch except the last.
    pub delay_between_batches: Duration,
    /// Yield to the scheduler after every N completed batches.
    pub yield_every_n_batches: u64,
    pub enable_progress_updates: bool,
    /// Emit a progress snapshot after every N completed batches (and after the last).
    pub progress_every_n_batches: u64,
    /// Upper bound for a single send; `None` waits indefinitely.
    pub attempt_timeout: Option<Duration>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 20,
            delay_between_batches: Duration::from_millis(1000),
            yield_every_n_batches: 5,
            enable_progress_updates: true,
            progress_every_n_batches: 5,
            attempt_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl DispatchOptions {
    /// Tuning used by the admin test broadcast: smaller, faster, quiet.
    pub fn for_test_broadcast() -> Self {
        Self {
            batch_size: 10,
            delay_between_batches: Duration::from_millis(500),
            yield_every_n_batches: 2,
            enable_progress_updates: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be > 0".to_string()));
        }
        if self.yield_every_n_batches == 0 {
            return Err(Error::Config(
                "yield_every_n_batches must be > 0".to_string(),
            ));
        }
        if self.progress_every_n_batches == 0 {
            return Err(Error::Config(
                "progress_every_n_batches must be > 0".to_string(),
            ));
        }
        if self.attempt_timeout == Some(Duration::ZERO) {
            return Err(Error::Config("attempt_timeout must be > 0".to_string()));
        }
        Ok(())
    }
}
