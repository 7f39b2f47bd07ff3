use std::path::Path;

use crate::{
    dispatch::{
        options::DispatchOptions,
        source::{MaterializedSource, RecipientSource, StreamingSource, DEFAULT_BYTES_PER_ID},
    },
    Result,
};

/// Thresholds and tuning for choosing between materialized and streaming runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizingPolicy {
    /// Estimated populations at or above this use the streaming source.
    pub streaming_threshold: u64,
    pub bytes_per_id: u64,
    pub materialized_batch_size: usize,
    pub materialized_yield_every: u64,
    pub streaming_batch_size: usize,
    pub streaming_yield_every: u64,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            streaming_threshold: 50_000,
            bytes_per_id: DEFAULT_BYTES_PER_ID,
            materialized_batch_size: 30,
            materialized_yield_every: 10,
            streaming_batch_size: 20,
            streaming_yield_every: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Strategy {
    pub use_streaming: bool,
    pub batch_size: usize,
    pub yield_every_n_batches: u64,
}

impl Strategy {
    /// Overlay this strategy's tuning on `base`.
    pub fn apply(&self, base: &DispatchOptions) -> DispatchOptions {
        DispatchOptions {
            batch_size: self.batch_size,
            yield_every_n_batches: self.yield_every_n_batches,
            ..base.clone()
        }
    }
}

impl SizingPolicy {
    pub fn choose_strategy(&self, estimate: u64) -> Strategy {
        if estimate < self.streaming_threshold {
            Strategy {
                use_streaming: false,
                batch_size: self.materialized_batch_size,
                yield_every_n_batches: self.materialized_yield_every,
            }
        } else {
            Strategy {
                use_streaming: true,
                batch_size: self.streaming_batch_size,
                yield_every_n_batches: self.streaming_yield_every,
            }
        }
    }

    /// Estimate from the file size alone; never opens the file for reading.
    pub async fn estimate_file(&self, path: &Path) -> Result<u64> {
        let len = tokio::fs::metadata(path).await?.len();
        Ok(len / self.bytes_per_id.max(1))
    }
}

/// Estimated population of any source.
pub async fn estimate_count(source: &dyn RecipientSource) -> Result<u64> {
    match source.exact_len() {
        Some(n) => Ok(n),
        None => source.estimate_count().await,
    }
}

/// A recipient source chosen for a file plus the tuning that goes with it.
pub struct SourcePlan {
    pub source: Box<dyn RecipientSource>,
    pub strategy: Strategy,
    pub estimate: u64,
}

/// Pick a strategy for the recipients file at `path` and build its source.
///
/// Errors (missing file, malformed list for the in-memory path) surface here,
/// before any message is sent.
pub async fn plan_file_source(path: &Path, policy: &SizingPolicy) -> Result<SourcePlan> {
    let estimate = policy.estimate_file(path).await?;
    let strategy = policy.choose_strategy(estimate);

    let source: Box<dyn RecipientSource> = if strategy.use_streaming {
        Box::new(
            StreamingSource::open(path)
                .await?
                .with_bytes_per_id(policy.bytes_per_id),
        )
    } else {
        Box::new(MaterializedSource::from_file(path).await?)
    };

    tracing::info!(
        path = %path.display(),
        estimate,
        streaming = strategy.use_streaming,
        batch_size = strategy.batch_size,
        "planned recipient source"
    );

    Ok(SourcePlan {
        source,
        strategy,
        estimate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::RecipientId, Error};

    #[test]
    fn threshold_boundary() {
        let policy = SizingPolicy::default();

        let below = policy.choose_strategy(49_999);
        assert!(!below.use_streaming);
        assert_eq!(below.batch_size, 30);

        let at = policy.choose_strategy(50_000);
        assert!(at.use_streaming);
        assert_eq!(at.batch_size, 20);
        assert_eq!(at.yield_every_n_batches, 5);

        assert!(policy.choose_strategy(10_000_000).use_streaming);
        assert!(!policy.choose_strategy(0).use_streaming);
    }

    #[test]
    fn strategy_overlays_tuning_only() {
        let base = DispatchOptions::default();
        let opts = SizingPolicy::default().choose_strategy(1).apply(&base);
        assert_eq!(opts.batch_size, 30);
        assert_eq!(opts.yield_every_n_batches, 10);
        assert_eq!(opts.delay_between_batches, base.delay_between_batches);
    }

    #[tokio::test]
    async fn materialized_estimate_is_exact() {
        let src = MaterializedSource::new(vec![RecipientId::from("1"), RecipientId::from("2")]);
        assert_eq!(estimate_count(&src).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn plans_streaming_for_large_files() {
        let path = std::env::temp_dir().join(format!("bcast-plan-{}.json", std::process::id()));
        std::fs::write(&path, r#"["1","2","3","4"]"#).unwrap();

        // 17 bytes / 1 byte per id = 17 >= 10: streaming.
        let policy = SizingPolicy {
            streaming_threshold: 10,
            bytes_per_id: 1,
            ..SizingPolicy::default()
        };
        let mut plan = plan_file_source(&path, &policy).await.unwrap();
        assert!(plan.strategy.use_streaming);
        assert_eq!(plan.estimate, 17);
        assert_eq!(plan.source.next_batch(10).await.unwrap().len(), 4);

        let plan = plan_file_source(&path, &SizingPolicy::default()).await.unwrap();
        assert!(!plan.strategy.use_streaming);
        assert_eq!(plan.source.exact_len(), Some(4));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn plan_fails_on_missing_file() {
        let err = plan_file_source(Path::new("/nonexistent/ids.json"), &SizingPolicy::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Io(_)));
    }
}
