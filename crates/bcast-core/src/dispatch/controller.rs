use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    dispatch::{
        batch::process_batch,
        options::DispatchOptions,
        report::{ProgressSnapshot, RunTally},
        source::RecipientSource,
    },
    transport::{port::Transport, types::MessagePayload},
    Result,
};

/// Hook called every `yield_every_n_batches` batches so long runs leave room
/// for other tasks on the runtime.
#[async_trait]
pub trait YieldHook: Send + Sync {
    async fn yield_now(&self);
}

/// Default hook: does nothing.
pub struct NoYield;

#[async_trait]
impl YieldHook for NoYield {
    async fn yield_now(&self) {}
}

/// Hand the worker back to tokio once.
pub struct TokioYield;

#[async_trait]
impl YieldHook for TokioYield {
    async fn yield_now(&self) {
        tokio::task::yield_now().await;
    }
}

/// Receives progress snapshots (e.g. to edit an operator's status message).
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn on_progress(&self, snapshot: ProgressSnapshot);
}

pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn on_progress(&self, _snapshot: ProgressSnapshot) {}
}

/// Per-run collaborators that are not part of the dispatcher itself.
#[derive(Clone)]
pub struct RunHooks {
    pub progress: Arc<dyn ProgressSink>,
    /// Checked between batches and during the inter-batch delay.
    pub cancel: CancellationToken,
}

impl Default for RunHooks {
    fn default() -> Self {
        Self {
            progress: Arc::new(NoopProgress),
            cancel: CancellationToken::new(),
        }
    }
}

/// Bulk dispatcher: draws batches from a source, fans each batch out to the
/// transport, paces batches, and returns the run tally.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    yield_hook: Arc<dyn YieldHook>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            yield_hook: Arc::new(NoYield),
        }
    }

    pub fn with_yield_hook(mut self, hook: Arc<dyn YieldHook>) -> Self {
        self.yield_hook = hook;
        self
    }

    pub async fn dispatch(
        &self,
        payload: MessagePayload,
        source: &mut dyn RecipientSource,
        options: &DispatchOptions,
    ) -> Result<RunTally> {
        self.dispatch_with(payload, source, options, &RunHooks::default())
            .await
    }

    /// Run one broadcast to completion (or cancellation).
    ///
    /// Fails before sending anything if `options` are invalid or the first
    /// draw from `source` fails. Individual delivery failures only show up in
    /// the returned tally.
    pub async fn dispatch_with(
        &self,
        payload: MessagePayload,
        source: &mut dyn RecipientSource,
        options: &DispatchOptions,
        hooks: &RunHooks,
    ) -> Result<RunTally> {
        options.validate()?;

        let batch_size = options.batch_size;
        let total_batches = source
            .exact_len()
            .map(|n| n.div_ceil(batch_size as u64));
        let mut tally = RunTally::new(total_batches);
        let payload = Arc::new(payload);

        tracing::info!(
            kind = payload.kind(),
            recipients = ?source.exact_len(),
            batch_size,
            "starting broadcast"
        );

        let mut batch = source.next_batch(batch_size).await?;
        while !batch.is_empty() {
            if hooks.cancel.is_cancelled() {
                tally.cancelled = true;
                break;
            }

            let batch_number = tally.batches_completed + 1;
            match total_batches {
                Some(total) => tracing::info!(
                    "processing batch {batch_number}/{total} ({} recipients)",
                    batch.len()
                ),
                None => tracing::info!(
                    "processing batch {batch_number} ({} recipients)",
                    batch.len()
                ),
            }

            let outcome =
                process_batch(&self.transport, batch, &payload, options.attempt_timeout).await;
            tally = tally.fold(outcome);

            if tally.batches_completed % options.yield_every_n_batches == 0 {
                self.yield_hook.yield_now().await;
            }

            // Draw ahead so the last batch is known before pacing.
            let next = match source.next_batch(batch_size).await {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(
                        success = tally.total_success,
                        failed = tally.total_failure,
                        "recipient source failed after {} batches: {e}",
                        tally.batches_completed
                    );
                    return Err(e);
                }
            };
            let is_final = next.is_empty();

            if options.enable_progress_updates
                && (is_final || tally.batches_completed % options.progress_every_n_batches == 0)
            {
                let snapshot = tally.snapshot();
                tracing::info!("{snapshot}");
                hooks.progress.on_progress(snapshot).await;
            }

            if !is_final && !options.delay_between_batches.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(options.delay_between_batches) => {}
                    _ = hooks.cancel.cancelled() => {
                        tally.cancelled = true;
                        break;
                    }
                }
            }

            batch = next;
        }

        if tally.cancelled {
            tracing::warn!(
                success = tally.total_success,
                failed = tally.total_failure,
                "broadcast cancelled after {} batches",
                tally.batches_completed
            );
        } else {
            tracing::info!(
                "broadcast completed. Successfully sent: {}, Failed: {}",
                tally.total_success,
                tally.total_failure
            );
        }

        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicU64, Ordering},
            Mutex,
        },
        time::Duration,
    };

    use tokio::time::Instant;

    use super::*;
    use crate::{
        dispatch::{
            source::{MaterializedSource, StreamingSource},
            testing::{ids, FakeTransport},
        },
        domain::RecipientId,
        Error,
    };

    /// Records the size of every batch handed out by the wrapped source.
    struct RecordingSource {
        inner: MaterializedSource,
        sizes: Vec<usize>,
    }

    #[async_trait]
    impl RecipientSource for RecordingSource {
        async fn next_batch(&mut self, max: usize) -> Result<Vec<RecipientId>> {
            let b = self.inner.next_batch(max).await?;
            if !b.is_empty() {
                self.sizes.push(b.len());
            }
            Ok(b)
        }

        async fn estimate_count(&self) -> Result<u64> {
            self.inner.estimate_count().await
        }

        fn exact_len(&self) -> Option<u64> {
            self.inner.exact_len()
        }
    }

    #[derive(Default)]
    struct CountingYield(AtomicU64);

    #[async_trait]
    impl YieldHook for CountingYield {
        async fn yield_now(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CollectingProgress(Mutex<Vec<ProgressSnapshot>>);

    #[async_trait]
    impl ProgressSink for CollectingProgress {
        async fn on_progress(&self, snapshot: ProgressSnapshot) {
            self.0.lock().unwrap().push(snapshot);
        }
    }

    /// Cancels the run as soon as the first snapshot arrives.
    struct CancelOnProgress(CancellationToken);

    #[async_trait]
    impl ProgressSink for CancelOnProgress {
        async fn on_progress(&self, _snapshot: ProgressSnapshot) {
            self.0.cancel();
        }
    }

    fn quick(batch_size: usize) -> DispatchOptions {
        DispatchOptions {
            batch_size,
            delay_between_batches: Duration::ZERO,
            yield_every_n_batches: 1,
            enable_progress_updates: true,
            progress_every_n_batches: 5,
            attempt_timeout: None,
        }
    }

    #[tokio::test]
    async fn conserves_counts_and_batch_shape() {
        for n in [0usize, 1, 19, 20, 21, 45, 100] {
            for b in [1usize, 3, 20, 64] {
                let fake = Arc::new(FakeTransport::failing(&["0", "7", "14", "63"]));
                let dispatcher = Dispatcher::new(fake.clone());
                let mut src = RecordingSource {
                    inner: MaterializedSource::new(ids(0..n)),
                    sizes: Vec::new(),
                };

                let tally = dispatcher
                    .dispatch(MessagePayload::text("hi"), &mut src, &quick(b))
                    .await
                    .unwrap();

                assert_eq!(tally.attempted(), n as u64, "n={n} b={b}");
                assert_eq!(fake.attempted_ids().len(), n);
                let expected_batches = n.div_ceil(b);
                assert_eq!(tally.batches_completed, expected_batches as u64);
                assert_eq!(tally.total_batches, Some(expected_batches as u64));
                assert_eq!(src.sizes.len(), expected_batches);
                if n > 0 {
                    let last = if n % b == 0 { b } else { n % b };
                    assert_eq!(*src.sizes.last().unwrap(), last, "n={n} b={b}");
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn forty_five_recipients_in_three_batches_with_two_delays() {
        let fake = Arc::new(FakeTransport::default());
        let yields = Arc::new(CountingYield::default());
        let dispatcher = Dispatcher::new(fake.clone()).with_yield_hook(yields.clone());
        let mut src = RecordingSource {
            inner: MaterializedSource::new(ids(0..45)),
            sizes: Vec::new(),
        };
        let options = DispatchOptions {
            batch_size: 20,
            delay_between_batches: Duration::from_millis(1000),
            yield_every_n_batches: 2,
            attempt_timeout: None,
            ..DispatchOptions::default()
        };

        let start = Instant::now();
        let tally = dispatcher
            .dispatch(MessagePayload::text("hi"), &mut src, &options)
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(src.sizes, vec![20, 20, 5]);
        assert_eq!(tally.total_success, 45);
        assert_eq!(tally.batches_completed, 3);
        assert!(elapsed >= Duration::from_millis(2000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3000), "{elapsed:?}");
        assert_eq!(yields.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_source_sends_nothing_and_never_sleeps() {
        let fake = Arc::new(FakeTransport::default());
        let dispatcher = Dispatcher::new(fake.clone());
        let mut src = MaterializedSource::new(Vec::new());

        let start = Instant::now();
        let tally = dispatcher
            .dispatch(
                MessagePayload::text("hi"),
                &mut src,
                &DispatchOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(tally, RunTally::new(Some(0)));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(fake.attempted_ids().is_empty());
    }

    #[tokio::test]
    async fn progress_every_n_and_on_final_batch() {
        let fake = Arc::new(FakeTransport::failing(&["3"]));
        let dispatcher = Dispatcher::new(fake);
        let progress = Arc::new(CollectingProgress::default());
        let hooks = RunHooks {
            progress: progress.clone(),
            cancel: CancellationToken::new(),
        };
        let mut src = MaterializedSource::new(ids(0..12));
        let options = DispatchOptions {
            progress_every_n_batches: 2,
            ..quick(2)
        };

        let tally = dispatcher
            .dispatch_with(MessagePayload::text("hi"), &mut src, &options, &hooks)
            .await
            .unwrap();
        assert_eq!(tally.batches_completed, 6);

        let seen: Vec<u64> = progress
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.batches_completed)
            .collect();
        assert_eq!(seen, vec![2, 4, 6]);

        let last = *progress.0.lock().unwrap().last().unwrap();
        assert_eq!(last.success, 11);
        assert_eq!(last.failure, 1);
    }

    #[tokio::test]
    async fn final_batch_reports_even_off_cadence() {
        let dispatcher = Dispatcher::new(Arc::new(FakeTransport::default()));
        let progress = Arc::new(CollectingProgress::default());
        let hooks = RunHooks {
            progress: progress.clone(),
            cancel: CancellationToken::new(),
        };
        let mut src = MaterializedSource::new(ids(0..7));

        dispatcher
            .dispatch_with(MessagePayload::text("hi"), &mut src, &quick(3), &hooks)
            .await
            .unwrap();

        let seen: Vec<u64> = progress
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.batches_completed)
            .collect();
        assert_eq!(seen, vec![3]);
    }

    #[tokio::test]
    async fn disabled_progress_emits_nothing() {
        let dispatcher = Dispatcher::new(Arc::new(FakeTransport::default()));
        let progress = Arc::new(CollectingProgress::default());
        let hooks = RunHooks {
            progress: progress.clone(),
            cancel: CancellationToken::new(),
        };
        let mut src = MaterializedSource::new(ids(0..30));
        let options = DispatchOptions {
            enable_progress_updates: false,
            progress_every_n_batches: 1,
            ..quick(5)
        };

        dispatcher
            .dispatch_with(MessagePayload::text("hi"), &mut src, &options, &hooks)
            .await
            .unwrap();
        assert!(progress.0.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_between_batches() {
        let fake = Arc::new(FakeTransport::default());
        let dispatcher = Dispatcher::new(fake.clone());
        let cancel = CancellationToken::new();
        let hooks = RunHooks {
            progress: Arc::new(CancelOnProgress(cancel.clone())),
            cancel,
        };
        let mut src = MaterializedSource::new(ids(0..100));
        let options = DispatchOptions {
            batch_size: 10,
            progress_every_n_batches: 1,
            attempt_timeout: None,
            ..DispatchOptions::default()
        };

        let tally = dispatcher
            .dispatch_with(MessagePayload::text("hi"), &mut src, &options, &hooks)
            .await
            .unwrap();

        assert!(tally.cancelled);
        assert_eq!(tally.batches_completed, 1);
        assert_eq!(tally.attempted(), 10);
        assert_eq!(fake.attempted_ids().len(), 10);
    }

    #[tokio::test]
    async fn invalid_options_fail_before_any_send() {
        let fake = Arc::new(FakeTransport::default());
        let dispatcher = Dispatcher::new(fake.clone());
        let mut src = MaterializedSource::new(ids(0..5));

        let err = dispatcher
            .dispatch(MessagePayload::text("hi"), &mut src, &quick(0))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
        assert!(fake.attempted_ids().is_empty());
        assert_eq!(src.next_batch(10).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn malformed_stream_fails_before_any_send() {
        let path = std::env::temp_dir().join(format!("bcast-ctl-bad-{}.json", std::process::id()));
        std::fs::write(&path, "not a list").unwrap();

        let fake = Arc::new(FakeTransport::default());
        let dispatcher = Dispatcher::new(fake.clone());
        let mut src = StreamingSource::open(&path).await.unwrap();

        let err = dispatcher
            .dispatch(MessagePayload::text("hi"), &mut src, &quick(10))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::RecipientList { .. }));
        assert!(fake.attempted_ids().is_empty());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn streams_large_file_with_unknown_total() {
        let path = std::env::temp_dir().join(format!("bcast-ctl-big-{}.json", std::process::id()));
        let body = (0..1_000)
            .map(|i| format!("\"{}\"", 5_000_000 + i))
            .collect::<Vec<_>>()
            .join(",\n");
        std::fs::write(&path, format!("[\n{body}\n]\n")).unwrap();

        let fake = Arc::new(FakeTransport::failing(&["5000010", "5000999"]));
        let dispatcher = Dispatcher::new(fake.clone());
        let mut src = StreamingSource::open(&path).await.unwrap().with_chunk_size(100);

        let tally = dispatcher
            .dispatch(MessagePayload::text("hi"), &mut src, &quick(64))
            .await
            .unwrap();

        assert_eq!(tally.total_batches, None);
        assert_eq!(tally.batches_completed, 16);
        assert_eq!(tally.total_success, 998);
        assert_eq!(tally.total_failure, 2);
        assert_eq!(fake.attempted_ids().len(), 1_000);

        let _ = std::fs::remove_file(&path);
    }
}
