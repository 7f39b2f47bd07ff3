use std::{sync::Arc, time::Duration};

use tokio::task::JoinSet;

use crate::{
    dispatch::report::BatchOutcome,
    domain::RecipientId,
    errors::Error,
    transport::{
        port::{deliver, Transport},
        types::MessagePayload,
    },
    Result,
};

/// Send `payload` to every recipient of `batch` concurrently and count outcomes.
///
/// One task per recipient; the batch size is the concurrency limit. Waits for
/// every attempt to settle. Failed, timed-out and panicked attempts are counted
/// and logged, never returned.
pub async fn process_batch(
    transport: &Arc<dyn Transport>,
    batch: Vec<RecipientId>,
    payload: &Arc<MessagePayload>,
    attempt_timeout: Option<Duration>,
) -> BatchOutcome {
    let mut attempts = JoinSet::new();
    for recipient in batch {
        let transport = Arc::clone(transport);
        let payload = Arc::clone(payload);
        attempts.spawn(async move {
            match attempt(transport.as_ref(), &recipient, &payload, attempt_timeout).await {
                Ok(()) => {
                    tracing::info!(recipient = %recipient, "message sent");
                    true
                }
                Err(e) => {
                    tracing::warn!(recipient = %recipient, "failed to send message: {e}");
                    false
                }
            }
        });
    }

    let mut outcome = BatchOutcome::default();
    while let Some(joined) = attempts.join_next().await {
        match joined {
            Ok(true) => outcome.success += 1,
            Ok(false) => outcome.failure += 1,
            Err(join_err) => {
                tracing::error!("delivery task failed: {join_err}");
                outcome.failure += 1;
            }
        }
    }
    outcome
}

async fn attempt(
    transport: &dyn Transport,
    recipient: &RecipientId,
    payload: &MessagePayload,
    attempt_timeout: Option<Duration>,
) -> Result<()> {
    let send = deliver(transport, recipient, payload);
    let Some(limit) = attempt_timeout else {
        return send.await;
    };
    match tokio::time::timeout(limit, send).await {
        Ok(res) => res,
        Err(_) => Err(Error::Delivery {
            recipient: recipient.to_string(),
            reason: format!("timed out after {}ms", limit.as_millis()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::{ids, FakeTransport};
    use crate::transport::types::MediaRef;

    fn text() -> Arc<MessagePayload> {
        Arc::new(MessagePayload::text("<b>hello</b>"))
    }

    #[tokio::test]
    async fn counts_failures_without_aborting_others() {
        let fake = Arc::new(FakeTransport::failing(&["3", "7"]));
        let transport: Arc<dyn Transport> = fake.clone();

        let outcome = process_batch(&transport, ids(0..10), &text(), None).await;

        assert_eq!(
            outcome,
            BatchOutcome {
                success: 8,
                failure: 2
            }
        );
        let mut attempted = fake.attempted_ids();
        attempted.sort_by_key(|s| s.parse::<u32>().unwrap());
        assert_eq!(
            attempted,
            (0..10).map(|i| i.to_string()).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn panicking_attempt_counts_as_failure() {
        let mut fake = FakeTransport::default();
        fake.panic_on.insert("2".to_string());
        let fake = Arc::new(fake);
        let transport: Arc<dyn Transport> = fake.clone();

        let outcome = process_batch(&transport, ids(0..5), &text(), None).await;
        assert_eq!(outcome.success, 4);
        assert_eq!(outcome.failure, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempt_times_out() {
        let mut fake = FakeTransport::default();
        fake.hang_on.insert("1".to_string());
        let transport: Arc<dyn Transport> = Arc::new(fake);

        let outcome = process_batch(
            &transport,
            ids(0..3),
            &text(),
            Some(Duration::from_secs(5)),
        )
        .await;
        assert_eq!(outcome.success, 2);
        assert_eq!(outcome.failure, 1);
    }

    #[tokio::test]
    async fn photo_payload_uses_photo_send() {
        let fake = Arc::new(FakeTransport::default());
        let transport: Arc<dyn Transport> = fake.clone();
        let payload = Arc::new(MessagePayload::photo(
            MediaRef::FileId("AgACAgIAAxkBAAI".to_string()),
            "caption",
        ));

        let outcome = process_batch(&transport, ids(0..4), &payload, None).await;
        assert_eq!(outcome.success, 4);
        assert!(fake.attempted_kinds().iter().all(|k| *k == "photo"));
    }

    #[tokio::test]
    async fn empty_batch_is_empty_outcome() {
        let transport: Arc<dyn Transport> = Arc::new(FakeTransport::default());
        let outcome = process_batch(&transport, Vec::new(), &text(), None).await;
        assert_eq!(outcome, BatchOutcome::default());
    }
}
