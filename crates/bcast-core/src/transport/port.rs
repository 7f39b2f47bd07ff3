use async_trait::async_trait;

use crate::{
    domain::RecipientId,
    transport::types::{MediaRef, MessagePayload},
    Result,
};

/// Cross-messenger delivery port.
///
/// Implementations report ordinary delivery failures (blocked bot, deleted
/// account, bad id) as `Err(Error::Delivery { .. })` rather than panicking.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, to: &RecipientId, text: &str) -> Result<()>;

    async fn send_photo(&self, to: &RecipientId, media: &MediaRef, caption: &str) -> Result<()>;
}

/// Deliver `payload` to one recipient through the matching transport call.
pub async fn deliver(
    transport: &dyn Transport,
    to: &RecipientId,
    payload: &MessagePayload,
) -> Result<()> {
    match payload {
        MessagePayload::Text { text } => transport.send_text(to, text).await,
        MessagePayload::Photo { caption, media } => {
            transport.send_photo(to, media, caption).await
        }
    }
}
