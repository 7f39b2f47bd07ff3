//! Telegram adapter (teloxide).
//!
//! This crate implements the `bcast-core` Transport over the Telegram Bot API
//! and hosts the admin-facing command router.

use std::sync::Arc;

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InputFile, ParseMode},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

pub use teloxide::Bot;

use bcast_core::{
    config::Config,
    domain::RecipientId,
    errors::Error,
    transport::{
        port::Transport,
        throttled::{ThrottleConfig, ThrottledTransport},
        types::MediaRef,
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(to: &RecipientId) -> Result<teloxide::types::ChatId> {
        to.as_str()
            .trim()
            .parse::<i64>()
            .map(teloxide::types::ChatId)
            .map_err(|_| Error::Delivery {
                recipient: to.to_string(),
                reason: "not a numeric chat id".to_string(),
            })
    }

    fn tg_input_file(media: &MediaRef) -> InputFile {
        match media {
            MediaRef::FileId(id) => InputFile::file_id(id.clone()),
            MediaRef::Path(path) => InputFile::file(path.clone()),
        }
    }

    fn map_err(to: &RecipientId, e: teloxide::RequestError) -> Error {
        Error::Delivery {
            recipient: to.to_string(),
            reason: format!("telegram error: {e}"),
        }
    }

    async fn with_retry<T, Fut>(&self, to: &RecipientId, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::warn!(recipient = %to, "telegram asked to retry after {d:?}");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(to, other)),
                },
            }
        }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, to: &RecipientId, text: &str) -> Result<()> {
        let chat = Self::tg_chat(to)?;
        self.with_retry(to, || {
            self.bot
                .send_message(chat, text.to_string())
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }

    async fn send_photo(&self, to: &RecipientId, media: &MediaRef, caption: &str) -> Result<()> {
        let chat = Self::tg_chat(to)?;
        self.with_retry(to, || {
            let mut req = self.bot.send_photo(chat, Self::tg_input_file(media));
            if !caption.is_empty() {
                req = req.caption(caption.to_string()).parse_mode(ParseMode::Html);
            }
            req
        })
        .await?;
        Ok(())
    }
}

/// Telegram transport wrapped in the global send throttle configured in `cfg`.
pub fn throttled_transport(bot: Bot, cfg: &Config) -> Arc<dyn Transport> {
    let raw: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot));
    Arc::new(ThrottledTransport::new(
        raw,
        ThrottleConfig {
            global_min_interval: cfg.transport_min_interval,
        },
    ))
}
