//! One-shot broadcast from the command line, without the polling bot.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;

use bcast_core::{
    dispatch::{plan_file_source, Dispatcher, ProgressSink, ProgressSnapshot, RunHooks, RunTally},
    errors::Error,
    transport::types::{MediaRef, MessagePayload},
    Result,
};

pub const USAGE: &str = "usage: bcast send-file <recipients.json> <message-file> [photo-path]";

#[derive(Debug, PartialEq, Eq)]
pub struct SendFileArgs<'a> {
    pub recipients: &'a Path,
    pub message: &'a Path,
    pub photo: Option<&'a Path>,
}

impl<'a> SendFileArgs<'a> {
    /// Parse the arguments that follow `send-file`.
    pub fn parse(args: &'a [String]) -> Result<Self> {
        match args {
            [recipients, message] => Ok(Self {
                recipients: Path::new(recipients),
                message: Path::new(message),
                photo: None,
            }),
            [recipients, message, photo] => Ok(Self {
                recipients: Path::new(recipients),
                message: Path::new(message),
                photo: Some(Path::new(photo)),
            }),
            _ => Err(Error::Config(USAGE.to_string())),
        }
    }
}

struct LogProgress;

#[async_trait]
impl ProgressSink for LogProgress {
    async fn on_progress(&self, snapshot: ProgressSnapshot) {
        tracing::info!("{snapshot}");
    }
}

/// Load the message (and optional photo) and dispatch it to every id in the
/// recipients file.
pub async fn run(
    dispatcher: &Dispatcher,
    cfg: &bcast_core::config::Config,
    args: &SendFileArgs<'_>,
) -> Result<RunTally> {
    let text = tokio::fs::read_to_string(args.message).await?;
    let text = text.trim();

    let payload = match args.photo {
        Some(photo) => {
            if !tokio::fs::try_exists(photo).await? {
                return Err(Error::NotFound(format!("photo {}", photo.display())));
            }
            MessagePayload::photo(MediaRef::Path(photo.to_path_buf()), text)
        }
        None if text.is_empty() => {
            return Err(Error::Config(format!(
                "message file {} is empty",
                args.message.display()
            )));
        }
        None => MessagePayload::text(text),
    };

    let plan = plan_file_source(args.recipients, &cfg.sizing).await?;
    let options = plan.strategy.apply(&cfg.dispatch);
    tracing::info!(
        recipients = %args.recipients.display(),
        estimate = plan.estimate,
        streaming = plan.strategy.use_streaming,
        batch_size = options.batch_size,
        "sending broadcast from file"
    );

    let mut source = plan.source;
    let hooks = RunHooks {
        progress: Arc::new(LogProgress),
        ..RunHooks::default()
    };
    dispatcher
        .dispatch_with(payload, source.as_mut(), &options, &hooks)
        .await
}
