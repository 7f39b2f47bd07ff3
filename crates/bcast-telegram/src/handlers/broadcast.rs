use std::sync::Arc;

use async_trait::async_trait;
use teloxide::{prelude::*, types::MessageId};
use tokio_util::sync::CancellationToken;

use bcast_core::{
    dispatch::{
        estimate_count, plan_file_source, DispatchOptions, MaterializedSource, ProgressSink,
        ProgressSnapshot, RecipientSource, RunHooks,
    },
    domain::ChatId,
    formatting::run_summary,
    security::is_admin,
    transport::types::{MediaRef, MessagePayload},
};

use crate::router::{AppState, Scene};

const UNSUPPORTED: &str = "Unsupported message type. Send:\n\
• Plain text message\n\
• Photo with caption\n\n\
Not supported: stickers, voice notes, documents, videos";

/// Build the payload from the parts of an admin's message.
///
/// Photos win over text; the largest size's file id is reused so Telegram
/// does not need the image re-uploaded for every recipient.
fn payload_from_parts(
    text: Option<&str>,
    photo_file_id: Option<&str>,
    caption: Option<&str>,
) -> Option<MessagePayload> {
    if let Some(file_id) = photo_file_id {
        return Some(MessagePayload::photo(
            MediaRef::FileId(file_id.to_string()),
            caption.unwrap_or(""),
        ));
    }
    text.filter(|t| !t.trim().is_empty())
        .map(MessagePayload::text)
}

fn scene_label(scene: Scene) -> &'static str {
    match scene {
        Scene::Broadcast => "",
        Scene::BroadcastTest => "TEST",
    }
}

/// Edits the operator's status message with every progress snapshot.
struct StatusMessageProgress {
    bot: Bot,
    chat: teloxide::types::ChatId,
    message_id: MessageId,
    header: String,
}

#[async_trait]
impl ProgressSink for StatusMessageProgress {
    async fn on_progress(&self, snapshot: ProgressSnapshot) {
        let text = format!("{}\n\n{snapshot}", self.header);
        if let Err(e) = self
            .bot
            .edit_message_text(self.chat, self.message_id, text)
            .await
        {
            tracing::warn!("failed to update broadcast status: {e}");
        }
    }
}

pub async fn handle_scene_message(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    scene: Scene,
) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;

    // Exit the scene immediately; a second message must not start a second run.
    state.scenes.leave(chat_id).await;

    if !is_admin(Some(ChatId(chat_id)), &state.cfg.admin_ids) {
        return Ok(());
    }

    let photo_file_id = msg
        .photo()
        .and_then(|sizes| sizes.last())
        .map(|p| p.file.id.clone());
    let Some(payload) = payload_from_parts(msg.text(), photo_file_id.as_deref(), msg.caption())
    else {
        bot.send_message(msg.chat.id, UNSUPPORTED).await?;
        return Ok(());
    };

    let Some(cancel) = state.runs.start(chat_id).await else {
        bot.send_message(
            msg.chat.id,
            "A broadcast is already running. Send /cancel to stop it.",
        )
        .await?;
        return Ok(());
    };

    // The run can take hours; keep the update loop free for /cancel.
    tokio::spawn(run_broadcast(bot, state, msg.chat.id, scene, payload, cancel));
    Ok(())
}

async fn run_broadcast(
    bot: Bot,
    state: Arc<AppState>,
    chat: teloxide::types::ChatId,
    scene: Scene,
    payload: MessagePayload,
    cancel: CancellationToken,
) {
    let result = execute(&bot, &state, chat, scene, payload, cancel).await;
    state.runs.finish(chat.0).await;

    if let Err(e) = result {
        tracing::error!(scene = ?scene, "error broadcasting message: {e:#}");
        let _ = bot
            .send_message(chat, "An error occurred during broadcast. Please try again later.")
            .await;
    }
}

async fn execute(
    bot: &Bot,
    state: &AppState,
    chat: teloxide::types::ChatId,
    scene: Scene,
    payload: MessagePayload,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let cfg = &state.cfg;
    let (mut source, options) = match scene {
        Scene::Broadcast => match &cfg.recipients_file {
            Some(path) => {
                let plan = plan_file_source(path, &cfg.sizing).await?;
                (plan.source, plan.strategy.apply(&cfg.dispatch))
            }
            None => {
                let src = MaterializedSource::from_registry(state.registry.as_ref()).await?;
                let strategy = cfg.sizing.choose_strategy(src.len() as u64);
                let src: Box<dyn RecipientSource> = Box::new(src);
                (src, strategy.apply(&cfg.dispatch))
            }
        },
        Scene::BroadcastTest => {
            let path = cfg
                .test_recipients_file
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("TEST_RECIPIENTS_FILE is not configured"))?;
            let src: Box<dyn RecipientSource> =
                Box::new(MaterializedSource::from_file(path).await?);
            (src, DispatchOptions::for_test_broadcast())
        }
    };

    let label = scene_label(scene);
    let total = estimate_count(source.as_ref()).await?;
    let approx = if source.exact_len().is_some() { "" } else { "~" };
    let header = match label {
        "" => format!("🚀 Broadcasting to {approx}{total} users..."),
        l => format!("🧪 Starting {l} broadcast to {approx}{total} users..."),
    };
    let status = bot.send_message(chat, header.clone()).await?;

    let hooks = RunHooks {
        progress: Arc::new(StatusMessageProgress {
            bot: bot.clone(),
            chat,
            message_id: status.id,
            header,
        }),
        cancel,
    };

    let tally = state
        .dispatcher
        .dispatch_with(payload, source.as_mut(), &options, &hooks)
        .await?;

    bot.edit_message_text(chat, status.id, run_summary(label, &tally, total))
        .await?;
    Ok(())
}
