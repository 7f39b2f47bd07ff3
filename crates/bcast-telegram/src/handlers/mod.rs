//! Telegram update handlers.
//!
//! Commands are routed to `commands`; any other message from a chat that is
//! inside a broadcast scene becomes the broadcast payload (`broadcast`).

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use crate::router::AppState;

mod broadcast;
mod commands;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(bot, msg, state).await;
        }
    }

    let chat_id = msg.chat.id.0;
    if let Some(scene) = state.scenes.current(chat_id).await {
        return broadcast::handle_scene_message(bot, msg, state, scene).await;
    }

    Ok(())
}
