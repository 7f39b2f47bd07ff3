use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode, WebAppInfo},
};

use bcast_core::{
    domain::{ChatId, RecipientId},
    formatting::{start_menu, start_message_html, LinkButton, LinkKind},
    security::is_admin,
};

use crate::router::{AppState, Scene};

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn scene_prompt(scene: Scene) -> &'static str {
    match scene {
        Scene::Broadcast => {
            "📣 What is the message you would like to broadcast?\n\n\
Send text, or a photo with a caption. /exit to cancel."
        }
        Scene::BroadcastTest => {
            "🧪 TEST BROADCAST\n\n\
This will only broadcast to test users.\n\n\
What message would you like to test?"
        }
    }
}

fn link_button(button: LinkButton) -> Option<InlineKeyboardButton> {
    let url = match reqwest::Url::parse(button.url.trim()) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(button = button.text, "skipping button with bad link {:?}: {e}", button.url);
            return None;
        }
    };
    Some(match button.kind {
        LinkKind::WebApp => InlineKeyboardButton::web_app(button.text, WebAppInfo { url }),
        LinkKind::Url => InlineKeyboardButton::url(button.text, url),
    })
}

fn start_keyboard(rows: Vec<Vec<LinkButton>>) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = rows
        .into_iter()
        .map(|row| row.into_iter().filter_map(link_button).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();
    InlineKeyboardMarkup::new(rows)
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let chat_id = msg.chat.id.0;
    let admin = is_admin(Some(ChatId(chat_id)), &state.cfg.admin_ids);
    let (cmd, arg) = parse_command(text);

    match cmd.as_str() {
        "start" => {
            let Some(user) = msg.from() else {
                return Ok(());
            };
            let id = RecipientId::from(user.id.0 as i64);
            if let Err(e) = state
                .registry
                .upsert_user(&id, user.username.as_deref().unwrap_or(""), &user.first_name)
                .await
            {
                tracing::error!(user = %id, "failed to register user: {e}");
            }

            let caption = start_message_html(user.username.as_deref());
            let keyboard = start_keyboard(start_menu(&state.cfg.game_link, &state.cfg.quest_link));
            let banner = &state.cfg.start_banner;
            if tokio::fs::try_exists(banner).await.unwrap_or(false) {
                bot.send_photo(msg.chat.id, InputFile::file(banner.clone()))
                    .caption(caption)
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboard)
                    .await?;
            } else {
                tracing::warn!(path = %banner.display(), "start banner not found; replying with text");
                bot.send_message(msg.chat.id, caption)
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboard)
                    .await?;
            }
            Ok(())
        }

        "wallet" => {
            let Some(user) = msg.from() else {
                return Ok(());
            };
            if arg.is_empty() {
                bot.send_message(msg.chat.id, "Usage: /wallet <address>")
                    .await?;
                return Ok(());
            }
            let id = RecipientId::from(user.id.0 as i64);
            let reply = match state.registry.set_wallet_address(&id, &arg).await {
                Ok(()) => "✅ Wallet address saved.".to_string(),
                Err(bcast_core::Error::NotFound(_)) => "Please /start the bot first.".to_string(),
                Err(e) => {
                    tracing::error!(user = %id, "failed to save wallet address: {e}");
                    "An error occurred. Please try again later.".to_string()
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
            Ok(())
        }

        "broadcast" | "broadcasttest" => {
            // Unknown to non-admins.
            if !admin {
                return Ok(());
            }
            let scene = if cmd == "broadcast" {
                Scene::Broadcast
            } else {
                Scene::BroadcastTest
            };
            state.scenes.enter(chat_id, scene).await;
            bot.send_message(msg.chat.id, scene_prompt(scene)).await?;
            Ok(())
        }

        "exit" | "quit" | "back" => {
            if state.scenes.leave(chat_id).await.is_some() {
                bot.send_message(msg.chat.id, "❌ Exiting broadcast scene...")
                    .await?;
            }
            Ok(())
        }

        "cancel" => {
            if !admin {
                return Ok(());
            }
            let reply = if state.runs.cancel(chat_id).await {
                "⛔ Cancelling broadcast after the current batch..."
            } else {
                "No broadcast is running."
            };
            bot.send_message(msg.chat.id, reply).await?;
            Ok(())
        }

        _ => Ok(()),
    }
}
