use std::{collections::HashMap, sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher as UpdateDispatcher, dptree, prelude::*};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use bcast_core::{config::Config, dispatch::Dispatcher, registry::RecipientRegistry};

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub registry: Arc<dyn RecipientRegistry>,
    pub dispatcher: Dispatcher,
    pub scenes: Arc<Scenes>,
    pub runs: Arc<ActiveRuns>,
}

/// Which message an admin chat is currently being asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scene {
    /// Next message goes to every registered recipient.
    Broadcast,
    /// Next message goes to the test recipients file only.
    BroadcastTest,
}

#[derive(Default)]
pub struct Scenes {
    inner: Mutex<HashMap<i64, Scene>>,
}

impl Scenes {
    pub async fn enter(&self, chat_id: i64, scene: Scene) {
        self.inner.lock().await.insert(chat_id, scene);
    }

    /// Leave the chat's scene, returning the one that was active.
    pub async fn leave(&self, chat_id: i64) -> Option<Scene> {
        self.inner.lock().await.remove(&chat_id)
    }

    pub async fn current(&self, chat_id: i64) -> Option<Scene> {
        self.inner.lock().await.get(&chat_id).copied()
    }
}

/// One in-flight broadcast per admin chat, each with its cancellation token.
#[derive(Default)]
pub struct ActiveRuns {
    inner: Mutex<HashMap<i64, CancellationToken>>,
}

impl ActiveRuns {
    /// Register a run for `chat_id`; `None` if one is already in flight.
    pub async fn start(&self, chat_id: i64) -> Option<CancellationToken> {
        let mut map = self.inner.lock().await;
        if map.contains_key(&chat_id) {
            return None;
        }
        let token = CancellationToken::new();
        map.insert(chat_id, token.clone());
        Some(token)
    }

    pub async fn finish(&self, chat_id: i64) {
        self.inner.lock().await.remove(&chat_id);
    }

    /// Request cancellation of the chat's run. Returns whether one was running.
    pub async fn cancel(&self, chat_id: i64) -> bool {
        match self.inner.lock().await.get(&chat_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every run; returns how many were in flight.
    pub async fn cancel_all(&self) -> usize {
        let map = self.inner.lock().await;
        for token in map.values() {
            token.cancel();
        }
        map.len()
    }

    pub async fn is_idle(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Wait up to `grace` for cancelled runs to settle their current batch.
    pub async fn drain(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, async {
            while !self.is_idle().await {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await
        .is_ok()
    }
}

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub async fn run_polling(
    cfg: Arc<Config>,
    registry: Arc<dyn RecipientRegistry>,
    dispatcher: Dispatcher,
    bot: Bot,
) -> anyhow::Result<()> {
    if let Ok(me) = bot.get_me().await {
        tracing::info!("bcast started: @{}", me.username());
    }
    tracing::info!(
        admins = cfg.admin_ids.len(),
        env = ?cfg.node_env,
        registry = %cfg.registry_path.display(),
        "launching broadcast bot"
    );

    let state = Arc::new(AppState {
        cfg,
        registry,
        dispatcher,
        scenes: Arc::new(Scenes::default()),
        runs: Arc::new(ActiveRuns::default()),
    });

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    UpdateDispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state.clone()])
        .build()
        .dispatch()
        .await;

    tracing::info!("update dispatcher stopped");

    let running = state.runs.cancel_all().await;
    if running > 0 {
        tracing::info!(running, "cancelling in-flight broadcasts");
        if !state.runs.drain(SHUTDOWN_GRACE).await {
            tracing::warn!("broadcasts still running after shutdown grace period");
        }
    }
    Ok(())
}
