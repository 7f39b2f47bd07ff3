use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    dispatch::{options::DispatchOptions, sizing::SizingPolicy},
    errors::Error,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeEnv {
    Test,
    Production,
    Development,
}

impl NodeEnv {
    fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Typed configuration for the broadcast bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub node_env: NodeEnv,
    pub bot_token: String,
    pub admin_ids: Vec<i64>,

    // Recipients
    pub registry_path: PathBuf,
    pub recipients_file: Option<PathBuf>,
    pub test_recipients_file: Option<PathBuf>,

    // `/start` reply
    pub game_link: String,
    pub quest_link: String,
    pub start_banner: PathBuf,

    // Dispatch tuning
    pub dispatch: DispatchOptions,
    pub sizing: SizingPolicy,
    pub transport_min_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let node_env = NodeEnv::parse(&env_str("NODE_ENV").unwrap_or_default());
        let token_key = match node_env {
            NodeEnv::Production => "BOT_TOKEN_PROD",
            _ => "BOT_TOKEN_DEV",
        };
        let bot_token = env_str(token_key).unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(format!(
                "{token_key} environment variable is required"
            )));
        }

        let admin_ids = parse_ws_i64(env_str("ADMIN_TELE_IDS"));
        if admin_ids.is_empty() {
            tracing::warn!("ADMIN_TELE_IDS is empty; broadcast commands are disabled");
        }

        let registry_path = PathBuf::from(
            env_str("REGISTRY_PATH").unwrap_or("/tmp/bcast-registry.json".to_string()),
        );
        let recipients_file = env_path("RECIPIENTS_FILE");
        let test_recipients_file = env_path("TEST_RECIPIENTS_FILE");

        let game_link_key = match node_env {
            NodeEnv::Production => "TMA_LINK_PROD",
            _ => "TMA_LINK_TEST",
        };
        let game_link = env_str(game_link_key).unwrap_or_default();
        if game_link.trim().is_empty() {
            tracing::warn!("{game_link_key} is empty; /start omits the game button");
        }
        let quest_link = env_str("DITTO_QUEST_LINK").unwrap_or_default();
        let start_banner =
            env_path("START_BANNER_PATH").unwrap_or_else(|| PathBuf::from("assets/banner.png"));

        let dispatch = dispatch_options_from_env()?;
        let sizing = sizing_policy_from_env();
        let transport_min_interval =
            Duration::from_millis(env_u64("TRANSPORT_MIN_INTERVAL_MS").unwrap_or(34));

        Ok(Self {
            node_env,
            bot_token,
            admin_ids,
            registry_path,
            recipients_file,
            test_recipients_file,
            game_link,
            quest_link,
            start_banner,
            dispatch,
            sizing,
            transport_min_interval,
        })
    }
}

fn dispatch_options_from_env() -> Result<DispatchOptions> {
    let d = DispatchOptions::default();
    let attempt_timeout = match env_u64("BROADCAST_ATTEMPT_TIMEOUT_MS") {
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
        None => d.attempt_timeout,
    };

    let opts = DispatchOptions {
        batch_size: env_usize("BROADCAST_BATCH_SIZE").unwrap_or(d.batch_size),
        delay_between_batches: env_u64("BROADCAST_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(d.delay_between_batches),
        yield_every_n_batches: env_u64("BROADCAST_YIELD_EVERY").unwrap_or(d.yield_every_n_batches),
        enable_progress_updates: env_bool("BROADCAST_PROGRESS_UPDATES")
            .unwrap_or(d.enable_progress_updates),
        progress_every_n_batches: env_u64("BROADCAST_PROGRESS_EVERY")
            .unwrap_or(d.progress_every_n_batches),
        attempt_timeout,
    };
    opts.validate()?;
    Ok(opts)
}

fn sizing_policy_from_env() -> SizingPolicy {
    let d = SizingPolicy::default();
    SizingPolicy {
        streaming_threshold: env_u64("STREAMING_THRESHOLD").unwrap_or(d.streaming_threshold),
        bytes_per_id: env_u64("BYTES_PER_ID")
            .filter(|v| *v > 0)
            .unwrap_or(d.bytes_per_id),
        ..d
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_str(key)
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

/// Admin ids are space separated (`ADMIN_TELE_IDS="123 456"`); commas are tolerated.
fn parse_ws_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}
