use std::sync::Arc;

use bcast_core::{
    config::Config,
    dispatch::{Dispatcher, TokioYield},
    registry::JsonFileRegistry,
};
use bcast_telegram::{router::run_polling, throttled_transport, Bot};

mod send_file;

#[tokio::main]
async fn main() -> Result<(), bcast_core::Error> {
    bcast_core::logging::init("bcast")?;

    let cfg = Arc::new(Config::load()?);
    let bot = Bot::new(cfg.bot_token.clone());
    let dispatcher = Dispatcher::new(throttled_transport(bot.clone(), &cfg))
        .with_yield_hook(Arc::new(TokioYield));

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("send-file") {
        let parsed = send_file::SendFileArgs::parse(&args[1..])?;
        let tally = send_file::run(&dispatcher, &cfg, &parsed).await?;
        tracing::info!(
            success = tally.total_success,
            failed = tally.total_failure,
            batches = tally.batches_completed,
            "broadcast finished"
        );
        return Ok(());
    }

    let registry = Arc::new(JsonFileRegistry::open(&cfg.registry_path).await?);
    let polled = run_polling(cfg, registry.clone(), dispatcher, bot).await;

    // Flush the journal even if polling failed.
    registry.close().await?;
    polled.map_err(|e| bcast_core::Error::External(format!("telegram bot failed: {e}")))?;
    Ok(())
}
