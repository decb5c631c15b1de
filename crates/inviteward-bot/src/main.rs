//! Inviteward binary

use inviteward_bot::{Bot, BotConfig};
use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("inviteward: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let file_layer = match &config.log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .boxed(),
            ),
            Err(e) => {
                eprintln!("inviteward: cannot open log file {}: {}", path.display(), e);
                None
            }
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inviteward=info,inviteward_bot=info,inviteward_ledger=info,inviteward_discord=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    tracing::info!(?config, "Starting Inviteward");

    match Bot::new(config).run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Bot stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}
