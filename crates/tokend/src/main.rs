use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod server;

use config::TokendConfig;
use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tokend=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TCR token generation service");

    dotenvy::dotenv().ok();
    let config = TokendConfig::from_env()?;
    info!("Listening on: {}", config.bind_addr());

    let state = Arc::new(AppState::new(config));
    server::run(state).await?;
    Ok(())
}
