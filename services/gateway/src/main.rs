use anyhow::Result;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use gateway::{AppState, config::AppConfig, copilot::CopilotBackend, routes, session};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting issue-triage gateway");

    let config = AppConfig::from_env()?;

    // Falls back to the in-memory store if Redis is configured but down
    let sessions = session::init_session_store(&config).await;

    let chat_backend = Arc::new(CopilotBackend::new(
        &config.copilot_api_url,
        &config.copilot_model,
    ));

    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::new(config, sessions, chat_backend);

    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Gateway listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
