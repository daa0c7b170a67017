use std::sync::Arc;

use anyhow::Context;
use db::DBService;
use server::{AppState, config::Config};
use services::services::{
    anthropic::Anthropic, assistant::AiAssistant, maintenance::MaintenanceService,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = DBService::new(&config.database_url)
        .await
        .with_context(|| format!("failed to open database at {}", config.database_url))?;

    // A missing API key fails here, at startup, not per request.
    let generator = Anthropic::from_env(config.model.clone())?;
    let assistant = Arc::new(AiAssistant::new(db.pool.clone(), Arc::new(generator)));

    let _maintenance = MaintenanceService::spawn(db.clone()).await;

    let app = server::router(AppState { db, assistant });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
