use std::sync::Arc;

use authgate::{
    app::{build_app, serve},
    auth::repo::PgUserStore,
    config::AppConfig,
    db,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "authgate=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    tracing::info!(environment = %config.environment, "configuration loaded");

    let pool = db::connect(&config.database_url).await?;
    db::migrate(&pool).await?;

    let (host, port) = (config.host.clone(), config.port);
    let state = AppState::new(config, Arc::new(PgUserStore::new(pool.clone())))?;

    let result = serve(build_app(state), &host, port).await;
    db::close(pool).await;
    result
}
