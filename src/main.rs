use conversation_service::{
    config, db, error, logging, migrations, routes, services::mailer::Mailer, state::AppState,
    websocket::{ConnectionRegistry, RoomRegistry},
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    // Initialize DB pool
    let db = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    // Run embedded migrations (idempotent); the schema must be in sync
    migrations::run_all(&db)
        .await
        .map_err(|e| error::AppError::StartServer(format!("migrations: {e}")))?;

    let registry = ConnectionRegistry::new();
    let rooms = RoomRegistry::new();
    let mailer = Mailer::new(cfg.email_webhook_url.clone());
    if mailer.is_enabled() {
        tracing::info!("email dispatch enabled");
    }

    let state = AppState {
        db,
        registry: registry.clone(),
        rooms: rooms.clone(),
        config: cfg.clone(),
        mailer,
    };

    let app = routes::build_router(state);

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting conversation-service");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    // Explicit lifecycle: drop every connection binding and room membership
    // on the way out so a restart starts from a clean registry.
    rooms.clear().await;
    registry.clear().await;
    tracing::info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown handler");
    }
}
