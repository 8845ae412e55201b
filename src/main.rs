mod agent;
mod config;
mod db;
mod errors;
mod extract;
mod models;
mod prompt;
mod routes;
mod service;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::{ModelGateway, RigGateway};
use crate::config::AppConfig;
use crate::db::game_repository::{GameStore, InMemoryGameStore, PgGameStore};
use crate::db::session_repository::{InMemorySessionStore, PgSessionStore, SessionStore};
use crate::errors::AppError;
use crate::routes::api_routes::{router, AppState};
use crate::service::game_service::GameService;
use crate::service::session_controller::SessionController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "game_forge=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    // ── Storage ───────────────────────────────────────────────────────────────
    let (session_store, game_store): (Arc<dyn SessionStore>, Arc<dyn GameStore>) =
        match &config.database_url {
            Some(database_url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(database_url)
                    .await
                    .map_err(AppError::DatabaseConnectionFailed)?;

                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .map_err(AppError::MigrationFailed)?;

                info!("Database connection established and migrations applied");
                let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));
                let games: Arc<dyn GameStore> = Arc::new(PgGameStore::new(pool));
                (sessions, games)
            }
            None => {
                warn!("DATABASE_URL not set; sessions and games are kept in memory only");
                let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
                let games: Arc<dyn GameStore> = Arc::new(InMemoryGameStore::new());
                (sessions, games)
            }
        };

    // ── Model gateway ─────────────────────────────────────────────────────────
    let gateway: Arc<dyn ModelGateway> = Arc::new(RigGateway::from_config(&config.model)?);
    info!("Using {:?} model '{}'", config.model.provider, config.model.model);

    let state = AppState {
        sessions: SessionController::new(session_store, gateway.clone()),
        games: GameService::new(game_store, gateway),
    };

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
