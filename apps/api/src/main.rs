mod admin;
mod analysis;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod notify;
mod payments;
mod routes;
mod settings;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::scorer::GeminiScorer;
use crate::auth::{sessions, users};
use crate::config::Config;
use crate::db::create_pool;
use crate::payments::stripe::StripeClient;
use crate::routes::build_router;
use crate::settings::SettingsStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CVIntelligence API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL and apply migrations
    let db = create_pool(&config.database_url).await?;

    // Ensure the operator account exists and drop stale sessions
    users::ensure_admin_user(&db, &config.admin_email, &config.admin_password).await?;
    let purged = sessions::purge_expired(&db).await?;
    if purged > 0 {
        info!("Purged {purged} expired sessions");
    }

    let settings = SettingsStore::new(db.clone());

    // Scoring oracle: reads its key, model and prompt from settings per call
    let scorer = Arc::new(GeminiScorer::new(settings.clone()));

    let state = AppState {
        db,
        settings,
        scorer,
        stripe: StripeClient::new(),
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
