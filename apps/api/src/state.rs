use std::sync::Arc;

use sqlx::PgPool;

use crate::analysis::scorer::CvScorer;
use crate::config::Config;
use crate::payments::stripe::StripeClient;
use crate::settings::SettingsStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Runtime key/value configuration, read live — never cached.
    pub settings: SettingsStore,
    /// Pluggable scoring oracle. Production: `GeminiScorer`; tests inject a fake.
    pub scorer: Arc<dyn CvScorer>,
    pub stripe: StripeClient,
    pub config: Config,
}
