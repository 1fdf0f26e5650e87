pub mod health;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::admin::handlers as admin;
use crate::analysis::handlers as analysis;
use crate::analysis::upload::MAX_FILE_SIZE;
use crate::auth::handlers as auth;
use crate::payments::handlers as payments;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Auth
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout))
        .route("/api/auth/user", get(auth::current_user))
        // CV analysis
        .route("/api/upload-cv", post(analysis::upload_cv))
        .route("/api/analyses", get(analysis::list_analyses))
        .route("/api/analyses/:id", get(analysis::get_analysis))
        // Payments (the webhook reads the raw body; signature before parsing)
        .route(
            "/api/create-payment-intent",
            post(payments::create_payment_intent),
        )
        .route("/api/webhook", post(payments::stripe_webhook))
        // Admin
        .route(
            "/api/admin/settings",
            get(admin::get_settings).post(admin::update_settings),
        )
        .route("/api/admin/dashboard-data", get(admin::dashboard_data))
        .route("/api/admin/user-stats", get(admin::user_stats))
        .route("/api/admin/db-status", get(admin::db_status))
        .route("/api/admin/test-email", post(admin::test_email))
        // Room for the 5 MiB file plus multipart framing; the handler still
        // enforces the exact file limit.
        .layer(DefaultBodyLimit::max(MAX_FILE_SIZE + 64 * 1024))
        .with_state(state)
}
