use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::extract::CurrentUser;
use crate::auth::users;
use crate::errors::AppError;
use crate::models::purchase::CreditPurchaseRow;
use crate::payments::signature;
use crate::payments::stripe::{PaymentIntentObject, WebhookEvent};
use crate::settings::{keys, SettingsStore};
use crate::state::AppState;

/// R$ 5,00 per credit, in centavos.
const CENTAVOS_PER_CREDIT: i64 = 500;
const CURRENCY: &str = "brl";

/// Configurable package tiers, checked in display order.
const PACKAGE_TIERS: &[&str] = &["BASIC", "PREMIUM", "ULTIMATE"];

/// Matches a credit count against the `(credits, name)` settings of each
/// tier. A matching tier with no configured name falls back to its label.
fn package_name_for(credits: i32, tiers: &[(&str, Option<String>, Option<String>)]) -> Option<String> {
    tiers.iter().find_map(|(label, tier_credits, name)| {
        let matches = tier_credits
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i32>().ok())
            == Some(credits);
        matches.then(|| {
            name.as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| label.to_lowercase())
        })
    })
}

/// Resolves the package name for an intent without an explicit one: the
/// configured tier whose credit count matches, else `"custom"`.
async fn derive_package_name(
    settings: &SettingsStore,
    credits: i32,
) -> Result<String, sqlx::Error> {
    let mut tiers = Vec::with_capacity(PACKAGE_TIERS.len());
    for tier in PACKAGE_TIERS {
        let tier_credits = settings.get(&format!("CREDIT_{tier}_CREDITS")).await?;
        let name = settings.get(&format!("CREDIT_{tier}_NAME")).await?;
        tiers.push((*tier, tier_credits, name));
    }
    Ok(package_name_for(credits, &tiers).unwrap_or_else(|| "custom".to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub credits: i32,
    pub package_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentResponse {
    pub client_secret: String,
}

/// POST /api/create-payment-intent
///
/// Creates the Stripe PaymentIntent for a credit package. Nothing local
/// changes here; credits are granted only by the webhook.
pub async fn create_payment_intent(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateIntentRequest>,
) -> Result<Json<CreateIntentResponse>, AppError> {
    if payload.credits < 1 {
        return Err(AppError::Validation(
            "Quantidade de créditos inválida".to_string(),
        ));
    }

    // Payments can be switched off at runtime; a missing key means the
    // operator never enabled them.
    let disabled = matches!(
        state.settings.get(keys::STRIPE_PAYMENTS_ENABLED).await?,
        Some(v) if v.eq_ignore_ascii_case("false")
    );
    let secret_key = state.settings.get(keys::STRIPE_SECRET_KEY).await?;
    let secret_key = match (disabled, secret_key) {
        (false, Some(key)) if !key.is_empty() => key,
        _ => {
            return Err(AppError::Validation(
                "Pagamentos não estão habilitados no momento".to_string(),
            ))
        }
    };

    let package_name = match payload
        .package_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
    {
        Some(name) => name.to_string(),
        None => derive_package_name(&state.settings, payload.credits).await?,
    };

    let amount = i64::from(payload.credits) * CENTAVOS_PER_CREDIT;

    let intent = state
        .stripe
        .create_payment_intent(
            &secret_key,
            amount,
            CURRENCY,
            &user.id.to_string(),
            payload.credits,
            &package_name,
        )
        .await?;

    tracing::info!(
        user_id = %user.id,
        intent_id = %intent.id,
        credits = payload.credits,
        amount,
        "Payment intent created"
    );

    Ok(Json(CreateIntentResponse {
        client_secret: intent.client_secret,
    }))
}

/// POST /api/webhook
///
/// Raw-body endpoint. The signature is checked before the payload is even
/// parsed; fulfillment is idempotent on the intent id, so Stripe redelivery
/// is a no-op success.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let header = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            AppError::InvalidSignature("missing Stripe-Signature header".to_string())
        })?;

    let secret = state
        .settings
        .get(keys::STRIPE_WEBHOOK_SECRET)
        .await?
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AppError::InvalidSignature("webhook secret not configured".to_string())
        })?;

    signature::verify(&body, header, &secret)?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|_| AppError::Validation("Payload do webhook inválido".to_string()))?;

    if event.event_type == "payment_intent.succeeded" {
        let intent: PaymentIntentObject = serde_json::from_value(event.data.object)
            .map_err(|_| AppError::Validation("Payload do webhook inválido".to_string()))?;
        fulfill(&state, &intent).await?;
    }

    Ok(Json(json!({ "received": true })))
}

/// Grants the purchased credits exactly once per intent id.
///
/// The purchase insert and the balance increment share one transaction; the
/// unique index on `payment_intent_id` makes redelivery a silent no-op.
async fn fulfill(state: &AppState, intent: &PaymentIntentObject) -> Result<(), AppError> {
    let user_id = intent
        .metadata
        .user_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw).ok());
    let credits = intent
        .metadata
        .credits
        .as_deref()
        .and_then(|raw| raw.parse::<i32>().ok())
        .filter(|c| *c > 0);

    let (user_id, credits) = match (user_id, credits) {
        (Some(u), Some(c)) => (u, c),
        _ => {
            // Signed but unusable: acknowledge so Stripe stops redelivering.
            tracing::warn!(
                intent_id = %intent.id,
                "payment_intent.succeeded without usable metadata, skipping"
            );
            return Ok(());
        }
    };

    let package_name = intent.metadata.package_name.as_deref().unwrap_or("custom");

    let mut tx = state.db.begin().await?;

    // DO NOTHING + RETURNING: a redelivered intent id yields no row.
    let purchase: Option<CreditPurchaseRow> = sqlx::query_as(
        r#"
        INSERT INTO credit_purchases
            (id, user_id, package_name, credits, amount, payment_intent_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (payment_intent_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(package_name)
    .bind(credits)
    .bind(intent.amount)
    .bind(&intent.id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(purchase) = purchase else {
        tx.rollback().await?;
        tracing::info!(intent_id = %intent.id, "Duplicate webhook delivery ignored");
        return Ok(());
    };

    match users::credit_credits(&mut *tx, user_id, credits).await? {
        Some(balance) => {
            tx.commit().await?;
            tracing::info!(
                user_id = %user_id,
                purchase_id = %purchase.id,
                intent_id = %intent.id,
                credits,
                balance,
                "Credits granted from payment"
            );
        }
        None => {
            tx.rollback().await?;
            tracing::warn!(
                user_id = %user_id,
                intent_id = %intent.id,
                "Payment for unknown user ignored"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use sqlx::PgPool;

    use crate::analysis::scorer::{CvReport, CvScorer, ScoreRequest, ScorerError};
    use crate::config::Config;
    use crate::payments::stripe::{IntentMetadata, StripeClient};

    fn tiers(
        basic: (Option<&str>, Option<&str>),
        premium: (Option<&str>, Option<&str>),
    ) -> Vec<(&'static str, Option<String>, Option<String>)> {
        vec![
            ("BASIC", basic.0.map(String::from), basic.1.map(String::from)),
            (
                "PREMIUM",
                premium.0.map(String::from),
                premium.1.map(String::from),
            ),
            ("ULTIMATE", None, None),
        ]
    }

    #[test]
    fn package_name_matches_configured_tier() {
        let tiers = tiers((Some("5"), Some("Básico")), (Some("15"), Some("Premium")));
        assert_eq!(package_name_for(15, &tiers).as_deref(), Some("Premium"));
        assert_eq!(package_name_for(5, &tiers).as_deref(), Some("Básico"));
    }

    #[test]
    fn package_name_falls_back_to_tier_label_without_name() {
        let tiers = tiers((Some("5"), None), (None, None));
        assert_eq!(package_name_for(5, &tiers).as_deref(), Some("basic"));
    }

    #[test]
    fn package_name_unmatched_credits_yield_none() {
        let tiers = tiers((Some("5"), Some("Básico")), (Some("15"), Some("Premium")));
        assert_eq!(package_name_for(7, &tiers), None);
        assert_eq!(package_name_for(7, &[]), None);
    }

    // The webhook never scores anything; the state still needs a scorer.
    struct UnusedScorer;

    #[async_trait]
    impl CvScorer for UnusedScorer {
        async fn score(&self, _request: ScoreRequest) -> Result<CvReport, ScorerError> {
            Err(ScorerError::EmptyContent)
        }
    }

    fn test_state(pool: PgPool) -> AppState {
        AppState {
            db: pool.clone(),
            settings: SettingsStore::new(pool),
            scorer: Arc::new(UnusedScorer),
            stripe: StripeClient::new(),
            config: Config {
                database_url: String::new(),
                admin_email: "admin@example.com".to_string(),
                admin_password: "admin-password".to_string(),
                upload_dir: "uploads".to_string(),
                port: 0,
                rust_log: "info".to_string(),
            },
        }
    }

    async fn seed_user(pool: &PgPool, credits: i32) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, credits)
            VALUES ($1, $2, 'x', 'Ana', 'Silva', $3)
            "#,
        )
        .bind(id)
        .bind(format!("{id}@example.com"))
        .bind(credits)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn balance(pool: &PgPool, user_id: Uuid) -> i32 {
        sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn succeeded_intent(intent_id: &str, user_id: Uuid, credits: &str, amount: i64) -> PaymentIntentObject {
        PaymentIntentObject {
            id: intent_id.to_string(),
            amount,
            metadata: IntentMetadata {
                user_id: Some(user_id.to_string()),
                credits: Some(credits.to_string()),
                package_name: Some("premium".to_string()),
            },
        }
    }

    #[sqlx::test]
    async fn duplicate_delivery_credits_exactly_once(pool: PgPool) {
        let state = test_state(pool.clone());
        let user_id = seed_user(&pool, 5).await;

        // Amount past i32::MAX centavos must survive storage intact.
        let intent = succeeded_intent("pi_replay", user_id, "10", 3_000_000_000);
        fulfill(&state, &intent).await.unwrap();
        fulfill(&state, &intent).await.unwrap();

        assert_eq!(balance(&pool, user_id).await, 15);

        let purchases: Vec<CreditPurchaseRow> =
            sqlx::query_as("SELECT * FROM credit_purchases WHERE payment_intent_id = $1")
                .bind("pi_replay")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].credits, 10);
        assert_eq!(purchases[0].amount, 3_000_000_000);
        assert_eq!(purchases[0].package_name, "premium");
    }

    #[sqlx::test]
    async fn unknown_user_payment_is_acknowledged_without_rows(pool: PgPool) {
        let state = test_state(pool.clone());

        let intent = succeeded_intent("pi_ghost", Uuid::new_v4(), "10", 5_000);
        fulfill(&state, &intent).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credit_purchases")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[sqlx::test]
    async fn unusable_metadata_is_skipped(pool: PgPool) {
        let state = test_state(pool.clone());
        let user_id = seed_user(&pool, 5).await;

        let intent = PaymentIntentObject {
            id: "pi_no_meta".to_string(),
            amount: 5_000,
            metadata: IntentMetadata::default(),
        };
        fulfill(&state, &intent).await.unwrap();

        assert_eq!(balance(&pool, user_id).await, 5);
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credit_purchases")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
