use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One confirmed credit purchase, written only by the webhook handler.
/// `payment_intent_id` is unique — a redelivered event can never produce a
/// second row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CreditPurchaseRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub package_name: String,
    pub credits: i32,
    /// Amount paid, in minor currency units (centavos). Stripe reports
    /// amounts as 64-bit, stored as-is.
    pub amount: i64,
    pub payment_intent_id: String,
    pub created_at: DateTime<Utc>,
}
