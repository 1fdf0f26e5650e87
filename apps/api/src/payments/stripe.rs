//! Minimal Stripe REST client and webhook event types.
//!
//! Only the two calls the product needs: create a PaymentIntent and read the
//! `payment_intent.succeeded` event. The secret key comes from the settings
//! store on every call, never from process env.

use anyhow::anyhow;
use reqwest::Client;
use serde::Deserialize;

use crate::errors::AppError;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Intent metadata round-tripped through Stripe. Written on creation, read
/// back by the webhook to know whom to credit.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct IntentMetadata {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub credits: Option<String>,
    #[serde(rename = "packageName")]
    pub package_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatedIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
}

/// One event from the webhook body. `data.object` stays untyped until the
/// event type is known.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// The `payment_intent` object inside a `payment_intent.succeeded` event.
#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub metadata: IntentMetadata,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
}

impl StripeClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Creates a PaymentIntent via the form-encoded REST API and returns its
    /// client secret. No local state is touched; credits land only through
    /// the webhook.
    pub async fn create_payment_intent(
        &self,
        secret_key: &str,
        amount: i64,
        currency: &str,
        user_id: &str,
        credits: i32,
        package_name: &str,
    ) -> Result<CreatedIntent, AppError> {
        let params = [
            ("amount", amount.to_string()),
            ("currency", currency.to_string()),
            ("metadata[userId]", user_id.to_string()),
            ("metadata[credits]", credits.to_string()),
            ("metadata[packageName]", package_name.to_string()),
        ];

        let response = self
            .client
            .post(format!("{STRIPE_API_BASE}/payment_intents"))
            .basic_auth(secret_key, None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow!("Stripe request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .ok()
                .and_then(|envelope| envelope.error.message)
                .unwrap_or(body);
            return Err(AppError::Internal(anyhow!(
                "Stripe API error (status {status}): {message}"
            )));
        }

        response
            .json::<CreatedIntent>()
            .await
            .map_err(|e| AppError::Internal(anyhow!("Invalid Stripe response: {e}")))
    }
}

impl Default for StripeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn webhook_event_parses_succeeded_intent() {
        let body = json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {
                "object": {
                    "id": "pi_123",
                    "amount": 2500,
                    "metadata": {
                        "userId": "7f8b9e7a-3f60-4f34-a95e-5f2b8a9c1d0e",
                        "credits": "5",
                        "packageName": "premium"
                    }
                }
            }
        });

        let event: WebhookEvent = serde_json::from_value(body).unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");

        let intent: PaymentIntentObject = serde_json::from_value(event.data.object).unwrap();
        assert_eq!(intent.id, "pi_123");
        assert_eq!(intent.amount, 2500);
        assert_eq!(intent.metadata.credits.as_deref(), Some("5"));
        assert_eq!(intent.metadata.package_name.as_deref(), Some("premium"));
    }

    #[test]
    fn intent_without_metadata_parses_empty() {
        let intent: PaymentIntentObject =
            serde_json::from_value(json!({ "id": "pi_1", "amount": 500 })).unwrap();
        assert!(intent.metadata.user_id.is_none());
        assert!(intent.metadata.credits.is_none());
    }
}
