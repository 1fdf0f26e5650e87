//! Operator-tunable key/value configuration, backed by `app_settings`.
//!
//! The store is deliberately dumb: string in, string out, no caching — every
//! workflow call sees the current value, so operators can rotate an API key
//! or SMTP password without a restart. Callers decide whether a missing or
//! malformed value is an error.

use sqlx::PgPool;

/// Setting keys the admin panel can read and write. Writes outside this list
/// are rejected at the endpoint.
pub mod keys {
    pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
    pub const GEMINI_MODEL_NAME: &str = "GEMINI_MODEL_NAME";
    pub const GEMINI_PROMPT_CV_ANALYSIS: &str = "GEMINI_PROMPT_CV_ANALYSIS";
    pub const GEMINI_TEMPERATURE: &str = "GEMINI_TEMPERATURE";

    pub const STRIPE_SECRET_KEY: &str = "STRIPE_SECRET_KEY";
    pub const STRIPE_PUBLIC_KEY: &str = "STRIPE_PUBLIC_KEY";
    pub const STRIPE_WEBHOOK_SECRET: &str = "STRIPE_WEBHOOK_SECRET";
    pub const STRIPE_PAYMENTS_ENABLED: &str = "STRIPE_PAYMENTS_ENABLED";

    pub const EMAIL_SMTP_HOST: &str = "EMAIL_SMTP_HOST";
    pub const EMAIL_SMTP_PORT: &str = "EMAIL_SMTP_PORT";
    pub const EMAIL_SMTP_USER: &str = "EMAIL_SMTP_USER";
    pub const EMAIL_SMTP_PASSWORD: &str = "EMAIL_SMTP_PASSWORD";
    pub const EMAIL_FROM_ADDRESS: &str = "EMAIL_FROM_ADDRESS";

    pub const ALLOW_NEW_REGISTRATIONS: &str = "ALLOW_NEW_REGISTRATIONS";
    pub const GOOGLE_LOGIN_ENABLED: &str = "GOOGLE_LOGIN_ENABLED";
    pub const GOOGLE_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";
    pub const GOOGLE_CLIENT_SECRET: &str = "GOOGLE_CLIENT_SECRET";
}

/// Full allowlist, including the three configurable credit packages.
pub const ALLOWED_KEYS: &[&str] = &[
    keys::GEMINI_API_KEY,
    keys::GEMINI_MODEL_NAME,
    keys::GEMINI_PROMPT_CV_ANALYSIS,
    keys::GEMINI_TEMPERATURE,
    keys::STRIPE_SECRET_KEY,
    keys::STRIPE_PUBLIC_KEY,
    keys::STRIPE_WEBHOOK_SECRET,
    keys::STRIPE_PAYMENTS_ENABLED,
    keys::EMAIL_SMTP_HOST,
    keys::EMAIL_SMTP_PORT,
    keys::EMAIL_SMTP_USER,
    keys::EMAIL_SMTP_PASSWORD,
    keys::EMAIL_FROM_ADDRESS,
    keys::ALLOW_NEW_REGISTRATIONS,
    keys::GOOGLE_LOGIN_ENABLED,
    keys::GOOGLE_CLIENT_ID,
    keys::GOOGLE_CLIENT_SECRET,
    "CREDIT_BASIC_NAME",
    "CREDIT_BASIC_CREDITS",
    "CREDIT_BASIC_PRICE",
    "CREDIT_BASIC_DESCRIPTION",
    "CREDIT_PREMIUM_NAME",
    "CREDIT_PREMIUM_CREDITS",
    "CREDIT_PREMIUM_PRICE",
    "CREDIT_PREMIUM_DESCRIPTION",
    "CREDIT_ULTIMATE_NAME",
    "CREDIT_ULTIMATE_CREDITS",
    "CREDIT_ULTIMATE_PRICE",
    "CREDIT_ULTIMATE_DESCRIPTION",
];

pub fn is_allowed_key(key: &str) -> bool {
    ALLOWED_KEYS.contains(&key)
}

#[derive(Clone)]
pub struct SettingsStore {
    pool: PgPool,
}

impl SettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the stored value for `key`, or `None` if it was never set.
    /// String-preserving: no trimming, no coercion.
    pub async fn get(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT value FROM app_settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    /// Upserts `key` to `value`. Keys are unique — a second write overwrites.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All stored settings in one round trip, for the admin panel.
    pub async fn all(&self) -> Result<std::collections::HashMap<String, String>, sqlx::Error> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM app_settings")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    /// Whether `/api/register` accepts new accounts. Registrations stay open
    /// unless the operator explicitly stored `"false"`.
    pub async fn registrations_allowed(&self) -> Result<bool, sqlx::Error> {
        let value = self.get(keys::ALLOW_NEW_REGISTRATIONS).await?;
        Ok(registration_flag_allows(value.as_deref()))
    }
}

fn registration_flag_allows(value: Option<&str>) -> bool {
    !matches!(value, Some(v) if v.eq_ignore_ascii_case("false"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_flag_defaults_open() {
        assert!(registration_flag_allows(None));
        assert!(registration_flag_allows(Some("true")));
        assert!(registration_flag_allows(Some("anything-else")));
    }

    #[test]
    fn registration_flag_closes_on_false() {
        assert!(!registration_flag_allows(Some("false")));
        assert!(!registration_flag_allows(Some("FALSE")));
    }

    #[test]
    fn allowlist_covers_operator_panels() {
        for key in [
            "GEMINI_API_KEY",
            "STRIPE_WEBHOOK_SECRET",
            "EMAIL_SMTP_HOST",
            "ALLOW_NEW_REGISTRATIONS",
            "CREDIT_PREMIUM_CREDITS",
        ] {
            assert!(is_allowed_key(key), "{key} missing from allowlist");
        }
        assert!(!is_allowed_key("DATABASE_URL"));
        assert!(!is_allowed_key("gemini_api_key"));
    }
}
