use std::collections::HashMap;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::auth::extract::AdminUser;
use crate::errors::AppError;
use crate::notify;
use crate::settings::{is_allowed_key, ALLOWED_KEYS};
use crate::state::AppState;

/// GET /api/admin/settings
///
/// Every allowlisted key, with `null` for the ones never set. The admin
/// panel renders this as its configuration form.
pub async fn get_settings(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Value>, AppError> {
    let stored = state.settings.all().await?;

    let mut body = Map::new();
    for key in ALLOWED_KEYS {
        let value = stored
            .get(*key)
            .map(|v| Value::String(v.clone()))
            .unwrap_or(Value::Null);
        body.insert((*key).to_string(), value);
    }

    Ok(Json(Value::Object(body)))
}

/// POST /api/admin/settings
///
/// Upserts a batch of settings. The whole batch is rejected if any key is
/// outside the allowlist, so a typo never half-applies.
pub async fn update_settings(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    for key in payload.keys() {
        if !is_allowed_key(key) {
            return Err(AppError::Validation(format!(
                "Chave de configuração não permitida: {key}"
            )));
        }
    }

    for (key, value) in &payload {
        state.settings.set(key, value).await?;
    }

    tracing::info!(admin_id = %admin.id, updated = payload.len(), "Settings updated");

    Ok(Json(json!({ "message": "Configurações salvas com sucesso" })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagePurchases {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub total_users: i64,
    pub new_users_today: i64,
    pub analyses_total: i64,
    pub average_score: f64,
    pub package_purchases: Vec<PackagePurchases>,
}

/// GET /api/admin/dashboard-data
pub async fn dashboard_data(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<DashboardData>, AppError> {
    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await?;

    let new_users_today: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE created_at >= CURRENT_DATE")
            .fetch_one(&state.db)
            .await?;

    let analyses_total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cv_analyses")
        .fetch_one(&state.db)
        .await?;

    let average_score: Option<f64> =
        sqlx::query_scalar("SELECT AVG(score)::float8 FROM cv_analyses")
            .fetch_one(&state.db)
            .await?;

    let package_purchases: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT package_name, COUNT(*) FROM credit_purchases
        GROUP BY package_name
        ORDER BY COUNT(*) DESC
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(DashboardData {
        total_users,
        new_users_today,
        analyses_total,
        average_score: round1(average_score.unwrap_or(0.0)),
        package_purchases: package_purchases
            .into_iter()
            .map(|(name, count)| PackagePurchases { name, count })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UserStatsQuery {
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatBucket {
    pub date: String,
    pub count: i64,
}

/// GET /api/admin/user-stats?period=day|week|month
///
/// Registrations per bucket: trailing 7 days, 8 weeks or 12 months. Empty
/// buckets are present with count 0.
pub async fn user_stats(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<UserStatsQuery>,
) -> Result<Json<Vec<StatBucket>>, AppError> {
    let sql = match query.period.as_deref().unwrap_or("day") {
        "day" => {
            r#"
            SELECT to_char(d, 'YYYY-MM-DD'), COUNT(u.id)
            FROM generate_series(
                CURRENT_DATE - INTERVAL '6 days', CURRENT_DATE, INTERVAL '1 day'
            ) AS d
            LEFT JOIN users u ON u.created_at::date = d::date
            GROUP BY d ORDER BY d
            "#
        }
        "week" => {
            r#"
            SELECT to_char(d, 'YYYY-MM-DD'), COUNT(u.id)
            FROM generate_series(
                date_trunc('week', CURRENT_DATE) - INTERVAL '7 weeks',
                date_trunc('week', CURRENT_DATE),
                INTERVAL '1 week'
            ) AS d
            LEFT JOIN users u ON date_trunc('week', u.created_at) = d
            GROUP BY d ORDER BY d
            "#
        }
        "month" => {
            r#"
            SELECT to_char(d, 'YYYY-MM'), COUNT(u.id)
            FROM generate_series(
                date_trunc('month', CURRENT_DATE) - INTERVAL '11 months',
                date_trunc('month', CURRENT_DATE),
                INTERVAL '1 month'
            ) AS d
            LEFT JOIN users u ON date_trunc('month', u.created_at) = d
            GROUP BY d ORDER BY d
            "#
        }
        other => {
            return Err(AppError::Validation(format!(
                "Período inválido: {other}. Use day, week ou month."
            )))
        }
    };

    let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(&state.db).await?;

    Ok(Json(
        rows.into_iter()
            .map(|(date, count)| StatBucket { date, count })
            .collect(),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStatus {
    pub status: &'static str,
    pub latency_ms: u64,
    pub users: Option<i64>,
    pub analyses: Option<i64>,
    pub purchases: Option<i64>,
}

/// GET /api/admin/db-status
///
/// Timed probe. Reports `"error"` instead of failing the request so the
/// panel can show a degraded database.
pub async fn db_status(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Json<DbStatus> {
    let started = Instant::now();

    let counts: Result<(i64, i64, i64), sqlx::Error> = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users),
            (SELECT COUNT(*) FROM cv_analyses),
            (SELECT COUNT(*) FROM credit_purchases)
        "#,
    )
    .fetch_one(&state.db)
    .await;

    let latency_ms = started.elapsed().as_millis() as u64;

    match counts {
        Ok((users, analyses, purchases)) => Json(DbStatus {
            status: "ok",
            latency_ms,
            users: Some(users),
            analyses: Some(analyses),
            purchases: Some(purchases),
        }),
        Err(e) => {
            tracing::error!("Database probe failed: {e}");
            Json(DbStatus {
                status: "error",
                latency_ms,
                users: None,
                analyses: None,
                purchases: None,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    pub to: String,
}

/// POST /api/admin/test-email
///
/// Fires the notifier at the given address. Always 200: email is
/// best-effort and the outcome lands in the logs.
pub async fn test_email(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<TestEmailRequest>,
) -> Result<Json<Value>, AppError> {
    if let Err(e) = notify::send_test_email(&state.settings, &payload.to).await {
        tracing::warn!(admin_id = %admin.id, "Test email to {} failed: {e:#}", payload.to);
    }

    Ok(Json(json!({ "message": "E-mail de teste disparado" })))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashboard_serializes_camel_case() {
        let data = DashboardData {
            total_users: 10,
            new_users_today: 2,
            analyses_total: 31,
            average_score: 74.5,
            package_purchases: vec![PackagePurchases {
                name: "premium".to_string(),
                count: 4,
            }],
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["totalUsers"], json!(10));
        assert_eq!(value["newUsersToday"], json!(2));
        assert_eq!(value["averageScore"], json!(74.5));
        assert_eq!(value["packagePurchases"][0]["name"], "premium");
    }

    #[test]
    fn average_score_rounds_to_one_decimal() {
        assert_eq!(round1(74.4567), 74.5);
        assert_eq!(round1(0.0), 0.0);
        assert_eq!(round1(99.96), 100.0);
    }

    #[test]
    fn setting_keys_allowlist_guards_unknown_keys() {
        assert!(is_allowed_key(crate::settings::keys::GEMINI_API_KEY));
        assert!(!is_allowed_key("DROP_TABLE_USERS"));
    }
}
