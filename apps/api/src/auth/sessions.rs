use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::user::{SessionRow, User};

/// Cookie name carrying the opaque session token.
pub const SESSION_COOKIE: &str = "session";
/// Fixed session lifetime.
pub const SESSION_TTL_DAYS: i64 = 7;

/// Persists a new session row and returns it. The token is the only secret;
/// nothing user-identifying lives in the cookie itself.
pub async fn create_session(pool: &PgPool, user_id: Uuid) -> Result<SessionRow, sqlx::Error> {
    let expires_at = Utc::now() + Duration::days(SESSION_TTL_DAYS);
    sqlx::query_as::<_, SessionRow>(
        r#"
        INSERT INTO sessions (token, user_id, expires_at)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(expires_at)
    .fetch_one(pool)
    .await
}

/// Resolves a session token to its user. Expired sessions resolve to `None`.
pub async fn find_user_for_token(pool: &PgPool, token: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT u.* FROM users u
        JOIN sessions s ON s.user_id = u.id
        WHERE s.token = $1 AND s.expires_at > now()
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await
}

/// Destroys a session server-side. Logout is complete once the row is gone —
/// a replayed cookie no longer resolves.
pub async fn delete_session(pool: &PgPool, token: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Sweeps expired rows. Called at startup; correctness never depends on it
/// because lookups filter on `expires_at`.
pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Builds the Set-Cookie value for a fresh session.
pub fn session_cookie(token: Uuid) -> String {
    format!(
        "{SESSION_COOKIE}={token}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        Duration::days(SESSION_TTL_DAYS).num_seconds()
    )
}

/// Builds the Set-Cookie value that clears the session on logout.
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0")
}

/// Extracts the session token from a Cookie header value.
pub fn token_from_cookie_header(header: &str) -> Option<Uuid> {
    header
        .split(';')
        .find_map(|part| part.trim().strip_prefix("session="))
        .and_then(|raw| Uuid::parse_str(raw).ok())
}
