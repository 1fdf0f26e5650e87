use sqlx::postgres::Postgres;
use sqlx::{Executor, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::errors::AppError;
use crate::models::user::User;

/// Credits granted to every new account.
pub const STARTING_CREDITS: i32 = 2;
/// Credits granted to the bootstrap admin account.
const ADMIN_BOOTSTRAP_CREDITS: i32 = 100;

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

/// Creates a local account with the starting credit grant.
/// A duplicate email surfaces as `DuplicateEmail` via the unique index —
/// no read-then-insert window.
pub async fn create_user(pool: &PgPool, new_user: NewUser<'_>) -> Result<User, AppError> {
    let password_hash = hash_password(new_user.password).map_err(AppError::Internal)?;

    let result = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, password_hash, first_name, last_name, credits, is_admin, auth_provider)
        VALUES ($1, $2, $3, $4, $5, $6, FALSE, 'local')
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new_user.email)
    .bind(&password_hash)
    .bind(new_user.first_name)
    .bind(new_user.last_name)
    .bind(STARTING_CREDITS)
    .fetch_one(pool)
    .await;

    match result {
        Ok(user) => Ok(user),
        Err(e) if is_unique_violation(&e) => Err(AppError::DuplicateEmail),
        Err(e) => Err(AppError::Database(e)),
    }
}

/// Verifies credentials. Returns `None` for an unknown email and for a wrong
/// password alike — callers cannot tell which factor failed.
pub async fn authenticate(
    pool: &PgPool,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    let Some(user) = find_by_email(pool, email).await? else {
        return Ok(None);
    };
    let valid = verify_password(password, &user.password_hash).map_err(AppError::Internal)?;
    Ok(valid.then_some(user))
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn get_user(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Debits exactly one credit. The `credits > 0` guard makes concurrent debits
/// serialize on the row: the loser matches nothing and gets `None`, so a
/// balance can never go negative. Runs on any executor so the analysis
/// workflow can call it inside its transaction.
pub async fn debit_credit<'e, E>(executor: E, user_id: Uuid) -> Result<Option<i32>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(
        r#"
        UPDATE users
        SET credits = credits - 1, updated_at = now()
        WHERE id = $1 AND credits > 0
        RETURNING credits
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

/// Credits `amount` to a user's balance, returning the new balance, or `None`
/// for an unknown user id.
pub async fn credit_credits<'e, E>(
    executor: E,
    user_id: Uuid,
    amount: i32,
) -> Result<Option<i32>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(
        r#"
        UPDATE users
        SET credits = credits + $2, updated_at = now()
        WHERE id = $1
        RETURNING credits
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(executor)
    .await
}

/// Startup bootstrap: guarantees the designated admin account exists.
/// Checked by email, created only if absent — safe to run on every boot.
pub async fn ensure_admin_user(pool: &PgPool, email: &str, password: &str) -> anyhow::Result<()> {
    if find_by_email(pool, email).await?.is_some() {
        return Ok(());
    }

    let password_hash = hash_password(password)?;
    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, first_name, last_name, credits, is_admin, auth_provider)
        VALUES ($1, $2, $3, 'Admin', 'CVIntelligence', $4, TRUE, 'local')
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(&password_hash)
    .bind(ADMIN_BOOTSTRAP_CREDITS)
    .execute(pool)
    .await?;

    info!("Admin user created: {email}");
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
