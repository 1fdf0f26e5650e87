use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::extract::CurrentUser;
use crate::auth::sessions;
use crate::auth::users::{self, NewUser};
use crate::errors::AppError;
use crate::models::user::UserSummary;
use crate::notify;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/register
///
/// Creates an account, opens a session and fires the welcome e-mail in the
/// background. Registration can be switched off at runtime by an admin.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    // 1. Honor the runtime registration switch
    if !state.settings.registrations_allowed().await? {
        return Err(AppError::RegistrationsDisabled);
    }

    // 2. Normalize and validate input
    let email = payload.email.trim().to_lowercase();
    let first_name = payload.first_name.trim().to_string();
    let last_name = payload.last_name.trim().to_string();

    if email.is_empty() || first_name.is_empty() || last_name.is_empty() {
        return Err(AppError::Validation(
            "Preencha todos os campos obrigatórios".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(AppError::Validation("Email inválido".to_string()));
    }
    if payload.password.len() < 6 {
        return Err(AppError::Validation(
            "A senha deve ter pelo menos 6 caracteres".to_string(),
        ));
    }

    // 3. Persist the account; the store hashes the password
    let user = users::create_user(
        &state.db,
        NewUser {
            email: &email,
            password: &payload.password,
            first_name: &first_name,
            last_name: &last_name,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "New user registered");

    // 4. Welcome e-mail is best-effort and never blocks the response
    let settings = state.settings.clone();
    let to = user.email.clone();
    let name = user.first_name.clone();
    tokio::spawn(async move {
        if let Err(e) = notify::send_welcome_email(&settings, &to, &name).await {
            tracing::warn!("Failed to send welcome email to {to}: {e:#}");
        }
    });

    // 5. Open the session
    let session = sessions::create_session(&state.db, user.id).await?;

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, sessions::session_cookie(session.token))],
        Json(UserSummary::from(&user)),
    ))
}

/// POST /api/login
///
/// Verifies credentials and opens a session. The response never distinguishes
/// an unknown e-mail from a wrong password.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = payload.email.trim().to_lowercase();

    let user = users::authenticate(&state.db, &email, &payload.password)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let session = sessions::create_session(&state.db, user.id).await?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok((
        [(header::SET_COOKIE, sessions::session_cookie(session.token))],
        Json(UserSummary::from(&user)),
    ))
}

/// POST /api/logout
///
/// Destroys the server-side session if one exists and clears the cookie.
/// Idempotent: succeeds even without a session.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let token = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(sessions::token_from_cookie_header);

    if let Some(token) = token {
        sessions::delete_session(&state.db, token).await?;
    }

    Ok((
        [(header::SET_COOKIE, sessions::clear_session_cookie())],
        Json(json!({ "message": "Logout realizado com sucesso" })),
    ))
}

/// GET /api/auth/user
///
/// Returns the authenticated user, hash omitted. The extractor already
/// rejected anonymous callers.
pub async fn current_user(CurrentUser(user): CurrentUser) -> Json<UserSummary> {
    Json(UserSummary::from(&user))
}
