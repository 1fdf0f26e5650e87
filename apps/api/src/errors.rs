use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// User-facing messages are pt-BR (the product language). Upstream and
/// database details are logged server-side and never leak to the client.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("Duplicate email")]
    DuplicateEmail,

    #[error("Registrations disabled")]
    RegistrationsDisabled,

    #[error("Insufficient credits")]
    InsufficientCredits,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Scoring unavailable: {0}")]
    ScoringUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::UnsupportedFile(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::DuplicateEmail => (
                StatusCode::BAD_REQUEST,
                "E-mail já cadastrado".to_string(),
            ),
            AppError::RegistrationsDisabled => (
                StatusCode::FORBIDDEN,
                "Novos cadastros estão temporariamente desativados".to_string(),
            ),
            AppError::InsufficientCredits => {
                // Carries the machine-readable flag the client uses to open
                // the purchase flow.
                let body = Json(json!({
                    "message": "Créditos insuficientes. Adquira mais créditos para continuar.",
                    "needsPayment": true
                }));
                return (StatusCode::PAYMENT_REQUIRED, body).into_response();
            }
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Email ou senha inválidos".to_string(),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Autenticação necessária".to_string(),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Acesso negado".to_string()),
            AppError::InvalidSignature(detail) => {
                tracing::warn!("Webhook signature rejected: {detail}");
                (
                    StatusCode::BAD_REQUEST,
                    "Assinatura do webhook inválida".to_string(),
                )
            }
            AppError::ScoringUnavailable(detail) => {
                tracing::error!("Scoring oracle failure: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Erro ao analisar currículo. Tente novamente em alguns minutos.".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Ocorreu um erro interno. Tente novamente.".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Ocorreu um erro interno. Tente novamente.".to_string(),
                )
            }
        };

        let body = Json(json!({ "message": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn insufficient_credits_carries_needs_payment_flag() {
        let (status, body) = body_json(AppError::InsufficientCredits).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["needsPayment"], serde_json::json!(true));
        assert!(body["message"].as_str().unwrap().contains("Créditos"));
    }

    #[tokio::test]
    async fn database_error_never_leaks_detail() {
        let (status, body) = body_json(AppError::Database(sqlx::Error::PoolTimedOut)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["message"].as_str().unwrap();
        assert!(!message.to_lowercase().contains("pool"));
    }

    #[tokio::test]
    async fn unsupported_file_is_client_error() {
        let (status, _) = body_json(AppError::UnsupportedFile(
            "Tipo de arquivo não suportado. Use PDF, DOC ou DOCX.".to_string(),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
