use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::analysis::scorer::CvReport;
use crate::analysis::store;
use crate::analysis::workflow;
use crate::auth::extract::CurrentUser;
use crate::errors::AppError;
use crate::models::analysis::CvAnalysisRow;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCvResponse {
    pub analysis_id: Uuid,
    pub analysis: CvReport,
    pub credits_remaining: i32,
}

/// POST /api/upload-cv
///
/// Multipart: `cv` file field plus an optional `targetRole` text field.
/// Runs the full credit-gated workflow and returns the structured report.
pub async fn upload_cv(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<UploadCvResponse>, AppError> {
    let mut file: Option<(String, axum::body::Bytes)> = None;
    let mut target_role: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::Validation("Falha ao processar o envio".to_string()))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("cv") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::Validation("Falha ao ler o arquivo enviado".to_string()))?;
                file = Some((file_name, data));
            }
            Some("targetRole") => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| AppError::Validation("Falha ao processar o envio".to_string()))?;
                let text = text.trim().to_string();
                if !text.is_empty() {
                    target_role = Some(text);
                }
            }
            _ => {}
        }
    }

    let (file_name, data) =
        file.ok_or_else(|| AppError::Validation("Nenhum arquivo enviado".to_string()))?;

    let outcome = workflow::analyze(&state, &user, &file_name, &data, target_role).await?;

    Ok(Json(UploadCvResponse {
        analysis_id: outcome.analysis_id,
        analysis: outcome.report,
        credits_remaining: outcome.credits_remaining,
    }))
}

/// GET /api/analyses
///
/// The caller's analysis history, newest first.
pub async fn list_analyses(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<CvAnalysisRow>>, AppError> {
    let analyses = store::list_for_user(&state.db, user.id).await?;
    Ok(Json(analyses))
}

/// GET /api/analyses/:id
///
/// One analysis; owners only.
pub async fn get_analysis(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CvAnalysisRow>, AppError> {
    let analysis = store::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Análise não encontrada".to_string()))?;

    if analysis.user_id != user.id {
        return Err(AppError::Forbidden);
    }

    Ok(Json(analysis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upload_response_serializes_camel_case() {
        let report: CvReport = serde_json::from_value(json!({
            "score": 82,
            "overallFeedback": "Bom currículo",
            "strengths": [],
            "weaknesses": [],
            "suggestions": [],
            "keywordOptimization": { "present": [], "missing": [] },
            "formatFeedback": { "rating": 4, "comments": [] }
        }))
        .unwrap();

        let response = UploadCvResponse {
            analysis_id: Uuid::new_v4(),
            analysis: report,
            credits_remaining: 1,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("analysisId").is_some());
        assert_eq!(value["creditsRemaining"], json!(1));
        assert_eq!(value["analysis"]["score"], json!(82));
    }
}
