use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// One completed CV analysis. Append-only: rows are never updated or deleted.
///
/// `analysis_result` holds the full structured report; `score` and
/// `suggestions` are denormalized copies for dashboard queries.
/// `previous_analysis_id` points at the analysis used for comparative
/// feedback, if one existed at submission time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CvAnalysisRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub file_size: i32,
    pub analysis_result: Value,
    pub score: i32,
    pub suggestions: Value,
    pub previous_analysis_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_serializes_camel_case() {
        let row = CvAnalysisRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            file_name: "curriculo.pdf".to_string(),
            file_size: 48_213,
            analysis_result: json!({"score": 81}),
            score: 81,
            suggestions: json!([]),
            previous_analysis_id: None,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["fileName"], "curriculo.pdf");
        assert_eq!(value["fileSize"], json!(48_213));
        assert!(value["previousAnalysisId"].is_null());
    }
}
