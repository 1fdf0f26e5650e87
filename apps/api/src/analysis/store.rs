//! Persistence for `cv_analyses`. Append-only: no updates, no deletes.

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::models::analysis::CvAnalysisRow;

pub struct NewAnalysis {
    pub user_id: Uuid,
    pub file_name: String,
    pub file_size: i32,
    pub analysis_result: serde_json::Value,
    pub score: i32,
    pub suggestions: serde_json::Value,
    pub previous_analysis_id: Option<Uuid>,
}

/// Inserts one analysis row. Takes a generic executor so the workflow can run
/// it inside the same transaction as the credit debit.
pub async fn insert_analysis<'e, E>(
    executor: E,
    new: &NewAnalysis,
) -> Result<CvAnalysisRow, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, CvAnalysisRow>(
        r#"
        INSERT INTO cv_analyses
            (id, user_id, file_name, file_size, analysis_result, score,
             suggestions, previous_analysis_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.user_id)
    .bind(&new.file_name)
    .bind(new.file_size)
    .bind(&new.analysis_result)
    .bind(new.score)
    .bind(&new.suggestions)
    .bind(new.previous_analysis_id)
    .fetch_one(executor)
    .await
}

/// All analyses for one user, newest first.
pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<CvAnalysisRow>, sqlx::Error> {
    sqlx::query_as::<_, CvAnalysisRow>(
        "SELECT * FROM cv_analyses WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// The user's most recent analysis, used as the baseline for comparative
/// feedback on the next upload.
pub async fn latest_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<CvAnalysisRow>, sqlx::Error> {
    sqlx::query_as::<_, CvAnalysisRow>(
        "SELECT * FROM cv_analyses WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<CvAnalysisRow>, sqlx::Error> {
    sqlx::query_as::<_, CvAnalysisRow>("SELECT * FROM cv_analyses WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}
