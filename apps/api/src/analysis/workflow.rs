//! The credit-gated analysis workflow.
//!
//! Invariant: an analysis row exists iff its credit debit committed. Both
//! writes share one transaction, and the debit is guarded, so two racing
//! uploads at balance 1 serialize on the user row and exactly one commits.

use std::path::Path;

use uuid::Uuid;

use crate::analysis::scorer::{CvReport, ScoreRequest};
use crate::analysis::store::{self, NewAnalysis};
use crate::analysis::upload::SpooledUpload;
use crate::auth::users;
use crate::errors::AppError;
use crate::models::user::User;
use crate::state::AppState;

#[derive(Debug)]
pub struct AnalysisOutcome {
    pub analysis_id: Uuid,
    pub report: CvReport,
    pub credits_remaining: i32,
}

/// Runs one upload through validation, scoring, persistence and debit.
///
/// The spooled temp file is removed on every exit path by the upload guard.
/// No credit is consumed unless the analysis row committed.
pub async fn analyze(
    state: &AppState,
    user: &User,
    file_name: &str,
    data: &[u8],
    target_role: Option<String>,
) -> Result<AnalysisOutcome, AppError> {
    // 1. Validate and spool. Rejections here cost nothing: no oracle call,
    //    no credit.
    let upload = SpooledUpload::spool(Path::new(&state.config.upload_dir), file_name, data).await?;

    // 2. Re-read the balance; the session copy may be stale.
    let current = users::get_user(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Usuário não encontrado".to_string()))?;
    if current.credits <= 0 {
        return Err(AppError::InsufficientCredits);
    }

    // 3. Prior analysis feeds the comparative-feedback block.
    let previous = store::latest_for_user(&state.db, user.id).await?;
    let previous_id = previous.as_ref().map(|p| p.id);

    // 4. Submit to the scoring oracle. Any failure surfaces as a scoring
    //    outage; the guard still cleans the spool.
    let file_bytes = upload.read_bytes().await?;
    let report = state
        .scorer
        .score(ScoreRequest {
            file_bytes,
            file_name: upload.file_name().to_string(),
            mime_type: upload.mime_type().to_string(),
            target_role,
            previous_report: previous.map(|p| p.analysis_result),
        })
        .await
        .map_err(|e| AppError::ScoringUnavailable(e.to_string()))?;

    let analysis_result =
        serde_json::to_value(&report).map_err(|e| AppError::Internal(e.into()))?;
    let suggestions =
        serde_json::to_value(&report.suggestions).map_err(|e| AppError::Internal(e.into()))?;

    // 5. Persist and debit atomically. A zero-row debit means another request
    //    spent the last credit after our check in step 2: roll everything
    //    back and report the balance failure.
    let mut tx = state.db.begin().await?;

    let row = store::insert_analysis(
        &mut *tx,
        &NewAnalysis {
            user_id: user.id,
            file_name: upload.file_name().to_string(),
            file_size: upload.size() as i32,
            analysis_result,
            score: report.score,
            suggestions,
            previous_analysis_id: previous_id,
        },
    )
    .await?;

    let credits_remaining = match users::debit_credit(&mut *tx, user.id).await? {
        Some(balance) => balance,
        None => {
            tx.rollback().await?;
            return Err(AppError::InsufficientCredits);
        }
    };

    tx.commit().await?;

    tracing::info!(
        user_id = %user.id,
        analysis_id = %row.id,
        score = report.score,
        credits_remaining,
        "CV analysis completed"
    );

    Ok(AnalysisOutcome {
        analysis_id: row.id,
        report,
        credits_remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use sqlx::PgPool;

    use crate::analysis::scorer::{parse_report, CvScorer, ScorerError};
    use crate::config::Config;
    use crate::payments::stripe::StripeClient;
    use crate::settings::SettingsStore;
    use crate::state::AppState;

    fn sample_report() -> CvReport {
        parse_report(
            &json!({
                "score": 78,
                "overallFeedback": "Currículo sólido",
                "strengths": ["Experiência relevante"],
                "weaknesses": ["Sem métricas"],
                "suggestions": [{
                    "category": "Conteúdo",
                    "recommendation": "Quantifique resultados",
                    "priority": "high"
                }],
                "keywordOptimization": { "present": [], "missing": [] },
                "formatFeedback": { "rating": 4, "comments": [] }
            })
            .to_string(),
        )
        .unwrap()
    }

    /// Scorer double: counts calls, succeeds or fails on demand.
    struct FakeScorer {
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeScorer {
        fn succeeding() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CvScorer for FakeScorer {
        async fn score(&self, _request: ScoreRequest) -> Result<CvReport, ScorerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ScorerError::EmptyContent)
            } else {
                Ok(sample_report())
            }
        }
    }

    fn test_state(pool: PgPool, scorer: Arc<FakeScorer>, upload_dir: &Path) -> AppState {
        AppState {
            db: pool.clone(),
            settings: SettingsStore::new(pool),
            scorer,
            stripe: StripeClient::new(),
            config: Config {
                database_url: String::new(),
                admin_email: "admin@example.com".to_string(),
                admin_password: "admin-password".to_string(),
                upload_dir: upload_dir.to_string_lossy().into_owned(),
                port: 0,
                rust_log: "info".to_string(),
            },
        }
    }

    async fn seed_user(pool: &PgPool, credits: i32) -> User {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, credits)
            VALUES ($1, $2, 'x', 'Ana', 'Silva', $3)
            "#,
        )
        .bind(id)
        .bind(format!("{id}@example.com"))
        .bind(credits)
        .execute(pool)
        .await
        .unwrap();
        users::get_user(pool, id).await.unwrap().unwrap()
    }

    async fn balance(pool: &PgPool, user_id: Uuid) -> i32 {
        sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn analysis_count(pool: &PgPool, user_id: Uuid) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM cv_analyses WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn success_stores_one_row_and_debits_one_credit(pool: PgPool) {
        let dir = tempfile::tempdir().unwrap();
        let scorer = FakeScorer::succeeding();
        let state = test_state(pool.clone(), scorer.clone(), dir.path());
        let user = seed_user(&pool, 2).await;

        let first = analyze(&state, &user, "cv.pdf", b"%PDF-1.4 primeiro", None)
            .await
            .unwrap();
        assert_eq!(first.credits_remaining, 1);
        assert_eq!(first.report.score, 78);
        assert_eq!(balance(&pool, user.id).await, 1);
        assert_eq!(analysis_count(&pool, user.id).await, 1);

        // The second run links back to the first for comparative feedback.
        let second = analyze(&state, &user, "cv.pdf", b"%PDF-1.4 segundo", None)
            .await
            .unwrap();
        assert_eq!(second.credits_remaining, 0);
        assert_eq!(analysis_count(&pool, user.id).await, 2);

        let previous: Option<Uuid> = sqlx::query_scalar(
            "SELECT previous_analysis_id FROM cv_analyses WHERE id = $1",
        )
        .bind(second.analysis_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(previous, Some(first.analysis_id));
        assert_eq!(scorer.calls(), 2);
    }

    #[sqlx::test]
    async fn scorer_failure_leaves_no_row_and_no_debit(pool: PgPool) {
        let dir = tempfile::tempdir().unwrap();
        let scorer = FakeScorer::failing();
        let state = test_state(pool.clone(), scorer.clone(), dir.path());
        let user = seed_user(&pool, 2).await;

        let err = analyze(&state, &user, "cv.pdf", b"%PDF-1.4", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ScoringUnavailable(_)));
        assert_eq!(scorer.calls(), 1);
        assert_eq!(balance(&pool, user.id).await, 2);
        assert_eq!(analysis_count(&pool, user.id).await, 0);
    }

    #[sqlx::test]
    async fn zero_balance_fails_before_any_oracle_call(pool: PgPool) {
        let dir = tempfile::tempdir().unwrap();
        let scorer = FakeScorer::succeeding();
        let state = test_state(pool.clone(), scorer.clone(), dir.path());
        let user = seed_user(&pool, 0).await;

        let err = analyze(&state, &user, "cv.pdf", b"%PDF-1.4", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientCredits));
        assert_eq!(scorer.calls(), 0);
        assert_eq!(balance(&pool, user.id).await, 0);
        assert_eq!(analysis_count(&pool, user.id).await, 0);
    }

    #[sqlx::test]
    async fn racing_uploads_at_balance_one_debit_exactly_once(pool: PgPool) {
        let dir = tempfile::tempdir().unwrap();
        let scorer = FakeScorer::succeeding();
        let state = test_state(pool.clone(), scorer.clone(), dir.path());
        let user = seed_user(&pool, 1).await;

        // Both pass the balance check before either debit commits; the
        // guarded decrement lets exactly one through.
        let (a, b) = tokio::join!(
            analyze(&state, &user, "cv.pdf", b"%PDF-1.4 a", None),
            analyze(&state, &user, "cv.pdf", b"%PDF-1.4 b", None),
        );

        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        for result in [a, b] {
            if let Err(err) = result {
                assert!(matches!(err, AppError::InsufficientCredits));
            }
        }
        assert_eq!(balance(&pool, user.id).await, 0);
        assert_eq!(analysis_count(&pool, user.id).await, 1);
    }
}
