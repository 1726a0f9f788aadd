//! Pending follow-up visits.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::info;

use careline_core::{Error, FollowupVisitStore, Result};

/// Pending follow-up visits in `patient_visit`.
pub struct PgVisitRepository {
    pool: Pool<Postgres>,
}

impl PgVisitRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowupVisitStore for PgVisitRepository {
    async fn pending_followup_for_case(&self, case_id: i64) -> Result<Option<i64>> {
        sqlx::query_scalar(
            "SELECT id FROM patient_visit
             WHERE patient_case_id = $1 AND is_followup AND status = 'PENDING'
             ORDER BY id DESC
             LIMIT 1",
        )
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn create_pending_followup(&self, patient_id: i64, case_id: i64) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO patient_visit (patient_id, patient_case_id, status, is_followup)
             VALUES ($1, $2, 'PENDING', true)
             RETURNING id",
        )
        .bind(patient_id)
        .bind(case_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "visits",
            op = "create_followup",
            case_id,
            visit_id = id,
            "Pending follow-up visit created"
        );
        Ok(id)
    }
}
