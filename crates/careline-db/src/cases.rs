//! Case and care team repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use careline_core::{
    AssignmentStatus, CareTeamAssignment, CaseRepository, CaseStatus, Error, PatientCase, Result,
    RoleType,
};

fn parse_case_row(row: &sqlx::postgres::PgRow) -> Result<PatientCase> {
    Ok(PatientCase {
        id: row.get("id"),
        patient_id: row.get("patient_id"),
        pathway_tag: row.get("pathway_tag"),
        status: row.get::<String, _>("status").parse()?,
        created_at: row.get("created_at"),
    })
}

/// PostgreSQL implementation of CaseRepository.
pub struct PgCaseRepository {
    pool: Pool<Postgres>,
}

impl PgCaseRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Open a new case for a patient.
    pub async fn create_case(&self, patient_id: i64, pathway_tag: &str) -> Result<PatientCase> {
        let row = sqlx::query(
            "INSERT INTO patient_case (patient_id, pathway_tag)
             VALUES ($1, $2)
             RETURNING id, patient_id, pathway_tag, status, created_at",
        )
        .bind(patient_id)
        .bind(pathway_tag)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        parse_case_row(&row)
    }

    pub async fn set_status(&self, case_id: i64, status: CaseStatus) -> Result<()> {
        let result = sqlx::query("UPDATE patient_case SET status = $2 WHERE id = $1")
            .bind(case_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::CaseNotFound(case_id));
        }
        Ok(())
    }

    /// Attach a provider to the case, or update the status of an existing row.
    pub async fn assign(
        &self,
        case_id: i64,
        provider_id: i64,
        role: RoleType,
        status: AssignmentStatus,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO care_team_assignment (patient_case_id, provider_id, role_type, status)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (patient_case_id, provider_id, role_type)
             DO UPDATE SET status = EXCLUDED.status",
        )
        .bind(case_id)
        .bind(provider_id)
        .bind(role.as_str())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl CaseRepository for PgCaseRepository {
    async fn get_case(&self, case_id: i64) -> Result<PatientCase> {
        let row = sqlx::query(
            "SELECT id, patient_id, pathway_tag, status, created_at
             FROM patient_case WHERE id = $1",
        )
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => parse_case_row(&row),
            None => Err(Error::CaseNotFound(case_id)),
        }
    }

    async fn cases_for_patient(&self, patient_id: i64) -> Result<Vec<PatientCase>> {
        let rows = sqlx::query(
            "SELECT id, patient_id, pathway_tag, status, created_at
             FROM patient_case WHERE patient_id = $1
             ORDER BY created_at, id",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(parse_case_row).collect()
    }

    async fn care_team(&self, case_id: i64) -> Result<Vec<CareTeamAssignment>> {
        let rows = sqlx::query(
            "SELECT patient_case_id, provider_id, role_type, status
             FROM care_team_assignment WHERE patient_case_id = $1
             ORDER BY created_at",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(CareTeamAssignment {
                    case_id: row.get("patient_case_id"),
                    provider_id: row.get("provider_id"),
                    role: row.get::<String, _>("role_type").parse()?,
                    status: row.get::<String, _>("status").parse()?,
                })
            })
            .collect()
    }

    async fn active_care_team_member(
        &self,
        case_id: i64,
        role: RoleType,
    ) -> Result<Option<CareTeamAssignment>> {
        let row = sqlx::query(
            "SELECT provider_id FROM care_team_assignment
             WHERE patient_case_id = $1 AND role_type = $2 AND status = 'ACTIVE'
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(case_id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| CareTeamAssignment {
            case_id,
            provider_id: row.get("provider_id"),
            role,
            status: AssignmentStatus::Active,
        }))
    }
}
