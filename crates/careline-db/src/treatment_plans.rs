//! Treatment plan and plan scheduled-message repository implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use careline_core::{
    AttachmentInput, AttachmentType, ClaimerType, Error, NewTreatmentPlanScheduledMessage, Result,
    TreatmentPlan, TreatmentPlanRepository, TreatmentPlanScheduledMessage, TreatmentPlanStatus,
};

fn parse_plan_row(row: &sqlx::postgres::PgRow) -> Result<TreatmentPlan> {
    Ok(TreatmentPlan {
        id: row.get("id"),
        case_id: row.get("patient_case_id"),
        patient_id: row.get("patient_id"),
        doctor_id: row.get("doctor_id"),
        status: row.get::<String, _>("status").parse()?,
    })
}

/// PostgreSQL implementation of TreatmentPlanRepository.
pub struct PgTreatmentPlanRepository {
    pool: Pool<Postgres>,
}

impl PgTreatmentPlanRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create a plan for a case; the patient is taken from the case.
    pub async fn create_treatment_plan(
        &self,
        case_id: i64,
        doctor_id: i64,
        status: TreatmentPlanStatus,
    ) -> Result<TreatmentPlan> {
        let row = sqlx::query(
            "INSERT INTO treatment_plan (patient_case_id, patient_id, doctor_id, status)
             SELECT id, patient_id, $2, $3 FROM patient_case WHERE id = $1
             RETURNING id, patient_case_id, patient_id, doctor_id, status",
        )
        .bind(case_id)
        .bind(doctor_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => parse_plan_row(&row),
            None => Err(Error::CaseNotFound(case_id)),
        }
    }

    pub async fn set_status(&self, treatment_plan_id: i64, status: TreatmentPlanStatus) -> Result<()> {
        sqlx::query("UPDATE treatment_plan SET status = $2 WHERE id = $1")
            .bind(treatment_plan_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn attachments_for(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<AttachmentInput>>> {
        let rows = sqlx::query(
            "SELECT treatment_plan_scheduled_message_id, item_type, item_id, title, mime_type
             FROM treatment_plan_scheduled_message_attachment
             WHERE treatment_plan_scheduled_message_id = ANY($1)
             ORDER BY treatment_plan_scheduled_message_id, position",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut out: HashMap<i64, Vec<AttachmentInput>> = HashMap::new();
        for row in rows {
            out.entry(row.get("treatment_plan_scheduled_message_id"))
                .or_default()
                .push(AttachmentInput {
                    item_type: AttachmentType::parse(row.get("item_type"))?,
                    item_id: row.get("item_id"),
                    title: row.get("title"),
                    mime_type: row.get("mime_type"),
                });
        }
        Ok(out)
    }

    async fn load_messages(&self, rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<TreatmentPlanScheduledMessage>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.get("id")).collect();
        let mut attachments = self.attachments_for(&ids).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let id: i64 = row.get("id");
                TreatmentPlanScheduledMessage {
                    id,
                    treatment_plan_id: row.get("treatment_plan_id"),
                    scheduled_days: row.get("scheduled_days"),
                    message: row.get("message"),
                    attachments: attachments.remove(&id).unwrap_or_default(),
                    scheduled_message_id: row.get("scheduled_message_id"),
                }
            })
            .collect())
    }
}

#[async_trait]
impl TreatmentPlanRepository for PgTreatmentPlanRepository {
    async fn treatment_plan(&self, treatment_plan_id: i64) -> Result<TreatmentPlan> {
        let row = sqlx::query(
            "SELECT id, patient_case_id, patient_id, doctor_id, status
             FROM treatment_plan WHERE id = $1",
        )
        .bind(treatment_plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => parse_plan_row(&row),
            None => Err(Error::NotFound(format!("treatment plan {}", treatment_plan_id))),
        }
    }

    async fn create_scheduled_message(
        &self,
        msg: &NewTreatmentPlanScheduledMessage,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO treatment_plan_scheduled_message (treatment_plan_id, scheduled_days, message)
             VALUES ($1, $2, $3)
             RETURNING id",
        )
        .bind(msg.treatment_plan_id)
        .bind(msg.scheduled_days)
        .bind(&msg.message)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        for (position, a) in msg.attachments.iter().enumerate() {
            if a.item_type.is_media() {
                let claimed = sqlx::query(
                    "UPDATE media SET claimer_type = $3, claimer_id = $4
                     WHERE id = $1 AND uploader_id = $2 AND claimer_type IS NULL",
                )
                .bind(a.item_id)
                .bind(msg.sender_person_id)
                .bind(ClaimerType::TreatmentPlanScheduledMessage.as_str())
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                if claimed.rows_affected() == 0 {
                    return Err(Error::Conflict(format!(
                        "media {} is not claimable by person {}",
                        a.item_id, msg.sender_person_id
                    )));
                }
            }

            sqlx::query(
                "INSERT INTO treatment_plan_scheduled_message_attachment
                     (treatment_plan_scheduled_message_id, position, item_type, item_id, title, mime_type)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(id)
            .bind(position as i32)
            .bind(a.item_type.tag())
            .bind(a.item_id)
            .bind(&a.title)
            .bind(&a.mime_type)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(id)
    }

    async fn scheduled_message(&self, id: i64) -> Result<TreatmentPlanScheduledMessage> {
        let rows = sqlx::query(
            "SELECT id, treatment_plan_id, scheduled_days, message, scheduled_message_id
             FROM treatment_plan_scheduled_message WHERE id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.load_messages(rows)
            .await?
            .pop()
            .ok_or_else(|| Error::NotFound(format!("treatment plan message {}", id)))
    }

    async fn list_scheduled_messages(
        &self,
        treatment_plan_id: i64,
    ) -> Result<Vec<TreatmentPlanScheduledMessage>> {
        let rows = sqlx::query(
            "SELECT id, treatment_plan_id, scheduled_days, message, scheduled_message_id
             FROM treatment_plan_scheduled_message
             WHERE treatment_plan_id = $1
             ORDER BY scheduled_days, id",
        )
        .bind(treatment_plan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.load_messages(rows).await
    }

    async fn link_scheduled_message(&self, id: i64, scheduled_message_id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE treatment_plan_scheduled_message SET scheduled_message_id = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(scheduled_message_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("treatment plan message {}", id)));
        }
        Ok(())
    }
}
