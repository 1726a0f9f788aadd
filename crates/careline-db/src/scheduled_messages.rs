//! Scheduled-message queue and template repository implementation.
//!
//! The lease is a single conditional `UPDATE` over a `FOR UPDATE SKIP
//! LOCKED` subselect, so concurrent workers in any number of processes
//! never receive the same row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};

use careline_core::{
    Error, NewScheduledMessage, NewScheduledMessageTemplate, Result, ScheduledMessage,
    ScheduledMessageRepository, ScheduledMessageStatus, ScheduledMessageTemplate,
    ScheduledPayload, ScheduledPayloadKind,
};

const MESSAGE_COLUMNS: &str =
    "id, event, patient_id, payload, scheduled, status, created_at, started_at, completed_at, error";

/// PostgreSQL implementation of ScheduledMessageRepository.
pub struct PgScheduledMessageRepository {
    pool: Pool<Postgres>,
}

impl PgScheduledMessageRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_message_row(row: &sqlx::postgres::PgRow) -> Result<ScheduledMessage> {
        let payload: ScheduledPayload = serde_json::from_value(row.get("payload"))?;
        Ok(ScheduledMessage {
            id: row.get("id"),
            event: row.get("event"),
            patient_id: row.get("patient_id"),
            payload,
            scheduled: row.get("scheduled"),
            status: row.get::<String, _>("status").parse()?,
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            error: row.get("error"),
        })
    }

    fn parse_template_row(row: &sqlx::postgres::PgRow) -> ScheduledMessageTemplate {
        ScheduledMessageTemplate {
            id: row.get("id"),
            name: row.get("name"),
            event: row.get("event"),
            schedule_period_secs: row.get("schedule_period_secs"),
            message: row.get("message"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl ScheduledMessageRepository for PgScheduledMessageRepository {
    async fn create(&self, msg: &NewScheduledMessage) -> Result<i64> {
        let payload = serde_json::to_value(&msg.payload)?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO scheduled_message (event, patient_id, payload_kind, payload, scheduled)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(&msg.event)
        .bind(msg.patient_id)
        .bind(msg.payload.kind().as_str())
        .bind(payload)
        .bind(msg.scheduled)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "scheduled_messages",
            op = "create",
            scheduled_message_id = id,
            payload_kind = msg.payload.kind().as_str(),
            event = %msg.event,
            "Scheduled message queued"
        );
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<ScheduledMessage> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM scheduled_message WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Self::parse_message_row(&row),
            None => Err(Error::NotFound(format!("scheduled message {}", id))),
        }
    }

    async fn lease_next(
        &self,
        kinds: &[ScheduledPayloadKind],
    ) -> Result<Option<ScheduledMessage>> {
        if kinds.is_empty() {
            return Ok(None);
        }
        let now = Utc::now();
        let kind_strings: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();

        // Random pick among due rows; SKIP LOCKED keeps racing workers apart.
        let row = sqlx::query(&format!(
            "UPDATE scheduled_message
             SET status = 'processing', started_at = $1
             WHERE id = (
                 SELECT id FROM scheduled_message
                 WHERE status = 'scheduled'
                   AND scheduled <= $1
                   AND payload_kind = ANY($2)
                 ORDER BY random()
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(now)
        .bind(&kind_strings)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_message_row).transpose()
    }

    async fn update_status(
        &self,
        id: i64,
        status: ScheduledMessageStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE scheduled_message
             SET status = $2,
                 error = $3,
                 started_at = CASE WHEN $2 = 'scheduled' THEN NULL ELSE started_at END,
                 completed_at = CASE WHEN $2 = 'scheduled' THEN completed_at ELSE $4 END
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            let current = self.get(id).await?;
            return Err(Error::Conflict(format!(
                "scheduled message {} is {}, not processing",
                id,
                current.status.as_str()
            )));
        }
        Ok(())
    }

    async fn requeue_stale(&self, started_before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE scheduled_message
             SET status = 'scheduled', started_at = NULL
             WHERE status = 'processing' AND started_at < $1",
        )
        .bind(started_before)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let count = result.rows_affected();
        if count > 0 {
            info!(
                subsystem = "database",
                component = "scheduled_messages",
                op = "requeue_stale",
                row_count = count,
                "Requeued stale scheduled messages"
            );
        }
        Ok(count)
    }

    async fn create_template(&self, template: &NewScheduledMessageTemplate) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO scheduled_message_template (name, event, schedule_period_secs, message)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(&template.name)
        .bind(&template.event)
        .bind(template.schedule_period_secs)
        .bind(&template.message)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }

    async fn templates_for_event(&self, event: &str) -> Result<Vec<ScheduledMessageTemplate>> {
        let rows = sqlx::query(
            "SELECT id, name, event, schedule_period_secs, message, created_at
             FROM scheduled_message_template
             WHERE event = $1
             ORDER BY id",
        )
        .bind(event)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_template_row).collect())
    }
}
