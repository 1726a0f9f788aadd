//! Case message repository implementation.
//!
//! Message creation runs in one transaction: the message row, each
//! attachment, the conditional media claim updates, the participant row and
//! the sender's own read receipt commit together or not at all.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use careline_core::{
    Attachment, AttachmentType, CaseMessage, CaseMessageRepository, ClaimerType, Error,
    ListCaseMessagesOptions, NewCaseMessage, Participant, ParticipantProfile, Person,
    ReadReceipt, Result, RoleType,
};

use crate::people::parse_person_row;

/// PostgreSQL implementation of CaseMessageRepository.
pub struct PgCaseMessageRepository {
    pool: Pool<Postgres>,
}

impl PgCaseMessageRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_message_row(row: &sqlx::postgres::PgRow) -> CaseMessage {
        CaseMessage {
            id: row.get("id"),
            case_id: row.get("patient_case_id"),
            person_id: row.get("person_id"),
            body: row.get("body"),
            time: row.get("created_at"),
            is_private: row.get("is_private"),
            event_text: row.get("event_text"),
            attachments: Vec::new(),
            read_receipts: Vec::new(),
        }
    }

    async fn attachments_for(&self, message_ids: &[i64]) -> Result<HashMap<i64, Vec<Attachment>>> {
        let rows = sqlx::query(
            "SELECT id, message_id, item_type, item_id, title, mime_type
             FROM case_message_attachment
             WHERE message_id = ANY($1)
             ORDER BY message_id, position",
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut out: HashMap<i64, Vec<Attachment>> = HashMap::new();
        for row in rows {
            out.entry(row.get("message_id")).or_default().push(Attachment {
                id: row.get("id"),
                item_type: AttachmentType::parse(row.get("item_type"))?,
                item_id: row.get("item_id"),
                title: row.get("title"),
                mime_type: row.get("mime_type"),
            });
        }
        Ok(out)
    }

    async fn receipts_for(&self, message_ids: &[i64]) -> Result<HashMap<i64, Vec<ReadReceipt>>> {
        let rows = sqlx::query(
            "SELECT message_id, person_id, read_at
             FROM case_message_read
             WHERE message_id = ANY($1)
             ORDER BY message_id, read_at, person_id",
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut out: HashMap<i64, Vec<ReadReceipt>> = HashMap::new();
        for row in rows {
            let message_id: i64 = row.get("message_id");
            out.entry(message_id).or_default().push(ReadReceipt {
                message_id,
                person_id: row.get("person_id"),
                time: row.get("read_at"),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl CaseMessageRepository for PgCaseMessageRepository {
    async fn create_message(&self, msg: &NewCaseMessage) -> Result<CaseMessage> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let case_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM patient_case WHERE id = $1)")
                .bind(msg.case_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?;
        if !case_exists {
            return Err(Error::CaseNotFound(msg.case_id));
        }

        let row = sqlx::query(
            "INSERT INTO case_message (patient_case_id, person_id, body, is_private, event_text)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, created_at",
        )
        .bind(msg.case_id)
        .bind(msg.person_id)
        .bind(&msg.body)
        .bind(msg.is_private)
        .bind(&msg.event_text)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;
        let message_id: i64 = row.get("id");
        let created_at: DateTime<Utc> = row.get("created_at");

        let source_type = msg.media_source.map(|c| c.claimer_type.as_str());
        let source_id = msg.media_source.map(|c| c.claimer_id);

        let mut attachments = Vec::with_capacity(msg.attachments.len());
        for (position, a) in msg.attachments.iter().enumerate() {
            let mime_type = if a.item_type.is_media() {
                // Claim only unclaimed media owned by the sender, or media
                // held by the declared source claim.
                let mime: Option<String> = sqlx::query_scalar(
                    "UPDATE media
                     SET claimer_type = $3, claimer_id = $4
                     WHERE id = $1 AND uploader_id = $2
                       AND (claimer_type IS NULL
                            OR (claimer_type = $5 AND claimer_id = $6))
                     RETURNING mime_type",
                )
                .bind(a.item_id)
                .bind(msg.person_id)
                .bind(ClaimerType::ConversationMessage.as_str())
                .bind(message_id)
                .bind(source_type)
                .bind(source_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::Database)?;
                match mime {
                    Some(mime) => Some(mime),
                    None => {
                        return Err(Error::Conflict(format!(
                            "media {} is not claimable by person {}",
                            a.item_id, msg.person_id
                        )))
                    }
                }
            } else {
                a.mime_type.clone()
            };

            let title = a.resolved_title();
            let attachment_id: i64 = sqlx::query_scalar(
                "INSERT INTO case_message_attachment
                     (message_id, position, item_type, item_id, title, mime_type)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id",
            )
            .bind(message_id)
            .bind(position as i32)
            .bind(a.item_type.tag())
            .bind(a.item_id)
            .bind(&title)
            .bind(&mime_type)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;

            attachments.push(Attachment {
                id: attachment_id,
                item_type: a.item_type,
                item_id: a.item_id,
                title,
                mime_type,
            });
        }

        sqlx::query(
            "INSERT INTO case_message_participant (patient_case_id, person_id)
             VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(msg.case_id)
        .bind(msg.person_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO case_message_read (message_id, person_id, read_at)
             VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING",
        )
        .bind(message_id)
        .bind(msg.person_id)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "case_messages",
            op = "create",
            case_id = msg.case_id,
            message_id,
            attachment_count = attachments.len(),
            "Case message stored"
        );

        Ok(CaseMessage {
            id: message_id,
            case_id: msg.case_id,
            person_id: msg.person_id,
            body: msg.body.clone(),
            time: created_at,
            is_private: msg.is_private,
            event_text: msg.event_text.clone(),
            attachments,
            read_receipts: Vec::new(),
        })
    }

    async fn list_case_messages(
        &self,
        case_id: i64,
        opts: ListCaseMessagesOptions,
    ) -> Result<Vec<CaseMessage>> {
        let rows = sqlx::query(
            "SELECT id, patient_case_id, person_id, body, created_at, is_private, event_text
             FROM case_message
             WHERE patient_case_id = $1 AND ($2 OR NOT is_private)
             ORDER BY created_at, id",
        )
        .bind(case_id)
        .bind(opts.include_private)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut messages: Vec<CaseMessage> = rows.iter().map(Self::parse_message_row).collect();
        if messages.is_empty() {
            return Ok(messages);
        }

        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        let mut attachments = self.attachments_for(&ids).await?;
        let mut receipts = if opts.include_read_receipts {
            self.receipts_for(&ids).await?
        } else {
            HashMap::new()
        };
        for m in &mut messages {
            m.attachments = attachments.remove(&m.id).unwrap_or_default();
            m.read_receipts = receipts.remove(&m.id).unwrap_or_default();
        }
        Ok(messages)
    }

    async fn case_message_participants(
        &self,
        case_id: i64,
        with_profiles: bool,
    ) -> Result<HashMap<i64, Participant>> {
        let rows = sqlx::query(
            "SELECT p.id, p.role_type, p.role_id,
                    pt.first_name AS patient_first_name, pt.last_name AS patient_last_name,
                    d.first_name AS doctor_first_name, d.last_name AS doctor_last_name,
                    d.short_display_name, d.long_display_name
             FROM case_message_participant cmp
             JOIN person p ON p.id = cmp.person_id
             LEFT JOIN patient pt ON p.role_type = 'PATIENT' AND pt.id = p.role_id
             LEFT JOIN doctor d ON p.role_type = 'DOCTOR' AND d.id = p.role_id
             WHERE cmp.patient_case_id = $1",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let person: Person = parse_person_row(&row)?;
            let profile = if !with_profiles {
                None
            } else if person.role_type == RoleType::Patient {
                row.get::<Option<String>, _>("patient_first_name")
                    .map(|first_name| {
                        let last_name: String = row.get("patient_last_name");
                        ParticipantProfile {
                            long_display_name: format!("{} {}", first_name, last_name),
                            short_display_name: first_name.clone(),
                            first_name,
                            last_name,
                        }
                    })
            } else {
                row.get::<Option<String>, _>("doctor_first_name")
                    .map(|first_name| ParticipantProfile {
                        first_name,
                        last_name: row.get("doctor_last_name"),
                        short_display_name: row.get("short_display_name"),
                        long_display_name: row.get("long_display_name"),
                    })
            };
            out.insert(person.id, Participant { person, profile });
        }
        Ok(out)
    }

    async fn mark_case_messages_as_read(&self, case_id: i64, person_id: i64) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO case_message_read (message_id, person_id, read_at)
             SELECT id, $2, now() FROM case_message WHERE patient_case_id = $1
             ON CONFLICT (message_id, person_id) DO NOTHING",
        )
        .bind(case_id)
        .bind(person_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "case_messages",
            op = "mark_read",
            case_id,
            person_id,
            row_count = result.rows_affected(),
            "Read receipts recorded"
        );
        Ok(())
    }

    async fn unread_message_count(&self, case_id: i64, person_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM case_message m
             WHERE m.patient_case_id = $1
               AND NOT EXISTS (
                   SELECT 1 FROM case_message_read r
                   WHERE r.message_id = m.id AND r.person_id = $2
               )
               AND NOT (m.is_private AND EXISTS (
                   SELECT 1 FROM person p
                   WHERE p.id = $2 AND p.role_type = 'PATIENT'
               ))",
        )
        .bind(case_id)
        .bind(person_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }

    async fn case_id_for_message(&self, message_id: i64) -> Result<i64> {
        let case_id: Option<i64> =
            sqlx::query_scalar("SELECT patient_case_id FROM case_message WHERE id = $1")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
        case_id.ok_or(Error::MessageNotFound(message_id))
    }
}
