//! Media repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use careline_core::{ClaimerType, Error, Media, MediaClaim, MediaRepository, Result};

pub(crate) fn parse_media_row(row: &sqlx::postgres::PgRow) -> Result<Media> {
    let claimer_type: Option<String> = row.get("claimer_type");
    let claimer_id: Option<i64> = row.get("claimer_id");
    let claim = match (claimer_type, claimer_id) {
        (Some(t), Some(id)) => Some(MediaClaim::new(t.parse::<ClaimerType>()?, id)),
        _ => None,
    };
    Ok(Media {
        id: row.get("id"),
        uploader_id: row.get("uploader_id"),
        url: row.get("url"),
        mime_type: row.get("mime_type"),
        claim,
        uploaded_at: row.get("uploaded_at"),
    })
}

/// PostgreSQL implementation of MediaRepository.
pub struct PgMediaRepository {
    pool: Pool<Postgres>,
}

impl PgMediaRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaRepository for PgMediaRepository {
    async fn add_media(&self, uploader_id: i64, url: &str, mime_type: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO media (uploader_id, url, mime_type) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(uploader_id)
        .bind(url)
        .bind(mime_type)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }

    async fn get_media(&self, media_id: i64) -> Result<Media> {
        let row = sqlx::query(
            "SELECT id, uploader_id, url, mime_type, claimer_type, claimer_id, uploaded_at
             FROM media WHERE id = $1",
        )
        .bind(media_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => parse_media_row(&row),
            None => Err(Error::NotFound(format!("media {}", media_id))),
        }
    }

    async fn claim_media(&self, media_id: i64, claim: MediaClaim) -> Result<()> {
        let result = sqlx::query(
            "UPDATE media SET claimer_type = $2, claimer_id = $3
             WHERE id = $1 AND claimer_type IS NULL",
        )
        .bind(media_id)
        .bind(claim.claimer_type.as_str())
        .bind(claim.claimer_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            // Distinguish a missing row from a lost race.
            self.get_media(media_id).await?;
            return Err(Error::Conflict(format!("media {} already claimed", media_id)));
        }
        Ok(())
    }
}
