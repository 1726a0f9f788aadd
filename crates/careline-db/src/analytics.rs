//! Durable analytics sink.
//!
//! Each batch is written in one transaction so a failed insert drops the
//! whole batch rather than leaving part of it.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use careline_core::{AnalyticsStore, ClientEvent, Error, Result, ServerEvent, WebRequestEvent};

/// PostgreSQL implementation of AnalyticsStore.
pub struct PgAnalyticsStore {
    pool: Pool<Postgres>,
}

impl PgAnalyticsStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalyticsStore for PgAnalyticsStore {
    async fn insert_server_events(&self, events: &[ServerEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        for e in events {
            sqlx::query(
                "INSERT INTO analytics_server_event
                     (event, timestamp, account_id, patient_id, doctor_id, case_id, visit_id,
                      treatment_plan_id, role, extra_json)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(&e.event)
            .bind(e.timestamp)
            .bind(e.account_id)
            .bind(e.patient_id)
            .bind(e.doctor_id)
            .bind(e.case_id)
            .bind(e.visit_id)
            .bind(e.treatment_plan_id)
            .bind(&e.role)
            .bind(&e.extra_json)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn insert_web_request_events(&self, events: &[WebRequestEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        for e in events {
            sqlx::query(
                "INSERT INTO analytics_web_request_event
                     (service, path, timestamp, request_id, status_code, method, url,
                      resp_time_us, remote_addr, user_agent, account_id)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(&e.service)
            .bind(&e.path)
            .bind(e.timestamp)
            .bind(&e.request_id)
            .bind(e.status_code)
            .bind(&e.method)
            .bind(&e.url)
            .bind(e.resp_time_us)
            .bind(&e.remote_addr)
            .bind(&e.user_agent)
            .bind(e.account_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn insert_client_events(&self, events: &[ClientEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        for e in events {
            sqlx::query(
                "INSERT INTO analytics_client_event
                     (event, timestamp, session_id, device_id, account_id, app_type,
                      app_version, extra_json)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(&e.event)
            .bind(e.timestamp)
            .bind(&e.session_id)
            .bind(&e.device_id)
            .bind(e.account_id)
            .bind(&e.app_type)
            .bind(&e.app_version)
            .bind(&e.extra_json)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
