//! # careline-db
//!
//! PostgreSQL database layer for careline.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for every contract in `careline-core`
//! - The scheduled-message queue with `SKIP LOCKED` leasing
//! - Durable analytics storage
//!
//! ## Example
//!
//! ```rust,ignore
//! use careline_db::{Database, EventBus, EventBusConfig, MessageComposer, PostRequest, RoleType};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/careline").await?;
//!     let store = db.store();
//!     let composer = MessageComposer::new(store.clone(), Arc::new(EventBus::new(EventBusConfig::from_env())));
//!
//!     let case = store.cases.get_case(7).await?;
//!     let person_id = store.people.person_id_for_role(RoleType::Patient, case.patient_id).await?;
//!     let sender = store.people.get_people(&[person_id]).await?.remove(&person_id).unwrap();
//!     let id = composer.post(PostRequest::new(case, sender, "Hello")).await?;
//!     println!("Posted message: {}", id);
//!     Ok(())
//! }
//! ```
pub mod analytics;
pub mod cases;
pub mod media;
pub mod messages;
pub mod people;
pub mod pool;
pub mod scheduled_messages;
pub mod treatment_plans;
pub mod visits;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use careline_core::*;

pub use analytics::PgAnalyticsStore;
pub use cases::PgCaseRepository;
pub use media::PgMediaRepository;
pub use messages::PgCaseMessageRepository;
pub use people::PgPeopleRepository;
pub use pool::{create_pool_with_config, PoolConfig};
pub use scheduled_messages::PgScheduledMessageRepository;
pub use treatment_plans::PgTreatmentPlanRepository;
pub use visits::PgVisitRepository;

use std::sync::Arc;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Cases and care team assignments.
    pub cases: PgCaseRepository,
    /// Case messages, attachments, participants and read receipts.
    pub messages: PgCaseMessageRepository,
    /// Patients, doctors and person rows.
    pub people: PgPeopleRepository,
    pub media: PgMediaRepository,
    /// Treatment plans and their bundled scheduled messages.
    pub treatment_plans: PgTreatmentPlanRepository,
    /// Scheduled-message queue and templates.
    pub scheduled_messages: PgScheduledMessageRepository,
    pub visits: PgVisitRepository,
    pub analytics: PgAnalyticsStore,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            cases: PgCaseRepository::new(pool.clone()),
            messages: PgCaseMessageRepository::new(pool.clone()),
            people: PgPeopleRepository::new(pool.clone()),
            media: PgMediaRepository::new(pool.clone()),
            treatment_plans: PgTreatmentPlanRepository::new(pool.clone()),
            scheduled_messages: PgScheduledMessageRepository::new(pool.clone()),
            visits: PgVisitRepository::new(pool.clone()),
            analytics: PgAnalyticsStore::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Repository handles for the messaging core, sharing this pool.
    pub fn store(&self) -> Store {
        Store {
            cases: Arc::new(PgCaseRepository::new(self.pool.clone())),
            messages: Arc::new(PgCaseMessageRepository::new(self.pool.clone())),
            people: Arc::new(PgPeopleRepository::new(self.pool.clone())),
            media: Arc::new(PgMediaRepository::new(self.pool.clone())),
            treatment_plans: Arc::new(PgTreatmentPlanRepository::new(self.pool.clone())),
            scheduled_messages: Arc::new(PgScheduledMessageRepository::new(self.pool.clone())),
            visits: Arc::new(PgVisitRepository::new(self.pool.clone())),
        }
    }

    /// Durable analytics sink sharing this pool.
    pub fn analytics_store(&self) -> Arc<dyn AnalyticsStore> {
        Arc::new(PgAnalyticsStore::new(self.pool.clone()))
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
