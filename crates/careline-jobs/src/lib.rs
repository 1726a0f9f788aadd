//! # careline-jobs
//!
//! Scheduled-message delivery for careline.
//!
//! This crate provides:
//! - A lease loop over the scheduled-message queue
//! - One deliverer per payload kind (case message, email, treatment plan message)
//! - Worker events via broadcast channels
//! - Stale-lease recovery and graceful shutdown
//!
//! ## Example
//!
//! ```ignore
//! use careline_jobs::{WorkerBuilder, WorkerConfig};
//!
//! let worker = WorkerBuilder::new(db.store())
//!     .with_config(WorkerConfig::from_env())
//!     .with_standard_deliverers(composer, None)
//!     .build()
//!     .await;
//!
//! let handle = worker.start();
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod deliverers;
pub mod handler;
pub mod worker;

// Re-export core types
pub use careline_core::*;

pub use deliverers::{
    CaseMessageDeliverer, EmailDeliverer, HttpEmailService, TreatmentPlanMessageDeliverer,
};
pub use handler::{Deliverer, DeliveryOutcome};
pub use worker::{ScheduledMessageWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
