//! # careline-core
//!
//! Core types, traits, and messaging rules for the careline case-messaging
//! engine.
//!
//! This crate provides the domain model, the repository contracts the other
//! careline crates implement, the process-local event bus, and the
//! components that sit on it: access decisions, the message composer,
//! analytics forwarding and the listeners that enqueue scheduled messages.

pub mod access;
pub mod analytics;
pub mod composer;
pub mod defaults;
pub mod error;
pub mod events;
pub mod listeners;
pub mod logging;
pub mod memory;
pub mod models;
pub mod templates;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use access::{AccessGuard, AccessIntent, RequestContext};
pub use analytics::{
    AnalyticsEvent, AnalyticsForwarder, AnalyticsLogger, AnalyticsStore, ClientEvent, Eventer,
    ServerEvent, TracingAnalyticsLogger, WebRequestEvent,
};
pub use composer::{AssignRequest, MessageComposer, PostRequest};
pub use error::{Error, Result};
pub use events::{
    handler_fn, AppEvent, CaseAssignEvent, DomainEvent, EventBus, EventBusConfig, EventHandler,
    EventKind, PostEvent, ReadEvent, TreatmentPlanEvent, VisitEvent, VisitSubmittedEvent,
};
pub use listeners::register_listeners;
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
