//! Analytics records and the forwarder that routes them to sinks.
//!
//! Records are produced two ways: a curated set of domain events is
//! translated into [`ServerEvent`]s, and any event implementing [`Eventer`]
//! contributes its own records. Every record goes to the best-effort
//! [`AnalyticsLogger`]; a durable [`AnalyticsStore`] additionally receives
//! each record kind through its own method. Failures are logged, never
//! returned.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::error::Result;
use crate::events::{AppEvent, DomainEvent, EventBus, EventHandler, EventKind};

// =============================================================================
// RECORDS
// =============================================================================

/// Backend-side occurrence worth counting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub account_id: Option<i64>,
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub case_id: Option<i64>,
    pub visit_id: Option<i64>,
    pub treatment_plan_id: Option<i64>,
    pub role: Option<String>,
    pub extra_json: Option<JsonValue>,
}

impl ServerEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            timestamp: Utc::now(),
            ..Default::default()
        }
    }
}

/// One handled HTTP request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebRequestEvent {
    pub service: String,
    pub path: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub status_code: i32,
    pub method: String,
    pub url: String,
    pub resp_time_us: i64,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub account_id: Option<i64>,
}

/// Interaction reported by a client app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<String>,
    pub device_id: Option<String>,
    pub account_id: Option<i64>,
    pub app_type: Option<String>,
    pub app_version: Option<String>,
    pub extra_json: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    Server(ServerEvent),
    #[serde(rename = "webrequest")]
    Web(WebRequestEvent),
    Client(ClientEvent),
}

impl AnalyticsEvent {
    pub fn category(&self) -> &'static str {
        match self {
            AnalyticsEvent::Server(_) => "server",
            AnalyticsEvent::Web(_) => "webrequest",
            AnalyticsEvent::Client(_) => "client",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AnalyticsEvent::Server(e) => &e.event,
            AnalyticsEvent::Web(_) => "webrequest",
            AnalyticsEvent::Client(e) => &e.event,
        }
    }
}

/// An event value that carries its own analytics records.
pub trait Eventer {
    fn analytics_events(&self) -> Vec<AnalyticsEvent>;
}

impl Eventer for AppEvent {
    fn analytics_events(&self) -> Vec<AnalyticsEvent> {
        vec![AnalyticsEvent::Client(ClientEvent {
            event: format!("{}_{}", self.resource, self.action),
            timestamp: self.timestamp,
            session_id: self.session_id.clone(),
            device_id: self.device_id.clone(),
            account_id: Some(self.account_id),
            extra_json: Some(json!({
                "resource_id": self.resource_id,
                "role": self.role.as_str(),
            })),
            ..Default::default()
        })]
    }
}

impl Eventer for WebRequestEvent {
    fn analytics_events(&self) -> Vec<AnalyticsEvent> {
        vec![AnalyticsEvent::Web(self.clone())]
    }
}

/// Domain events translated into server records by the forwarder.
pub const CURATED_EVENT_KINDS: &[EventKind] = &[
    EventKind::TreatmentPlanStarted,
    EventKind::TreatmentPlanActivated,
    EventKind::TreatmentPlanSubmitted,
    EventKind::VisitStarted,
    EventKind::VisitSubmitted,
    EventKind::VisitCharged,
    EventKind::VisitMarkedUnsuitable,
    EventKind::DiagnosisModified,
    EventKind::VisitOpened,
];

/// Server records for a curated domain event; empty for anything else.
pub fn server_events_for(event: &DomainEvent) -> Vec<AnalyticsEvent> {
    let record = match event {
        DomainEvent::TreatmentPlanStarted(e)
        | DomainEvent::TreatmentPlanActivated(e)
        | DomainEvent::TreatmentPlanSubmitted(e) => {
            let name = match event {
                DomainEvent::TreatmentPlanStarted(_) => "treatment_plan_started",
                DomainEvent::TreatmentPlanActivated(_) => "treatment_plan_activated",
                _ => "treatment_plan_submitted",
            };
            ServerEvent {
                patient_id: Some(e.patient_id),
                doctor_id: Some(e.doctor_id),
                case_id: Some(e.case_id),
                treatment_plan_id: Some(e.treatment_plan_id),
                ..ServerEvent::new(name)
            }
        }
        DomainEvent::VisitStarted(e)
        | DomainEvent::VisitCharged(e)
        | DomainEvent::VisitMarkedUnsuitable(e)
        | DomainEvent::VisitOpened(e) => {
            let name = match event {
                DomainEvent::VisitStarted(_) => "visit_started",
                DomainEvent::VisitCharged(_) => "visit_charged",
                DomainEvent::VisitMarkedUnsuitable(_) => "visit_marked_unsuitable",
                _ => "visit_opened",
            };
            ServerEvent {
                account_id: e.account_id,
                patient_id: Some(e.patient_id),
                doctor_id: e.doctor_id,
                case_id: Some(e.case_id),
                visit_id: Some(e.visit_id),
                ..ServerEvent::new(name)
            }
        }
        DomainEvent::VisitSubmitted(e) => ServerEvent {
            account_id: Some(e.account_id),
            patient_id: Some(e.patient_id),
            case_id: Some(e.case_id),
            visit_id: Some(e.visit_id),
            extra_json: e.insured.map(|insured| json!({ "insured": insured })),
            ..ServerEvent::new("visit_submitted")
        },
        DomainEvent::DiagnosisModified(e) => ServerEvent {
            patient_id: Some(e.patient_id),
            doctor_id: Some(e.doctor_id),
            case_id: Some(e.case_id),
            visit_id: Some(e.visit_id),
            ..ServerEvent::new("diagnosis_modified")
        },
        _ => return Vec::new(),
    };
    vec![AnalyticsEvent::Server(record)]
}

// =============================================================================
// SINKS
// =============================================================================

/// Best-effort record of every analytics event.
pub trait AnalyticsLogger: Send + Sync {
    fn log_events(&self, events: &[AnalyticsEvent]);
}

/// Writes analytics records to the `analytics` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnalyticsLogger;

impl AnalyticsLogger for TracingAnalyticsLogger {
    fn log_events(&self, events: &[AnalyticsEvent]) {
        for event in events {
            match serde_json::to_string(event) {
                Ok(record) => info!(
                    target: "analytics",
                    category = event.category(),
                    name = event.name(),
                    %record,
                    "Analytics event"
                ),
                Err(e) => warn!(target: "analytics", error = %e, "Unserializable analytics event"),
            }
        }
    }
}

/// Durable analytics storage, one method per record kind.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn insert_server_events(&self, events: &[ServerEvent]) -> Result<()>;
    async fn insert_web_request_events(&self, events: &[WebRequestEvent]) -> Result<()>;
    async fn insert_client_events(&self, events: &[ClientEvent]) -> Result<()>;
}

// =============================================================================
// FORWARDER
// =============================================================================

pub struct AnalyticsForwarder {
    logger: Arc<dyn AnalyticsLogger>,
    store: Option<Arc<dyn AnalyticsStore>>,
}

impl AnalyticsForwarder {
    pub fn new(logger: Arc<dyn AnalyticsLogger>) -> Self {
        Self {
            logger,
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn AnalyticsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Log all records, then route each kind to the durable store.
    pub async fn forward(&self, events: Vec<AnalyticsEvent>) {
        if events.is_empty() {
            return;
        }
        self.logger.log_events(&events);

        let Some(store) = &self.store else {
            return;
        };

        let mut server = Vec::new();
        let mut web = Vec::new();
        let mut client = Vec::new();
        for event in events {
            match event {
                AnalyticsEvent::Server(e) => server.push(e),
                AnalyticsEvent::Web(e) => web.push(e),
                AnalyticsEvent::Client(e) => client.push(e),
            }
        }

        if !server.is_empty() {
            if let Err(e) = store.insert_server_events(&server).await {
                warn!(subsystem = "analytics", count = server.len(), error = %e, "Failed to store server events");
            }
        }
        if !web.is_empty() {
            if let Err(e) = store.insert_web_request_events(&web).await {
                warn!(subsystem = "analytics", count = web.len(), error = %e, "Failed to store web request events");
            }
        }
        if !client.is_empty() {
            if let Err(e) = store.insert_client_events(&client).await {
                warn!(subsystem = "analytics", count = client.len(), error = %e, "Failed to store client events");
            }
        }
    }

    /// Subscribe the curated translators and the generic eventer forwarder.
    pub async fn register(self: Arc<Self>, bus: &EventBus) {
        let curated: Arc<dyn EventHandler> = Arc::new(CuratedEventForwarder(self.clone()));
        for kind in CURATED_EVENT_KINDS {
            bus.subscribe_async(*kind, curated.clone()).await;
        }
        bus.subscribe_all_async(Arc::new(EventerForwarder(self))).await;
    }
}

struct CuratedEventForwarder(Arc<AnalyticsForwarder>);

#[async_trait]
impl EventHandler for CuratedEventForwarder {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        self.0.forward(server_events_for(event)).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "analytics_curated"
    }
}

struct EventerForwarder(Arc<AnalyticsForwarder>);

#[async_trait]
impl EventHandler for EventerForwarder {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        if let Some(eventer) = event.as_eventer() {
            self.0.forward(eventer.analytics_events()).await;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "analytics_eventer"
    }
}
