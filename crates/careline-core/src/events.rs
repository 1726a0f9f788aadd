//! Domain events and the process-local event bus.
//!
//! Events form a closed set ([`DomainEvent`]). Handlers subscribe to one
//! [`EventKind`] (or to every kind) and run either on the publisher's task,
//! in subscription order, or on a background task.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::analytics::{Eventer, WebRequestEvent};
use crate::error::Result;
use crate::models::{CaseMessage, Doctor, PatientCase, Person, RoleType};

// ============================================================================
// Event payloads
// ============================================================================

/// A message was posted to a case.
#[derive(Debug, Clone)]
pub struct PostEvent {
    pub message: CaseMessage,
    pub case: PatientCase,
    pub person: Person,
}

/// A case was handed between its doctor and care coordinator.
#[derive(Debug, Clone)]
pub struct CaseAssignEvent {
    pub message: CaseMessage,
    /// The person who made the assignment.
    pub person: Person,
    pub case: PatientCase,
    pub doctor: Doctor,
    pub care_coordinator: Doctor,
}

/// A person read every message in a case.
#[derive(Debug, Clone)]
pub struct ReadEvent {
    pub case_id: i64,
    pub person: Person,
}

/// Client-reported interaction, e.g. `case_message` `viewed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEvent {
    pub account_id: i64,
    pub role: RoleType,
    pub resource: String,
    pub resource_id: i64,
    pub action: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TreatmentPlanEvent {
    pub treatment_plan_id: i64,
    pub case_id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
}

#[derive(Debug, Clone)]
pub struct VisitEvent {
    pub visit_id: i64,
    pub case_id: i64,
    pub patient_id: i64,
    pub account_id: Option<i64>,
    pub doctor_id: Option<i64>,
}

/// A patient submitted a visit; `insured` carries the insurance answer when given.
#[derive(Debug, Clone)]
pub struct VisitSubmittedEvent {
    pub visit_id: i64,
    pub case_id: i64,
    pub patient_id: i64,
    pub account_id: i64,
    pub insured: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct DiagnosisModifiedEvent {
    pub visit_id: i64,
    pub case_id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
}

// ============================================================================
// DomainEvent
// ============================================================================

/// Every event the bus carries.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    Post(PostEvent),
    CaseAssign(CaseAssignEvent),
    Read(ReadEvent),
    App(AppEvent),
    TreatmentPlanStarted(TreatmentPlanEvent),
    TreatmentPlanActivated(TreatmentPlanEvent),
    TreatmentPlanSubmitted(TreatmentPlanEvent),
    VisitStarted(VisitEvent),
    VisitSubmitted(VisitSubmittedEvent),
    VisitCharged(VisitEvent),
    VisitMarkedUnsuitable(VisitEvent),
    VisitOpened(VisitEvent),
    DiagnosisModified(DiagnosisModifiedEvent),
    HttpRequestCompleted(WebRequestEvent),
}

/// Subscription key for [`DomainEvent`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Post,
    CaseAssign,
    Read,
    App,
    TreatmentPlanStarted,
    TreatmentPlanActivated,
    TreatmentPlanSubmitted,
    VisitStarted,
    VisitSubmitted,
    VisitCharged,
    VisitMarkedUnsuitable,
    VisitOpened,
    DiagnosisModified,
    HttpRequestCompleted,
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::Post(_) => EventKind::Post,
            DomainEvent::CaseAssign(_) => EventKind::CaseAssign,
            DomainEvent::Read(_) => EventKind::Read,
            DomainEvent::App(_) => EventKind::App,
            DomainEvent::TreatmentPlanStarted(_) => EventKind::TreatmentPlanStarted,
            DomainEvent::TreatmentPlanActivated(_) => EventKind::TreatmentPlanActivated,
            DomainEvent::TreatmentPlanSubmitted(_) => EventKind::TreatmentPlanSubmitted,
            DomainEvent::VisitStarted(_) => EventKind::VisitStarted,
            DomainEvent::VisitSubmitted(_) => EventKind::VisitSubmitted,
            DomainEvent::VisitCharged(_) => EventKind::VisitCharged,
            DomainEvent::VisitMarkedUnsuitable(_) => EventKind::VisitMarkedUnsuitable,
            DomainEvent::VisitOpened(_) => EventKind::VisitOpened,
            DomainEvent::DiagnosisModified(_) => EventKind::DiagnosisModified,
            DomainEvent::HttpRequestCompleted(_) => EventKind::HttpRequestCompleted,
        }
    }

    /// Namespaced event type (e.g., `"case_message.posted"`).
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::Post(_) => "case_message.posted",
            DomainEvent::CaseAssign(_) => "case.assigned",
            DomainEvent::Read(_) => "case_message.read",
            DomainEvent::App(_) => "app.event",
            DomainEvent::TreatmentPlanStarted(_) => "treatment_plan.started",
            DomainEvent::TreatmentPlanActivated(_) => "treatment_plan.activated",
            DomainEvent::TreatmentPlanSubmitted(_) => "treatment_plan.submitted",
            DomainEvent::VisitStarted(_) => "visit.started",
            DomainEvent::VisitSubmitted(_) => "visit.submitted",
            DomainEvent::VisitCharged(_) => "visit.charged",
            DomainEvent::VisitMarkedUnsuitable(_) => "visit.marked_unsuitable",
            DomainEvent::VisitOpened(_) => "visit.opened",
            DomainEvent::DiagnosisModified(_) => "diagnosis.modified",
            DomainEvent::HttpRequestCompleted(_) => "http.request_completed",
        }
    }

    /// Case the event relates to, if any.
    pub fn case_id(&self) -> Option<i64> {
        match self {
            DomainEvent::Post(e) => Some(e.case.id),
            DomainEvent::CaseAssign(e) => Some(e.case.id),
            DomainEvent::Read(e) => Some(e.case_id),
            DomainEvent::TreatmentPlanStarted(e)
            | DomainEvent::TreatmentPlanActivated(e)
            | DomainEvent::TreatmentPlanSubmitted(e) => Some(e.case_id),
            DomainEvent::VisitStarted(e)
            | DomainEvent::VisitCharged(e)
            | DomainEvent::VisitMarkedUnsuitable(e)
            | DomainEvent::VisitOpened(e) => Some(e.case_id),
            DomainEvent::VisitSubmitted(e) => Some(e.case_id),
            DomainEvent::DiagnosisModified(e) => Some(e.case_id),
            DomainEvent::App(_) | DomainEvent::HttpRequestCompleted(_) => None,
        }
    }

    /// Events that carry their own analytics records.
    pub fn as_eventer(&self) -> Option<&dyn Eventer> {
        match self {
            DomainEvent::App(e) => Some(e),
            DomainEvent::HttpRequestCompleted(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Receives published events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<()>;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Adapts an async closure into an [`EventHandler`].
pub struct FnHandler<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

/// Wrap `f` as a handler. The closure receives its own copy of the event.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        f,
        _fut: PhantomData,
    })
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        (self.f)(event.clone()).await
    }

    fn name(&self) -> &'static str {
        "fn_handler"
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Event bus construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventBusConfig {
    /// Run asynchronous subscriptions inline on the publisher's task.
    pub synchronous_only: bool,
}

impl EventBusConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `EVENT_BUS_SYNCHRONOUS` | `false` | Deliver async subscriptions inline |
    pub fn from_env() -> Self {
        let synchronous_only = std::env::var("EVENT_BUS_SYNCHRONOUS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        Self { synchronous_only }
    }

    /// Deterministic delivery for tests.
    pub fn testing() -> Self {
        Self {
            synchronous_only: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sync,
    Async,
}

#[derive(Clone)]
struct Subscription {
    kind: Option<EventKind>,
    delivery: Delivery,
    handler: Arc<dyn EventHandler>,
}

impl Subscription {
    fn matches(&self, kind: EventKind) -> bool {
        self.kind.map_or(true, |k| k == kind)
    }
}

/// Process-local publish/subscribe hub.
///
/// Construct one per process and share it behind an `Arc`.
pub struct EventBus {
    config: EventBusConfig,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            config,
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> EventBusConfig {
        self.config
    }

    /// Register a handler run on the publisher's task. Its error aborts the publish.
    pub async fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.add(Some(kind), Delivery::Sync, handler).await;
    }

    /// Register a handler run on a background task. Its error is logged.
    pub async fn subscribe_async(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.add(Some(kind), Delivery::Async, handler).await;
    }

    /// Register a synchronous handler for every event kind.
    pub async fn subscribe_all(&self, handler: Arc<dyn EventHandler>) {
        self.add(None, Delivery::Sync, handler).await;
    }

    /// Register an asynchronous handler for every event kind.
    pub async fn subscribe_all_async(&self, handler: Arc<dyn EventHandler>) {
        self.add(None, Delivery::Async, handler).await;
    }

    async fn add(&self, kind: Option<EventKind>, delivery: Delivery, handler: Arc<dyn EventHandler>) {
        debug!(?kind, ?delivery, handler = handler.name(), "EventBus subscribe");
        self.subscriptions.write().await.push(Subscription {
            kind,
            delivery,
            handler,
        });
    }

    /// Number of handlers that would receive an event of `kind`.
    pub async fn handler_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|s| s.matches(kind))
            .count()
    }

    async fn matching(&self, kind: EventKind) -> Vec<Subscription> {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|s| s.matches(kind))
            .cloned()
            .collect()
    }

    /// Deliver `event` and wait for every synchronous handler.
    ///
    /// Synchronous handlers run in subscription order; the first error stops
    /// the chain and is returned. Asynchronous handlers are dispatched even
    /// when the chain fails.
    pub async fn publish(&self, event: DomainEvent) -> Result<()> {
        let subs = self.matching(event.kind()).await;
        dispatch(subs, Arc::new(event), self.config.synchronous_only).await
    }

    /// Deliver `event` on a background task and return immediately.
    ///
    /// With `synchronous_only` set, delivery completes before returning.
    pub async fn publish_async(&self, event: DomainEvent) {
        let subs = self.matching(event.kind()).await;
        let event = Arc::new(event);
        if self.config.synchronous_only {
            if let Err(e) = dispatch(subs, event.clone(), true).await {
                warn!(event_type = event.event_type(), error = %e, "Async publish failed");
            }
            return;
        }
        tokio::spawn(async move {
            if let Err(e) = dispatch(subs, event.clone(), false).await {
                warn!(event_type = event.event_type(), error = %e, "Async publish failed");
            }
        });
    }
}

async fn dispatch(
    subs: Vec<Subscription>,
    event: Arc<DomainEvent>,
    synchronous_only: bool,
) -> Result<()> {
    let (sync, background): (Vec<_>, Vec<_>) = subs
        .into_iter()
        .partition(|s| s.delivery == Delivery::Sync);

    debug!(
        event_type = event.event_type(),
        sync_handlers = sync.len(),
        async_handlers = background.len(),
        "EventBus publish"
    );

    let mut outcome = Ok(());
    for sub in &sync {
        if let Err(e) = sub.handler.handle(&event).await {
            debug!(
                event_type = event.event_type(),
                handler = sub.handler.name(),
                error = %e,
                "Synchronous handler failed, stopping chain"
            );
            outcome = Err(e);
            break;
        }
    }

    for sub in background {
        if synchronous_only {
            run_logged(sub.handler, event.clone()).await;
        } else {
            tokio::spawn(run_logged(sub.handler, event.clone()));
        }
    }

    outcome
}

async fn run_logged(handler: Arc<dyn EventHandler>, event: Arc<DomainEvent>) {
    if let Err(e) = handler.handle(&event).await {
        warn!(
            event_type = event.event_type(),
            handler = handler.name(),
            error = %e,
            "Async event handler failed"
        );
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;
    use std::time::Duration;

    fn read_event(case_id: i64) -> DomainEvent {
        DomainEvent::Read(ReadEvent {
            case_id,
            person: Person {
                id: 1,
                role_type: RoleType::Patient,
                role_id: 1,
            },
        })
    }

    fn recorder(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> Arc<dyn EventHandler> {
        handler_fn(move |_event| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(tag.to_string());
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new(EventBusConfig::testing());
        assert!(bus.publish(read_event(1)).await.is_ok());
        assert_eq!(bus.handler_count(EventKind::Read).await, 0);
    }

    #[tokio::test]
    async fn test_sync_handlers_run_in_subscription_order() {
        let bus = EventBus::new(EventBusConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(EventKind::Read, recorder(log.clone(), "first")).await;
        bus.subscribe_all(recorder(log.clone(), "any")).await;
        bus.subscribe(EventKind::Read, recorder(log.clone(), "third")).await;
        bus.subscribe(EventKind::Post, recorder(log.clone(), "other-kind")).await;

        bus.publish(read_event(1)).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first", "any", "third"]);
    }

    #[tokio::test]
    async fn test_first_sync_error_stops_chain_and_is_returned() {
        let bus = EventBus::new(EventBusConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(EventKind::Read, recorder(log.clone(), "before")).await;
        bus.subscribe(
            EventKind::Read,
            handler_fn(|_| async { Err(Error::InvalidInput("rejected".into())) }),
        )
        .await;
        bus.subscribe(EventKind::Read, recorder(log.clone(), "after")).await;

        let err = bus.publish(read_event(1)).await.unwrap_err();

        assert!(err.is_validation());
        assert_eq!(*log.lock().unwrap(), vec!["before"]);
    }

    #[tokio::test]
    async fn test_async_handler_error_is_not_returned() {
        let bus = EventBus::new(EventBusConfig::testing());
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe_async(
            EventKind::Read,
            handler_fn(|_| async { Err(Error::Upstream("sink down".into())) }),
        )
        .await;
        bus.subscribe_async(EventKind::Read, recorder(log.clone(), "async")).await;

        bus.publish(read_event(1)).await.unwrap();

        // Testing mode delivers inline, so the effect is visible immediately.
        assert_eq!(*log.lock().unwrap(), vec!["async"]);
    }

    #[tokio::test]
    async fn test_async_handlers_run_in_background() {
        let bus = EventBus::new(EventBusConfig::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bus.subscribe_async(
            EventKind::Read,
            handler_fn(move |event| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(event.case_id());
                    Ok(())
                }
            }),
        )
        .await;

        bus.publish_async(read_event(77)).await;

        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(Some(77)));
    }

    #[tokio::test]
    async fn test_publish_async_in_testing_mode_completes_before_return() {
        let bus = EventBus::new(EventBusConfig::testing());
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(EventKind::Read, recorder(log.clone(), "sync")).await;
        bus.subscribe_async(EventKind::Read, recorder(log.clone(), "async")).await;

        bus.publish_async(read_event(1)).await;

        assert_eq!(*log.lock().unwrap(), vec!["sync", "async"]);
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(read_event(1).event_type(), "case_message.read");
        assert_eq!(read_event(1).kind(), EventKind::Read);
        assert_eq!(read_event(5).case_id(), Some(5));
        assert!(read_event(1).as_eventer().is_none());
    }

    #[test]
    fn test_app_event_is_eventer() {
        let event = DomainEvent::App(AppEvent {
            account_id: 3,
            role: RoleType::Patient,
            resource: "case_message".into(),
            resource_id: 10,
            action: "viewed".into(),
            session_id: None,
            device_id: None,
            timestamp: Utc::now(),
        });
        let records = event.as_eventer().unwrap().analytics_events();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name(), "case_message_viewed");
    }
}
