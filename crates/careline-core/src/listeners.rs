//! Event Bus subscribers that react to domain events.
//!
//! - [`ReadFlagListener`] turns "viewed" app events into read receipts.
//! - [`TemplateScheduler`] enqueues templated care-coordinator messages when a
//!   trigger event fires.
//! - [`TreatmentPlanScheduler`] enqueues a plan's bundled messages when the
//!   plan is activated.
//!
//! All of them subscribe asynchronously; their failures are logged by the bus
//! and never reach the publisher.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::access::{AccessGuard, AccessIntent, RequestContext};
use crate::composer::MessageComposer;
use crate::defaults::{
    EVENT_INSURED_PATIENT, EVENT_TREATMENT_PLAN, EVENT_TREATMENT_PLAN_VIEWED,
    EVENT_UNINSURED_PATIENT,
};
use crate::error::{Error, Result};
use crate::events::{
    AppEvent, DomainEvent, EventBus, EventHandler, EventKind, TreatmentPlanEvent,
    VisitSubmittedEvent,
};
use crate::models::{
    CaseMessagePayload, NewScheduledMessage, NewScheduledMessageTemplate, RoleType,
    ScheduledPayload, TreatmentPlanMessagePayload,
};
use crate::templates::{fill_template, validate_template, TemplateValues};
use crate::traits::Store;

/// App event action that marks something as seen.
pub const ACTION_VIEWED: &str = "viewed";

// =============================================================================
// READ FLAGS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadTarget {
    /// `resource_id` is a case id.
    Case,
    /// `resource_id` is a message id.
    Message,
}

const READ_FLAGS: &[(&str, &str, ReadTarget)] = &[
    ("all_case_messages", ACTION_VIEWED, ReadTarget::Case),
    ("case_message", ACTION_VIEWED, ReadTarget::Message),
];

fn read_target(event: &AppEvent) -> Option<ReadTarget> {
    READ_FLAGS
        .iter()
        .find(|(resource, action, _)| *resource == event.resource && *action == event.action)
        .map(|(_, _, target)| *target)
}

/// Marks a case read when the client reports its messages were viewed.
pub struct ReadFlagListener {
    store: Store,
    guard: AccessGuard,
    composer: Arc<MessageComposer>,
}

impl ReadFlagListener {
    pub fn new(store: Store, composer: Arc<MessageComposer>) -> Self {
        let guard = AccessGuard::new(store.cases.clone(), store.people.clone());
        Self {
            store,
            guard,
            composer,
        }
    }

    async fn on_app_event(&self, event: &AppEvent) -> Result<()> {
        let Some(target) = read_target(event) else {
            return Ok(());
        };
        if event.resource_id == 0 {
            return Ok(());
        }

        let case_id = match target {
            ReadTarget::Case => event.resource_id,
            ReadTarget::Message => {
                self.store
                    .messages
                    .case_id_for_message(event.resource_id)
                    .await?
            }
        };
        let case = self.store.cases.get_case(case_id).await?;
        let mut ctx = RequestContext::new(event.account_id, event.role);
        let reader = self
            .guard
            .authorize(&mut ctx, &case, AccessIntent::Read)
            .await?;

        debug!(
            subsystem = "listeners",
            component = "read_flag",
            case_id,
            person_id = reader.id,
            resource = %event.resource,
            "Marking case read"
        );
        self.composer.mark_read(case_id, reader).await
    }
}

#[async_trait]
impl EventHandler for ReadFlagListener {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        match event {
            DomainEvent::App(e) => self.on_app_event(e).await,
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "read_flag_listener"
    }
}

// =============================================================================
// TEMPLATED MESSAGES
// =============================================================================

/// Enqueues templated messages from the case's care coordinator.
pub struct TemplateScheduler {
    store: Store,
}

impl TemplateScheduler {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Store a template after checking its tokens.
    pub async fn create_template(&self, template: &NewScheduledMessageTemplate) -> Result<i64> {
        validate_template(&template.message)?;
        if template.schedule_period_secs < 0 {
            return Err(Error::InvalidInput(
                "schedule period cannot be negative".into(),
            ));
        }
        self.store
            .scheduled_messages
            .create_template(template)
            .await
    }

    /// Enqueue one message per template registered for `event`.
    ///
    /// Returns how many were scheduled. A case without an active care
    /// coordinator schedules nothing.
    pub async fn schedule(&self, event: &str, case_id: i64) -> Result<usize> {
        let templates = self
            .store
            .scheduled_messages
            .templates_for_event(event)
            .await?;
        if templates.is_empty() {
            return Ok(0);
        }

        let case = self.store.cases.get_case(case_id).await?;
        let Some(assignment) = self
            .store
            .cases
            .active_care_team_member(case_id, RoleType::CareCoordinator)
            .await?
        else {
            warn!(
                subsystem = "listeners",
                component = "template_scheduler",
                case_id,
                event,
                "No active care coordinator, skipping templated messages"
            );
            return Ok(0);
        };

        let coordinator = self.store.people.doctor(assignment.provider_id).await?;
        let patient = self.store.people.patient(case.patient_id).await?;
        let sender_person_id = self
            .store
            .people
            .person_id_for_role(RoleType::CareCoordinator, coordinator.id)
            .await?;
        let values = TemplateValues {
            patient_first_name: patient.first_name.clone(),
            provider_short_display_name: coordinator.short_display_name.clone(),
            provider_first_name: coordinator.first_name.clone(),
        };

        let now = Utc::now();
        for template in &templates {
            let body = fill_template(&template.message, &values)?;
            let id = self
                .store
                .scheduled_messages
                .create(&NewScheduledMessage {
                    event: template.event.clone(),
                    patient_id: patient.id,
                    payload: ScheduledPayload::CaseMessage(CaseMessagePayload {
                        case_id,
                        sender_person_id,
                        sender_role: RoleType::CareCoordinator,
                        provider_id: coordinator.id,
                        message: body,
                        attachments: Vec::new(),
                        is_private: false,
                    }),
                    scheduled: now + Duration::seconds(template.schedule_period_secs),
                })
                .await?;
            info!(
                subsystem = "listeners",
                component = "template_scheduler",
                op = "schedule",
                case_id,
                scheduled_message_id = id,
                template = %template.name,
                "Templated message scheduled"
            );
        }
        Ok(templates.len())
    }

    async fn on_visit_submitted(&self, event: &VisitSubmittedEvent) -> Result<()> {
        let tag = match event.insured {
            Some(true) => EVENT_INSURED_PATIENT,
            Some(false) => EVENT_UNINSURED_PATIENT,
            None => return Ok(()),
        };
        // Only the patient's first case gets the insurance message.
        let cases = self.store.cases.cases_for_patient(event.patient_id).await?;
        if cases.iter().any(|c| c.id != event.case_id) {
            return Ok(());
        }
        self.schedule(tag, event.case_id).await.map(|_| ())
    }

    async fn on_app_event(&self, event: &AppEvent) -> Result<()> {
        if event.role != RoleType::Patient
            || event.resource != "treatment_plan"
            || event.action != ACTION_VIEWED
            || event.resource_id == 0
        {
            return Ok(());
        }
        let patient_id = self
            .store
            .people
            .patient_id_for_account(event.account_id)
            .await?;
        let plan = match self
            .store
            .treatment_plans
            .treatment_plan(event.resource_id)
            .await
        {
            Ok(plan) if plan.patient_id == patient_id => plan,
            Ok(_) => {
                warn!(
                    treatment_plan_id = event.resource_id,
                    patient_id, "Viewed treatment plan belongs to another patient"
                );
                return Ok(());
            }
            Err(e) if e.is_not_found() => {
                warn!(treatment_plan_id = event.resource_id, "Viewed treatment plan does not exist");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.schedule(EVENT_TREATMENT_PLAN_VIEWED, plan.case_id)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl EventHandler for TemplateScheduler {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        match event {
            DomainEvent::VisitSubmitted(e) => self.on_visit_submitted(e).await,
            DomainEvent::App(e) => self.on_app_event(e).await,
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "template_scheduler"
    }
}

// =============================================================================
// TREATMENT PLAN MESSAGES
// =============================================================================

/// Enqueues a treatment plan's bundled messages on activation.
pub struct TreatmentPlanScheduler {
    store: Store,
}

impl TreatmentPlanScheduler {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Enqueue every plan message not already linked to the queue.
    pub async fn schedule_plan(&self, event: &TreatmentPlanEvent) -> Result<usize> {
        let entries = self
            .store
            .treatment_plans
            .list_scheduled_messages(event.treatment_plan_id)
            .await?;
        let now = Utc::now();
        let mut scheduled = 0;
        for entry in entries.iter().filter(|m| m.scheduled_message_id.is_none()) {
            let id = self
                .store
                .scheduled_messages
                .create(&NewScheduledMessage {
                    event: EVENT_TREATMENT_PLAN.to_string(),
                    patient_id: event.patient_id,
                    payload: ScheduledPayload::TreatmentPlanMessage(TreatmentPlanMessagePayload {
                        treatment_plan_message_id: entry.id,
                        treatment_plan_id: event.treatment_plan_id,
                        case_id: event.case_id,
                        patient_id: event.patient_id,
                    }),
                    scheduled: now + Duration::days(i64::from(entry.scheduled_days)),
                })
                .await?;
            self.store
                .treatment_plans
                .link_scheduled_message(entry.id, id)
                .await?;
            scheduled += 1;
        }
        info!(
            subsystem = "listeners",
            component = "treatment_plan_scheduler",
            op = "schedule_plan",
            treatment_plan_id = event.treatment_plan_id,
            case_id = event.case_id,
            row_count = scheduled,
            "Treatment plan messages scheduled"
        );
        Ok(scheduled)
    }
}

#[async_trait]
impl EventHandler for TreatmentPlanScheduler {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        match event {
            DomainEvent::TreatmentPlanActivated(e) => self.schedule_plan(e).await.map(|_| ()),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "treatment_plan_scheduler"
    }
}

/// Subscribe the messaging listeners to `bus`.
pub async fn register_listeners(bus: &EventBus, store: Store, composer: Arc<MessageComposer>) {
    let read_flags: Arc<dyn EventHandler> =
        Arc::new(ReadFlagListener::new(store.clone(), composer));
    let templates: Arc<dyn EventHandler> = Arc::new(TemplateScheduler::new(store.clone()));
    let plans: Arc<dyn EventHandler> = Arc::new(TreatmentPlanScheduler::new(store));

    bus.subscribe_async(EventKind::App, read_flags).await;
    bus.subscribe_async(EventKind::App, templates.clone()).await;
    bus.subscribe_async(EventKind::VisitSubmitted, templates).await;
    bus.subscribe_async(EventKind::TreatmentPlanActivated, plans).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBusConfig;
    use crate::memory::MemoryStore;
    use crate::models::{
        AssignmentStatus, AttachmentInput, AttachmentType, ClaimerType, MediaClaim,
        NewTreatmentPlanScheduledMessage, ScheduledMessageStatus, TreatmentPlanStatus,
    };
    use crate::composer::PostRequest;

    struct Fixture {
        store: MemoryStore,
        bus: Arc<EventBus>,
        composer: Arc<MessageComposer>,
        case: crate::models::PatientCase,
        patient_id: i64,
        doctor_id: i64,
        cc_id: i64,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let patient = store.add_patient(10, "Pat", "Jones");
        let doctor = store.add_doctor(20, "Greg", "House");
        let cc = store.add_doctor(30, "Carla", "Coord");
        let case = store.add_case(patient.id, "acne");
        store.assign(case.id, doctor.id, RoleType::Doctor, AssignmentStatus::Active);
        store.assign(case.id, cc.id, RoleType::CareCoordinator, AssignmentStatus::Active);

        let bus = Arc::new(EventBus::new(EventBusConfig::testing()));
        let composer = Arc::new(MessageComposer::new(store.store(), bus.clone()));
        register_listeners(&bus, store.store(), composer.clone()).await;
        Fixture {
            store,
            bus,
            composer,
            case,
            patient_id: patient.id,
            doctor_id: doctor.id,
            cc_id: cc.id,
        }
    }

    fn app_event(account_id: i64, role: RoleType, resource: &str, resource_id: i64) -> DomainEvent {
        DomainEvent::App(AppEvent {
            account_id,
            role,
            resource: resource.into(),
            resource_id,
            action: ACTION_VIEWED.into(),
            session_id: None,
            device_id: None,
            timestamp: Utc::now(),
        })
    }

    async fn add_template(f: &Fixture, event: &str, message: &str) {
        TemplateScheduler::new(f.store.store())
            .create_template(&NewScheduledMessageTemplate {
                name: format!("{}-template", event),
                event: event.into(),
                schedule_period_secs: 3600,
                message: message.into(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_all_case_messages_viewed_marks_read() {
        let f = fixture().await;
        let doctor = f.store.person_for(RoleType::Doctor, f.doctor_id);
        f.composer
            .post(PostRequest::new(f.case.clone(), doctor, "Take this twice daily"))
            .await
            .unwrap();
        let patient = f.store.person_for(RoleType::Patient, f.patient_id);
        assert_eq!(f.composer.unread_count(f.case.id, patient.id).await.unwrap(), 1);

        f.bus
            .publish(app_event(10, RoleType::Patient, "all_case_messages", f.case.id))
            .await
            .unwrap();

        assert_eq!(f.composer.unread_count(f.case.id, patient.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_case_message_viewed_resolves_case_from_message() {
        let f = fixture().await;
        let patient = f.store.person_for(RoleType::Patient, f.patient_id);
        let id = f
            .composer
            .post(PostRequest::new(f.case.clone(), patient, "Itchy today"))
            .await
            .unwrap();
        let doctor = f.store.person_for(RoleType::Doctor, f.doctor_id);

        f.bus
            .publish(app_event(20, RoleType::Doctor, "case_message", id))
            .await
            .unwrap();

        assert_eq!(f.composer.unread_count(f.case.id, doctor.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unrelated_app_events_ignored() {
        let f = fixture().await;
        let patient = f.store.person_for(RoleType::Patient, f.patient_id);
        f.bus
            .publish(app_event(10, RoleType::Patient, "visit", f.case.id))
            .await
            .unwrap();
        f.bus
            .publish(app_event(10, RoleType::Patient, "all_case_messages", 0))
            .await
            .unwrap();
        assert!(f.store.receipts_for(patient.id).is_empty());
    }

    #[tokio::test]
    async fn test_insured_first_visit_schedules_filled_template() {
        let f = fixture().await;
        add_template(
            &f,
            EVENT_INSURED_PATIENT,
            "Hi [Patient.FirstName], I'm [Provider.FirstName] ([Provider.ShortDisplayName]).",
        )
        .await;
        add_template(&f, EVENT_UNINSURED_PATIENT, "Let's talk about costs.").await;

        f.bus
            .publish(DomainEvent::VisitSubmitted(VisitSubmittedEvent {
                visit_id: 1,
                case_id: f.case.id,
                patient_id: f.patient_id,
                account_id: 10,
                insured: Some(true),
            }))
            .await
            .unwrap();

        let queued = f.store.scheduled_messages();
        assert_eq!(queued.len(), 1);
        let msg = &queued[0];
        assert_eq!(msg.event, EVENT_INSURED_PATIENT);
        assert_eq!(msg.status, ScheduledMessageStatus::Scheduled);
        assert!(msg.scheduled > Utc::now() + Duration::minutes(59));
        let ScheduledPayload::CaseMessage(payload) = &msg.payload else {
            panic!("expected case message payload");
        };
        assert_eq!(payload.message, "Hi Pat, I'm Carla (Dr. Coord).");
        assert_eq!(payload.sender_role, RoleType::CareCoordinator);
        assert_eq!(payload.provider_id, f.cc_id);
        assert!(!payload.is_private);
    }

    #[tokio::test]
    async fn test_second_case_gets_no_insurance_message() {
        let f = fixture().await;
        add_template(&f, EVENT_UNINSURED_PATIENT, "Let's talk about costs.").await;
        let second = f.store.add_case(f.patient_id, "rosacea");

        f.bus
            .publish(DomainEvent::VisitSubmitted(VisitSubmittedEvent {
                visit_id: 2,
                case_id: second.id,
                patient_id: f.patient_id,
                account_id: 10,
                insured: Some(false),
            }))
            .await
            .unwrap();

        assert!(f.store.scheduled_messages().is_empty());
    }

    #[tokio::test]
    async fn test_no_active_coordinator_skips() {
        let f = fixture().await;
        add_template(&f, EVENT_INSURED_PATIENT, "Hello [Patient.FirstName]").await;
        f.store.assign(f.case.id, f.cc_id, RoleType::CareCoordinator, AssignmentStatus::Inactive);

        let n = TemplateScheduler::new(f.store.store())
            .schedule(EVENT_INSURED_PATIENT, f.case.id)
            .await
            .unwrap();

        assert_eq!(n, 0);
        assert!(f.store.scheduled_messages().is_empty());
    }

    #[tokio::test]
    async fn test_treatment_plan_viewed_by_patient_schedules() {
        let f = fixture().await;
        add_template(&f, EVENT_TREATMENT_PLAN_VIEWED, "Any questions, [Patient.FirstName]?").await;
        let plan = f
            .store
            .add_treatment_plan(f.case.id, f.doctor_id, TreatmentPlanStatus::Active);

        f.bus
            .publish(app_event(10, RoleType::Patient, "treatment_plan", plan.id))
            .await
            .unwrap();
        f.bus
            .publish(app_event(20, RoleType::Doctor, "treatment_plan", plan.id))
            .await
            .unwrap();

        let queued = f.store.scheduled_messages();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].event, EVENT_TREATMENT_PLAN_VIEWED);
    }

    #[tokio::test]
    async fn test_create_template_rejects_unknown_token() {
        let f = fixture().await;
        let err = TemplateScheduler::new(f.store.store())
            .create_template(&NewScheduledMessageTemplate {
                name: "bad".into(),
                event: EVENT_INSURED_PATIENT.into(),
                schedule_period_secs: 0,
                message: "Hi [Patient.Nickname]".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_activation_enqueues_each_plan_message_once() {
        let f = fixture().await;
        let plan = f
            .store
            .add_treatment_plan(f.case.id, f.doctor_id, TreatmentPlanStatus::Active);
        let doctor = f.store.person_for(RoleType::Doctor, f.doctor_id);
        let photo = f.store.seed_media(doctor.id, "image/png");
        let repo = f.store.store().treatment_plans;
        let first = repo
            .create_scheduled_message(&NewTreatmentPlanScheduledMessage {
                treatment_plan_id: plan.id,
                sender_person_id: doctor.id,
                scheduled_days: 14,
                message: "How is it going?".into(),
                attachments: vec![
                    AttachmentInput::new(AttachmentType::FollowupVisit, 0),
                    AttachmentInput::new(AttachmentType::Photo, photo),
                ],
            })
            .await
            .unwrap();
        repo.create_scheduled_message(&NewTreatmentPlanScheduledMessage {
            treatment_plan_id: plan.id,
            sender_person_id: doctor.id,
            scheduled_days: 3,
            message: "Remember sunscreen".into(),
            attachments: vec![],
        })
        .await
        .unwrap();
        assert!(f.store.media_claimed_by(
            photo,
            MediaClaim::new(ClaimerType::TreatmentPlanScheduledMessage, first)
        ));

        let activated = DomainEvent::TreatmentPlanActivated(TreatmentPlanEvent {
            treatment_plan_id: plan.id,
            case_id: f.case.id,
            patient_id: f.patient_id,
            doctor_id: f.doctor_id,
        });
        f.bus.publish(activated.clone()).await.unwrap();
        f.bus.publish(activated).await.unwrap();

        let queued = f.store.scheduled_messages();
        assert_eq!(queued.len(), 2);
        assert!(queued.iter().all(|m| m.event == EVENT_TREATMENT_PLAN));
        let linked = repo.scheduled_message(first).await.unwrap();
        let sm_id = linked.scheduled_message_id.unwrap();
        let sm = queued.iter().find(|m| m.id == sm_id).unwrap();
        assert!(sm.scheduled > Utc::now() + Duration::days(13));
        assert_eq!(linked.title(), "Message & Follow-Up Visit in 2 weeks");
    }
}
