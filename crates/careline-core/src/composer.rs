//! Posting, assigning and reading case messages.
//!
//! Every message that reaches a case goes through [`MessageComposer`], both
//! live posts from the API and deliveries from the scheduled-message worker,
//! so attachment ownership and privacy rules hold for all of them.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info};

use crate::error::{Error, Result};
use crate::events::{CaseAssignEvent, DomainEvent, EventBus, PostEvent, ReadEvent};
use crate::models::{
    AttachmentInput, AttachmentType, CaseMessage, CaseStatus, ListCaseMessagesOptions,
    MediaClaim, NewCaseMessage, Participant, PatientCase, Person, RoleType,
};
use crate::traits::Store;

/// Input to [`MessageComposer::post_message`].
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub case: PatientCase,
    pub sender: Person,
    pub body: String,
    pub attachments: Vec<AttachmentInput>,
    /// `None` applies the sender role's default.
    pub is_private: Option<bool>,
    /// System note shown alongside the body; set only by internal flows.
    pub event_text: Option<String>,
    /// Claim that media attachments may be transferred from.
    pub media_source: Option<MediaClaim>,
}

impl PostRequest {
    pub fn new(case: PatientCase, sender: Person, body: impl Into<String>) -> Self {
        Self {
            case,
            sender,
            body: body.into(),
            attachments: Vec::new(),
            is_private: None,
            event_text: None,
            media_source: None,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<AttachmentInput>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn private(mut self, is_private: bool) -> Self {
        self.is_private = Some(is_private);
        self
    }

    pub fn with_media_source(mut self, claim: MediaClaim) -> Self {
        self.media_source = Some(claim);
        self
    }
}

/// Input to [`MessageComposer::assign`].
#[derive(Debug, Clone)]
pub struct AssignRequest {
    pub case: PatientCase,
    pub actor: Person,
    pub body: String,
    pub attachments: Vec<AttachmentInput>,
}

pub struct MessageComposer {
    store: Store,
    bus: Arc<EventBus>,
}

impl MessageComposer {
    pub fn new(store: Store, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Post a message and return its id.
    pub async fn post(&self, req: PostRequest) -> Result<i64> {
        Ok(self.post_message(req).await?.id)
    }

    /// Validate, persist and announce a message.
    ///
    /// Nothing is persisted or published when validation or storage fails.
    pub async fn post_message(&self, req: PostRequest) -> Result<CaseMessage> {
        let case = req.case.clone();
        let sender = req.sender.clone();
        let message = self.persist(req).await?;

        info!(
            subsystem = "messaging",
            component = "composer",
            op = "post",
            case_id = case.id,
            message_id = message.id,
            person_id = sender.id,
            attachments = message.attachments.len(),
            is_private = message.is_private,
            "Case message posted"
        );

        self.publish(DomainEvent::Post(PostEvent {
            message: message.clone(),
            case,
            person: sender,
        }))
        .await;
        Ok(message)
    }

    /// Hand the case to the other provider role with a private note.
    ///
    /// A doctor assigns to the active care coordinator; a care coordinator
    /// assigns to the active doctor and only once the case is claimed.
    pub async fn assign(&self, req: AssignRequest) -> Result<CaseMessage> {
        let target_role = match req.actor.role_type {
            RoleType::Doctor => RoleType::CareCoordinator,
            RoleType::CareCoordinator => RoleType::Doctor,
            RoleType::Patient => {
                return Err(Error::Forbidden(
                    "only doctors and care coordinators may assign a case".into(),
                ))
            }
        };
        if req.actor.role_type == RoleType::CareCoordinator && req.case.status != CaseStatus::Claimed
        {
            return Err(Error::InvalidInput("cannot assign unclaimed case".into()));
        }

        let target = self
            .store
            .cases
            .active_care_team_member(req.case.id, target_role)
            .await?
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "case {} has no active {} to assign to",
                    req.case.id, target_role
                ))
            })?;
        let target_doctor = self.store.people.doctor(target.provider_id).await?;
        let actor_doctor = self.store.people.doctor(req.actor.role_id).await?;

        let post = PostRequest {
            case: req.case.clone(),
            sender: req.actor.clone(),
            body: req.body,
            attachments: req.attachments,
            is_private: Some(true),
            event_text: Some(format!("assigned to {}", target_doctor.long_display_name)),
            media_source: None,
        };
        let message = self.persist(post).await?;

        info!(
            subsystem = "messaging",
            component = "composer",
            op = "assign",
            case_id = req.case.id,
            message_id = message.id,
            from_role = req.actor.role_type.as_str(),
            to_doctor_id = target_doctor.id,
            "Case assigned"
        );

        let (doctor, care_coordinator) = match req.actor.role_type {
            RoleType::Doctor => (actor_doctor, target_doctor),
            _ => (target_doctor, actor_doctor),
        };
        self.publish(DomainEvent::CaseAssign(CaseAssignEvent {
            message: message.clone(),
            person: req.actor,
            case: req.case,
            doctor,
            care_coordinator,
        }))
        .await;
        Ok(message)
    }

    /// Mark every message in the case read for `reader`.
    pub async fn mark_read(&self, case_id: i64, reader: Person) -> Result<()> {
        self.store
            .messages
            .mark_case_messages_as_read(case_id, reader.id)
            .await?;
        self.publish(DomainEvent::Read(ReadEvent {
            case_id,
            person: reader,
        }))
        .await;
        Ok(())
    }

    /// Messages visible to a viewer acting in `viewer_role`.
    pub async fn list_messages(
        &self,
        case_id: i64,
        viewer_role: RoleType,
    ) -> Result<Vec<CaseMessage>> {
        self.store
            .messages
            .list_case_messages(case_id, ListCaseMessagesOptions::for_viewer(viewer_role))
            .await
    }

    pub async fn participants(&self, case_id: i64) -> Result<HashMap<i64, Participant>> {
        self.store
            .messages
            .case_message_participants(case_id, true)
            .await
    }

    pub async fn unread_count(&self, case_id: i64, person_id: i64) -> Result<i64> {
        self.store
            .messages
            .unread_message_count(case_id, person_id)
            .await
    }

    async fn persist(&self, req: PostRequest) -> Result<CaseMessage> {
        let is_private = match (req.sender.role_type, req.is_private) {
            (RoleType::Patient, Some(true)) => {
                return Err(Error::InvalidInput(
                    "patients cannot post private messages".into(),
                ))
            }
            (RoleType::Patient, _) => false,
            (RoleType::CareCoordinator, explicit) => explicit.unwrap_or(true),
            (RoleType::Doctor, explicit) => explicit.unwrap_or(false),
        };

        if req.body.trim().is_empty() && req.event_text.is_none() {
            return Err(Error::InvalidInput("message body is required".into()));
        }

        self.validate_attachments(&req).await?;

        let new_message = NewCaseMessage {
            case_id: req.case.id,
            person_id: req.sender.id,
            body: req.body,
            is_private,
            event_text: req.event_text,
            attachments: req.attachments,
            media_source: req.media_source,
        };
        self.store.messages.create_message(&new_message).await
    }

    async fn validate_attachments(&self, req: &PostRequest) -> Result<()> {
        for attachment in &req.attachments {
            match attachment.item_type {
                AttachmentType::TreatmentPlan => {
                    if req.sender.role_type != RoleType::Doctor {
                        return Err(Error::InvalidInput(
                            "only doctors may attach treatment plans".into(),
                        ));
                    }
                    let plan = self
                        .store
                        .treatment_plans
                        .treatment_plan(attachment.item_id)
                        .await
                        .map_err(|e| not_found_as_invalid(e, "treatment plan", attachment.item_id))?;
                    if plan.case_id != req.case.id {
                        return Err(Error::InvalidInput(format!(
                            "treatment plan {} does not belong to case {}",
                            plan.id, req.case.id
                        )));
                    }
                    if plan.doctor_id != req.sender.role_id {
                        return Err(Error::InvalidInput(format!(
                            "treatment plan {} was not authored by the sender",
                            plan.id
                        )));
                    }
                }
                AttachmentType::Photo | AttachmentType::Audio => {
                    let media = self
                        .store
                        .media
                        .get_media(attachment.item_id)
                        .await
                        .map_err(|e| not_found_as_invalid(e, "media", attachment.item_id))?;
                    if media.uploader_id != req.sender.id {
                        return Err(Error::InvalidInput(format!(
                            "media {} was not uploaded by the sender",
                            media.id
                        )));
                    }
                    if media.claim.is_some() && media.claim != req.media_source {
                        return Err(Error::InvalidInput(format!(
                            "media {} is already attached elsewhere",
                            media.id
                        )));
                    }
                }
                AttachmentType::FollowupVisit
                | AttachmentType::Visit
                | AttachmentType::ResourceGuide => {}
            }
        }
        Ok(())
    }

    async fn publish(&self, event: DomainEvent) {
        let event_type = event.event_type();
        let case_id = event.case_id();
        if let Err(e) = self.bus.publish(event).await {
            error!(
                subsystem = "messaging",
                component = "composer",
                event_type,
                case_id,
                error = %e,
                "Event handler failed after message was stored"
            );
        }
    }
}

fn not_found_as_invalid(err: Error, what: &str, id: i64) -> Error {
    if err.is_not_found() {
        Error::InvalidInput(format!("{} {} does not exist", what, id))
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{handler_fn, EventBusConfig, EventKind};
    use crate::memory::MemoryStore;
    use crate::models::{AssignmentStatus, ClaimerType, TreatmentPlanStatus};
    use std::sync::Mutex;

    struct Fixture {
        store: MemoryStore,
        composer: MessageComposer,
        events: Arc<Mutex<Vec<DomainEvent>>>,
        case: PatientCase,
        patient: Person,
        doctor: Person,
        cc: Person,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let patient = store.add_patient(1, "Pat", "Jones");
        let doctor = store.add_doctor(2, "Greg", "House");
        let cc = store.add_doctor(3, "Carla", "Coord");
        let case = store.add_case(patient.id, "acne");
        store.assign(case.id, doctor.id, RoleType::Doctor, AssignmentStatus::Active);
        store.assign(case.id, cc.id, RoleType::CareCoordinator, AssignmentStatus::Active);

        let bus = Arc::new(EventBus::new(EventBusConfig::testing()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe_all(handler_fn(move |event| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(event);
                Ok(())
            }
        }))
        .await;

        Fixture {
            composer: MessageComposer::new(store.store(), bus),
            patient: store.person_for(RoleType::Patient, patient.id),
            doctor: store.person_for(RoleType::Doctor, doctor.id),
            cc: store.person_for(RoleType::CareCoordinator, cc.id),
            store,
            events,
            case,
        }
    }

    impl Fixture {
        fn event_kinds(&self) -> Vec<EventKind> {
            self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
        }
    }

    #[tokio::test]
    async fn test_patient_text_post_updates_unread_counts() {
        let f = fixture().await;
        let doctor_before = f.composer.unread_count(f.case.id, f.doctor.id).await.unwrap();
        let patient_before = f.composer.unread_count(f.case.id, f.patient.id).await.unwrap();

        let id = f
            .composer
            .post(PostRequest::new(f.case.clone(), f.patient.clone(), "Hello"))
            .await
            .unwrap();

        assert!(id > 0);
        assert_eq!(f.event_kinds(), vec![EventKind::Post]);
        assert_eq!(
            f.composer.unread_count(f.case.id, f.doctor.id).await.unwrap(),
            doctor_before + 1
        );
        assert_eq!(
            f.composer.unread_count(f.case.id, f.patient.id).await.unwrap(),
            patient_before
        );
    }

    #[tokio::test]
    async fn test_empty_body_rejected() {
        let f = fixture().await;
        let err = f
            .composer
            .post(PostRequest::new(f.case.clone(), f.patient.clone(), "   "))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(f.event_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_treatment_plan_by_other_doctor_rejected_and_nothing_stored() {
        let f = fixture().await;
        let other = f.store.add_doctor(9, "Other", "Doc");
        let plan = f
            .store
            .add_treatment_plan(f.case.id, other.id, TreatmentPlanStatus::Active);

        let err = f
            .composer
            .post(
                PostRequest::new(f.case.clone(), f.doctor.clone(), "See plan").with_attachments(
                    vec![AttachmentInput::new(AttachmentType::TreatmentPlan, plan.id)],
                ),
            )
            .await
            .unwrap_err();

        assert!(err.is_validation());
        let listed = f.composer.list_messages(f.case.id, RoleType::Doctor).await.unwrap();
        assert!(listed.is_empty());
        assert!(f.event_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_treatment_plan_from_other_case_rejected() {
        let f = fixture().await;
        let other_case = f.store.add_case(f.patient.role_id, "rosacea");
        let plan = f
            .store
            .add_treatment_plan(other_case.id, f.doctor.role_id, TreatmentPlanStatus::Active);
        let err = f
            .composer
            .post(
                PostRequest::new(f.case.clone(), f.doctor.clone(), "See plan").with_attachments(
                    vec![AttachmentInput::new(AttachmentType::TreatmentPlan, plan.id)],
                ),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_attachments_keep_order_and_photo_is_claimed() {
        let f = fixture().await;
        let plan = f
            .store
            .add_treatment_plan(f.case.id, f.doctor.role_id, TreatmentPlanStatus::Active);
        let photo = f.store.seed_media(f.doctor.id, "image/jpeg");

        let message = f
            .composer
            .post_message(
                PostRequest::new(f.case.clone(), f.doctor.clone(), "Plan and photo")
                    .with_attachments(vec![
                        AttachmentInput::new(AttachmentType::TreatmentPlan, plan.id),
                        AttachmentInput::new(AttachmentType::Photo, photo),
                        AttachmentInput::new(AttachmentType::Visit, 55),
                    ]),
            )
            .await
            .unwrap();

        let listed = f.composer.list_messages(f.case.id, RoleType::Doctor).await.unwrap();
        let items: Vec<(AttachmentType, i64)> = listed[0]
            .attachments
            .iter()
            .map(|a| (a.item_type, a.item_id))
            .collect();
        assert_eq!(
            items,
            vec![
                (AttachmentType::TreatmentPlan, plan.id),
                (AttachmentType::Photo, photo),
                (AttachmentType::Visit, 55),
            ]
        );
        assert_eq!(listed[0].attachments[0].title, "Treatment Plan");
        assert!(f
            .store
            .media_claimed_by(photo, MediaClaim::new(ClaimerType::ConversationMessage, message.id)));
    }

    #[tokio::test]
    async fn test_photo_uploaded_by_someone_else_rejected() {
        let f = fixture().await;
        let photo = f.store.seed_media(f.patient.id, "image/jpeg");
        let err = f
            .composer
            .post(
                PostRequest::new(f.case.clone(), f.doctor.clone(), "Nice photo")
                    .with_attachments(vec![AttachmentInput::new(AttachmentType::Photo, photo)]),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_photo_cannot_be_attached_twice() {
        let f = fixture().await;
        let photo = f.store.seed_media(f.patient.id, "image/jpeg");
        let attach = vec![AttachmentInput::new(AttachmentType::Photo, photo)];
        f.composer
            .post(
                PostRequest::new(f.case.clone(), f.patient.clone(), "first")
                    .with_attachments(attach.clone()),
            )
            .await
            .unwrap();
        let err = f
            .composer
            .post(
                PostRequest::new(f.case.clone(), f.patient.clone(), "again")
                    .with_attachments(attach),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_audio_is_ownership_checked() {
        let f = fixture().await;
        let clip = f.store.seed_media(f.cc.id, "audio/mp4");
        let err = f
            .composer
            .post(
                PostRequest::new(f.case.clone(), f.patient.clone(), "listen")
                    .with_attachments(vec![AttachmentInput::new(AttachmentType::Audio, clip)]),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_privacy_defaults_by_role() {
        let f = fixture().await;
        f.composer
            .post(PostRequest::new(f.case.clone(), f.cc.clone(), "internal note"))
            .await
            .unwrap();
        f.composer
            .post(PostRequest::new(f.case.clone(), f.cc.clone(), "hi there").private(false))
            .await
            .unwrap();
        f.composer
            .post(PostRequest::new(f.case.clone(), f.doctor.clone(), "from doctor"))
            .await
            .unwrap();

        let patient_view = f.composer.list_messages(f.case.id, RoleType::Patient).await.unwrap();
        let bodies: Vec<&str> = patient_view.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["hi there", "from doctor"]);
        assert!(patient_view.iter().all(|m| !m.is_private));

        let cc_view = f
            .composer
            .list_messages(f.case.id, RoleType::CareCoordinator)
            .await
            .unwrap();
        assert_eq!(cc_view.len(), 3);
    }

    #[tokio::test]
    async fn test_patient_cannot_post_private() {
        let f = fixture().await;
        let err = f
            .composer
            .post(PostRequest::new(f.case.clone(), f.patient.clone(), "secret").private(true))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_care_coordinator_cannot_assign_unclaimed_case() {
        let f = fixture().await;
        let err = f
            .composer
            .assign(AssignRequest {
                case: f.case.clone(),
                actor: f.cc.clone(),
                body: "over to you".into(),
                attachments: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: cannot assign unclaimed case");
    }

    #[tokio::test]
    async fn test_doctor_assigns_to_care_coordinator() {
        let f = fixture().await;
        let message = f
            .composer
            .assign(AssignRequest {
                case: f.case.clone(),
                actor: f.doctor.clone(),
                body: String::new(),
                attachments: vec![],
            })
            .await
            .unwrap();

        assert!(message.is_private);
        assert_eq!(message.event_text.as_deref(), Some("assigned to Dr. Carla Coord"));
        assert_eq!(f.event_kinds(), vec![EventKind::CaseAssign]);
        let events = f.events.lock().unwrap();
        let DomainEvent::CaseAssign(assign) = &events[0] else {
            panic!("expected CaseAssign");
        };
        assert_eq!(assign.doctor.id, f.doctor.role_id);
        assert_eq!(assign.care_coordinator.id, f.cc.role_id);
    }

    #[tokio::test]
    async fn test_care_coordinator_assigns_claimed_case_to_doctor() {
        let f = fixture().await;
        let claimed = f.store.set_case_status(f.case.id, CaseStatus::Claimed);
        let message = f
            .composer
            .assign(AssignRequest {
                case: claimed,
                actor: f.cc.clone(),
                body: "needs review".into(),
                attachments: vec![],
            })
            .await
            .unwrap();
        assert_eq!(message.event_text.as_deref(), Some("assigned to Dr. Greg House"));
    }

    #[tokio::test]
    async fn test_patient_cannot_assign() {
        let f = fixture().await;
        let err = f
            .composer
            .assign(AssignRequest {
                case: f.case.clone(),
                actor: f.patient.clone(),
                body: "x".into(),
                attachments: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent_and_publishes() {
        let f = fixture().await;
        for body in ["one", "two"] {
            f.composer
                .post(PostRequest::new(f.case.clone(), f.patient.clone(), body))
                .await
                .unwrap();
        }
        assert_eq!(f.composer.unread_count(f.case.id, f.doctor.id).await.unwrap(), 2);

        f.composer.mark_read(f.case.id, f.doctor.clone()).await.unwrap();
        let once = f.store.receipts_for(f.doctor.id);
        f.composer.mark_read(f.case.id, f.doctor.clone()).await.unwrap();
        f.composer.mark_read(f.case.id, f.doctor.clone()).await.unwrap();

        assert_eq!(f.store.receipts_for(f.doctor.id), once);
        assert_eq!(f.composer.unread_count(f.case.id, f.doctor.id).await.unwrap(), 0);
        assert_eq!(
            f.event_kinds(),
            vec![EventKind::Post, EventKind::Post, EventKind::Read, EventKind::Read, EventKind::Read]
        );
    }

    #[tokio::test]
    async fn test_read_receipts_only_listed_for_care_coordinator() {
        let f = fixture().await;
        f.composer
            .post(PostRequest::new(f.case.clone(), f.patient.clone(), "hello"))
            .await
            .unwrap();
        f.composer.mark_read(f.case.id, f.cc.clone()).await.unwrap();

        let doctor_view = f.composer.list_messages(f.case.id, RoleType::Doctor).await.unwrap();
        assert!(doctor_view[0].read_receipts.is_empty());

        let cc_view = f
            .composer
            .list_messages(f.case.id, RoleType::CareCoordinator)
            .await
            .unwrap();
        let readers: Vec<i64> = cc_view[0].read_receipts.iter().map(|r| r.person_id).collect();
        assert!(readers.contains(&f.cc.id));
        assert!(readers.contains(&f.patient.id));
    }

    #[tokio::test]
    async fn test_failing_subscriber_does_not_undo_post() {
        let f = fixture().await;
        f.composer
            .bus()
            .subscribe(
                EventKind::Post,
                handler_fn(|_| async { Err(Error::Internal("listener broke".into())) }),
            )
            .await;
        let id = f
            .composer
            .post(PostRequest::new(f.case.clone(), f.patient.clone(), "still here"))
            .await
            .unwrap();
        let listed = f.composer.list_messages(f.case.id, RoleType::Patient).await.unwrap();
        assert_eq!(listed[0].id, id);
    }
}
