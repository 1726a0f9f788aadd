//! In-memory implementation of every careline repository.
//!
//! Used by unit and API tests and for running the server without a
//! database. All state sits behind one mutex, so every operation is atomic
//! with respect to the others, the same guarantee the PostgreSQL
//! implementation gets from transactions and conditional updates.
//!
//! ## Usage
//!
//! ```rust
//! use careline_core::memory::MemoryStore;
//! use careline_core::{AssignmentStatus, RoleType};
//!
//! let store = MemoryStore::new();
//! let patient = store.add_patient(10, "Pat", "Jones");
//! let doctor = store.add_doctor(20, "Greg", "House");
//! let case = store.add_case(patient.id, "acne");
//! store.assign(case.id, doctor.id, RoleType::Doctor, AssignmentStatus::Active);
//!
//! let repos = store.store();
//! # let _ = repos;
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;

use crate::analytics::{AnalyticsStore, ClientEvent, ServerEvent, WebRequestEvent};
use crate::error::{Error, Result};
use crate::models::*;
use crate::traits::*;

#[derive(Default)]
struct State {
    next_id: i64,
    patients: HashMap<i64, Patient>,
    doctors: HashMap<i64, Doctor>,
    people: HashMap<i64, Person>,
    cases: BTreeMap<i64, PatientCase>,
    care_team: Vec<CareTeamAssignment>,
    messages: BTreeMap<i64, CaseMessage>,
    participants: BTreeSet<(i64, i64)>,
    receipts: BTreeMap<(i64, i64), DateTime<Utc>>,
    media: HashMap<i64, Media>,
    treatment_plans: HashMap<i64, TreatmentPlan>,
    tp_messages: BTreeMap<i64, TreatmentPlanScheduledMessage>,
    scheduled: BTreeMap<i64, ScheduledMessage>,
    templates: BTreeMap<i64, ScheduledMessageTemplate>,
    visits: Vec<FollowupVisit>,
    server_events: Vec<ServerEvent>,
    web_events: Vec<WebRequestEvent>,
    client_events: Vec<ClientEvent>,
}

impl State {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn person_id(&self, role: RoleType, role_id: i64) -> Option<i64> {
        let stored_role = match role {
            RoleType::Patient => RoleType::Patient,
            _ => RoleType::Doctor,
        };
        self.people
            .values()
            .find(|p| p.role_type == stored_role && p.role_id == role_id)
            .map(|p| p.id)
    }

    fn check_media_claimable(
        &self,
        media_id: i64,
        owner: i64,
        source: Option<MediaClaim>,
    ) -> Result<()> {
        let media = self
            .media
            .get(&media_id)
            .ok_or_else(|| Error::NotFound(format!("media {}", media_id)))?;
        if media.uploader_id != owner {
            return Err(Error::Conflict(format!(
                "media {} is owned by another person",
                media_id
            )));
        }
        if media.claim.is_some() && media.claim != source {
            return Err(Error::Conflict(format!("media {} already claimed", media_id)));
        }
        Ok(())
    }
}

/// A follow-up visit created through [`FollowupVisitStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowupVisit {
    pub id: i64,
    pub patient_id: i64,
    pub case_id: i64,
}

/// Shared in-memory store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Repository handles backed by this store.
    pub fn store(&self) -> Store {
        let this = Arc::new(self.clone());
        Store {
            cases: this.clone(),
            messages: this.clone(),
            people: this.clone(),
            media: this.clone(),
            treatment_plans: this.clone(),
            scheduled_messages: this.clone(),
            visits: this,
        }
    }

    // ─── Seeding ───────────────────────────────────────────────────────────

    /// Register a patient and their person row.
    pub fn add_patient(&self, account_id: i64, first_name: &str, last_name: &str) -> Patient {
        let mut s = self.state();
        let patient = Patient {
            id: s.id(),
            account_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
        };
        let person_id = s.id();
        s.people.insert(
            person_id,
            Person {
                id: person_id,
                role_type: RoleType::Patient,
                role_id: patient.id,
            },
        );
        s.patients.insert(patient.id, patient.clone());
        patient
    }

    /// Register a doctor (or care coordinator) and their person row.
    pub fn add_doctor(&self, account_id: i64, first_name: &str, last_name: &str) -> Doctor {
        let mut s = self.state();
        let doctor = Doctor {
            id: s.id(),
            account_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            short_display_name: format!("Dr. {}", last_name),
            long_display_name: format!("Dr. {} {}", first_name, last_name),
        };
        let person_id = s.id();
        s.people.insert(
            person_id,
            Person {
                id: person_id,
                role_type: RoleType::Doctor,
                role_id: doctor.id,
            },
        );
        s.doctors.insert(doctor.id, doctor.clone());
        doctor
    }

    /// Person acting in `role` for a patient or doctor id.
    ///
    /// Panics if the role id was never seeded.
    pub fn person_for(&self, role: RoleType, role_id: i64) -> Person {
        let s = self.state();
        let id = s
            .person_id(role, role_id)
            .unwrap_or_else(|| panic!("no person for {} {}", role, role_id));
        Person {
            id,
            role_type: role,
            role_id,
        }
    }

    pub fn add_case(&self, patient_id: i64, pathway_tag: &str) -> PatientCase {
        let mut s = self.state();
        let case = PatientCase {
            id: s.id(),
            patient_id,
            pathway_tag: pathway_tag.into(),
            status: CaseStatus::Open,
            created_at: Utc::now(),
        };
        s.cases.insert(case.id, case.clone());
        case
    }

    /// Panics if the case was never seeded.
    pub fn set_case_status(&self, case_id: i64, status: CaseStatus) -> PatientCase {
        let mut s = self.state();
        let case = s
            .cases
            .get_mut(&case_id)
            .unwrap_or_else(|| panic!("no case {}", case_id));
        case.status = status;
        case.clone()
    }

    /// Attach a provider to a case, replacing any earlier row for them.
    pub fn assign(&self, case_id: i64, provider_id: i64, role: RoleType, status: AssignmentStatus) {
        let mut s = self.state();
        s.care_team
            .retain(|a| !(a.case_id == case_id && a.provider_id == provider_id && a.role == role));
        s.care_team.push(CareTeamAssignment {
            case_id,
            provider_id,
            role,
            status,
        });
    }

    pub fn add_treatment_plan(
        &self,
        case_id: i64,
        doctor_id: i64,
        status: TreatmentPlanStatus,
    ) -> TreatmentPlan {
        let mut s = self.state();
        let patient_id = s.cases.get(&case_id).map(|c| c.patient_id).unwrap_or_default();
        let plan = TreatmentPlan {
            id: s.id(),
            case_id,
            patient_id,
            doctor_id,
            status,
        };
        s.treatment_plans.insert(plan.id, plan.clone());
        plan
    }

    pub fn set_treatment_plan_status(&self, treatment_plan_id: i64, status: TreatmentPlanStatus) {
        if let Some(plan) = self.state().treatment_plans.get_mut(&treatment_plan_id) {
            plan.status = status;
        }
    }

    /// Upload an unclaimed media item for `uploader_id` (a person id).
    pub fn seed_media(&self, uploader_id: i64, mime_type: &str) -> i64 {
        let mut s = self.state();
        let id = s.id();
        s.media.insert(
            id,
            Media {
                id,
                uploader_id,
                url: format!("s3://media/{}", id),
                mime_type: mime_type.into(),
                claim: None,
                uploaded_at: Utc::now(),
            },
        );
        id
    }

    // ─── Inspection ────────────────────────────────────────────────────────

    pub fn media_claimed_by(&self, media_id: i64, claim: MediaClaim) -> bool {
        self.state()
            .media
            .get(&media_id)
            .is_some_and(|m| m.claim == Some(claim))
    }

    /// Read receipts recorded for a person, ordered by message id.
    pub fn receipts_for(&self, person_id: i64) -> Vec<ReadReceipt> {
        self.state()
            .receipts
            .iter()
            .filter(|((_, p), _)| *p == person_id)
            .map(|((message_id, person_id), time)| ReadReceipt {
                message_id: *message_id,
                person_id: *person_id,
                time: *time,
            })
            .collect()
    }

    pub fn message_count(&self, case_id: i64) -> usize {
        self.state()
            .messages
            .values()
            .filter(|m| m.case_id == case_id)
            .count()
    }

    pub fn scheduled_messages(&self) -> Vec<ScheduledMessage> {
        self.state().scheduled.values().cloned().collect()
    }

    pub fn followup_visits(&self) -> Vec<FollowupVisit> {
        self.state().visits.clone()
    }

    pub fn server_events(&self) -> Vec<ServerEvent> {
        self.state().server_events.clone()
    }

    pub fn client_events(&self) -> Vec<ClientEvent> {
        self.state().client_events.clone()
    }

    pub fn web_request_events(&self) -> Vec<WebRequestEvent> {
        self.state().web_events.clone()
    }

    /// Make a scheduled message due now, as if its time had passed.
    pub fn make_due(&self, scheduled_message_id: i64) {
        if let Some(msg) = self.state().scheduled.get_mut(&scheduled_message_id) {
            msg.scheduled = Utc::now();
        }
    }

    /// Put a message into `processing` with an arbitrary start time.
    pub fn force_processing(&self, scheduled_message_id: i64, started_at: DateTime<Utc>) {
        if let Some(msg) = self.state().scheduled.get_mut(&scheduled_message_id) {
            msg.status = ScheduledMessageStatus::Processing;
            msg.started_at = Some(started_at);
        }
    }
}

// =============================================================================
// Repository implementations
// =============================================================================

#[async_trait]
impl CaseRepository for MemoryStore {
    async fn get_case(&self, case_id: i64) -> Result<PatientCase> {
        self.state()
            .cases
            .get(&case_id)
            .cloned()
            .ok_or(Error::CaseNotFound(case_id))
    }

    async fn cases_for_patient(&self, patient_id: i64) -> Result<Vec<PatientCase>> {
        Ok(self
            .state()
            .cases
            .values()
            .filter(|c| c.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn care_team(&self, case_id: i64) -> Result<Vec<CareTeamAssignment>> {
        Ok(self
            .state()
            .care_team
            .iter()
            .filter(|a| a.case_id == case_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CaseMessageRepository for MemoryStore {
    async fn create_message(&self, msg: &NewCaseMessage) -> Result<CaseMessage> {
        let mut s = self.state();
        if !s.cases.contains_key(&msg.case_id) {
            return Err(Error::CaseNotFound(msg.case_id));
        }
        for a in msg.attachments.iter().filter(|a| a.item_type.is_media()) {
            s.check_media_claimable(a.item_id, msg.person_id, msg.media_source)?;
        }

        let id = s.id();
        let now = Utc::now();
        let mut attachments = Vec::with_capacity(msg.attachments.len());
        for a in &msg.attachments {
            let mime_type = match s.media.get_mut(&a.item_id) {
                Some(media) if a.item_type.is_media() => {
                    media.claim = Some(MediaClaim::new(ClaimerType::ConversationMessage, id));
                    Some(media.mime_type.clone())
                }
                _ => a.mime_type.clone(),
            };
            attachments.push(Attachment {
                id: s.id(),
                item_type: a.item_type,
                item_id: a.item_id,
                title: a.resolved_title(),
                mime_type,
            });
        }

        let message = CaseMessage {
            id,
            case_id: msg.case_id,
            person_id: msg.person_id,
            body: msg.body.clone(),
            time: now,
            is_private: msg.is_private,
            event_text: msg.event_text.clone(),
            attachments,
            read_receipts: Vec::new(),
        };
        s.messages.insert(id, message.clone());
        s.participants.insert((msg.case_id, msg.person_id));
        s.receipts.insert((id, msg.person_id), now);
        Ok(message)
    }

    async fn list_case_messages(
        &self,
        case_id: i64,
        opts: ListCaseMessagesOptions,
    ) -> Result<Vec<CaseMessage>> {
        let s = self.state();
        let mut messages: Vec<CaseMessage> = s
            .messages
            .values()
            .filter(|m| m.case_id == case_id && (opts.include_private || !m.is_private))
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.time, m.id));
        if opts.include_read_receipts {
            for m in &mut messages {
                m.read_receipts = s
                    .receipts
                    .range((m.id, i64::MIN)..=(m.id, i64::MAX))
                    .map(|((message_id, person_id), time)| ReadReceipt {
                        message_id: *message_id,
                        person_id: *person_id,
                        time: *time,
                    })
                    .collect();
            }
        }
        Ok(messages)
    }

    async fn case_message_participants(
        &self,
        case_id: i64,
        with_profiles: bool,
    ) -> Result<HashMap<i64, Participant>> {
        let s = self.state();
        let mut out = HashMap::new();
        for (_, person_id) in s.participants.range((case_id, i64::MIN)..=(case_id, i64::MAX)) {
            let Some(person) = s.people.get(person_id) else {
                continue;
            };
            let profile = if with_profiles {
                match person.role_type {
                    RoleType::Patient => s.patients.get(&person.role_id).map(ParticipantProfile::from),
                    _ => s.doctors.get(&person.role_id).map(ParticipantProfile::from),
                }
            } else {
                None
            };
            out.insert(
                *person_id,
                Participant {
                    person: person.clone(),
                    profile,
                },
            );
        }
        Ok(out)
    }

    async fn mark_case_messages_as_read(&self, case_id: i64, person_id: i64) -> Result<()> {
        let mut s = self.state();
        let now = Utc::now();
        let ids: Vec<i64> = s
            .messages
            .values()
            .filter(|m| m.case_id == case_id)
            .map(|m| m.id)
            .collect();
        for id in ids {
            s.receipts.entry((id, person_id)).or_insert(now);
        }
        Ok(())
    }

    async fn unread_message_count(&self, case_id: i64, person_id: i64) -> Result<i64> {
        let s = self.state();
        let is_patient = s
            .people
            .get(&person_id)
            .is_some_and(|p| p.role_type == RoleType::Patient);
        Ok(s.messages
            .values()
            .filter(|m| m.case_id == case_id && !s.receipts.contains_key(&(m.id, person_id)))
            .filter(|m| !(is_patient && m.is_private))
            .count() as i64)
    }

    async fn case_id_for_message(&self, message_id: i64) -> Result<i64> {
        self.state()
            .messages
            .get(&message_id)
            .map(|m| m.case_id)
            .ok_or(Error::MessageNotFound(message_id))
    }
}

#[async_trait]
impl PeopleRepository for MemoryStore {
    async fn get_people(&self, ids: &[i64]) -> Result<HashMap<i64, Person>> {
        let s = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| s.people.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn person_id_for_role(&self, role: RoleType, role_id: i64) -> Result<i64> {
        self.state()
            .person_id(role, role_id)
            .ok_or_else(|| Error::NotFound(format!("person for {} {}", role, role_id)))
    }

    async fn patient(&self, patient_id: i64) -> Result<Patient> {
        self.state()
            .patients
            .get(&patient_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("patient {}", patient_id)))
    }

    async fn doctor(&self, doctor_id: i64) -> Result<Doctor> {
        self.state()
            .doctors
            .get(&doctor_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("doctor {}", doctor_id)))
    }

    async fn patient_id_for_account(&self, account_id: i64) -> Result<i64> {
        self.state()
            .patients
            .values()
            .find(|p| p.account_id == account_id)
            .map(|p| p.id)
            .ok_or_else(|| Error::NotFound(format!("patient for account {}", account_id)))
    }

    async fn doctor_id_for_account(&self, account_id: i64) -> Result<i64> {
        self.state()
            .doctors
            .values()
            .find(|d| d.account_id == account_id)
            .map(|d| d.id)
            .ok_or_else(|| Error::NotFound(format!("doctor for account {}", account_id)))
    }
}

#[async_trait]
impl MediaRepository for MemoryStore {
    async fn add_media(&self, uploader_id: i64, url: &str, mime_type: &str) -> Result<i64> {
        let mut s = self.state();
        let id = s.id();
        s.media.insert(
            id,
            Media {
                id,
                uploader_id,
                url: url.into(),
                mime_type: mime_type.into(),
                claim: None,
                uploaded_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_media(&self, media_id: i64) -> Result<Media> {
        self.state()
            .media
            .get(&media_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("media {}", media_id)))
    }

    async fn claim_media(&self, media_id: i64, claim: MediaClaim) -> Result<()> {
        let mut s = self.state();
        let media = s
            .media
            .get_mut(&media_id)
            .ok_or_else(|| Error::NotFound(format!("media {}", media_id)))?;
        if media.claim.is_some() {
            return Err(Error::Conflict(format!("media {} already claimed", media_id)));
        }
        media.claim = Some(claim);
        Ok(())
    }
}

#[async_trait]
impl TreatmentPlanRepository for MemoryStore {
    async fn treatment_plan(&self, treatment_plan_id: i64) -> Result<TreatmentPlan> {
        self.state()
            .treatment_plans
            .get(&treatment_plan_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("treatment plan {}", treatment_plan_id)))
    }

    async fn create_scheduled_message(
        &self,
        msg: &NewTreatmentPlanScheduledMessage,
    ) -> Result<i64> {
        let mut s = self.state();
        if !s.treatment_plans.contains_key(&msg.treatment_plan_id) {
            return Err(Error::NotFound(format!(
                "treatment plan {}",
                msg.treatment_plan_id
            )));
        }
        for a in msg.attachments.iter().filter(|a| a.item_type.is_media()) {
            s.check_media_claimable(a.item_id, msg.sender_person_id, None)?;
        }
        let id = s.id();
        for a in msg.attachments.iter().filter(|a| a.item_type.is_media()) {
            if let Some(media) = s.media.get_mut(&a.item_id) {
                media.claim = Some(MediaClaim::new(
                    ClaimerType::TreatmentPlanScheduledMessage,
                    id,
                ));
            }
        }
        s.tp_messages.insert(
            id,
            TreatmentPlanScheduledMessage {
                id,
                treatment_plan_id: msg.treatment_plan_id,
                scheduled_days: msg.scheduled_days,
                message: msg.message.clone(),
                attachments: msg.attachments.clone(),
                scheduled_message_id: None,
            },
        );
        Ok(id)
    }

    async fn scheduled_message(&self, id: i64) -> Result<TreatmentPlanScheduledMessage> {
        self.state()
            .tp_messages
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("treatment plan message {}", id)))
    }

    async fn list_scheduled_messages(
        &self,
        treatment_plan_id: i64,
    ) -> Result<Vec<TreatmentPlanScheduledMessage>> {
        Ok(self
            .state()
            .tp_messages
            .values()
            .filter(|m| m.treatment_plan_id == treatment_plan_id)
            .cloned()
            .collect())
    }

    async fn link_scheduled_message(&self, id: i64, scheduled_message_id: i64) -> Result<()> {
        let mut s = self.state();
        let msg = s
            .tp_messages
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("treatment plan message {}", id)))?;
        msg.scheduled_message_id = Some(scheduled_message_id);
        Ok(())
    }
}

#[async_trait]
impl ScheduledMessageRepository for MemoryStore {
    async fn create(&self, msg: &NewScheduledMessage) -> Result<i64> {
        let mut s = self.state();
        let id = s.id();
        s.scheduled.insert(
            id,
            ScheduledMessage {
                id,
                event: msg.event.clone(),
                patient_id: msg.patient_id,
                payload: msg.payload.clone(),
                scheduled: msg.scheduled,
                status: ScheduledMessageStatus::Scheduled,
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
                error: None,
            },
        );
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<ScheduledMessage> {
        self.state()
            .scheduled
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("scheduled message {}", id)))
    }

    async fn lease_next(
        &self,
        kinds: &[ScheduledPayloadKind],
    ) -> Result<Option<ScheduledMessage>> {
        let mut s = self.state();
        let now = Utc::now();
        let eligible: Vec<i64> = s
            .scheduled
            .values()
            .filter(|m| {
                m.status == ScheduledMessageStatus::Scheduled
                    && m.scheduled <= now
                    && kinds.contains(&m.payload.kind())
            })
            .map(|m| m.id)
            .collect();
        let Some(msg) = eligible
            .choose(&mut rand::thread_rng())
            .and_then(|id| s.scheduled.get_mut(id))
        else {
            return Ok(None);
        };
        msg.status = ScheduledMessageStatus::Processing;
        msg.started_at = Some(now);
        Ok(Some(msg.clone()))
    }

    async fn update_status(
        &self,
        id: i64,
        status: ScheduledMessageStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut s = self.state();
        let msg = s
            .scheduled
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("scheduled message {}", id)))?;
        if msg.status != ScheduledMessageStatus::Processing {
            return Err(Error::Conflict(format!(
                "scheduled message {} is {}, not processing",
                id,
                msg.status.as_str()
            )));
        }
        msg.status = status;
        msg.error = error.map(str::to_string);
        match status {
            ScheduledMessageStatus::Scheduled => msg.started_at = None,
            _ => msg.completed_at = Some(Utc::now()),
        }
        Ok(())
    }

    async fn requeue_stale(&self, started_before: DateTime<Utc>) -> Result<u64> {
        let mut s = self.state();
        let mut count = 0;
        for msg in s.scheduled.values_mut() {
            if msg.status == ScheduledMessageStatus::Processing
                && msg.started_at.is_some_and(|t| t < started_before)
            {
                msg.status = ScheduledMessageStatus::Scheduled;
                msg.started_at = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn create_template(&self, template: &NewScheduledMessageTemplate) -> Result<i64> {
        let mut s = self.state();
        let id = s.id();
        s.templates.insert(
            id,
            ScheduledMessageTemplate {
                id,
                name: template.name.clone(),
                event: template.event.clone(),
                schedule_period_secs: template.schedule_period_secs,
                message: template.message.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn templates_for_event(&self, event: &str) -> Result<Vec<ScheduledMessageTemplate>> {
        Ok(self
            .state()
            .templates
            .values()
            .filter(|t| t.event == event)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FollowupVisitStore for MemoryStore {
    async fn pending_followup_for_case(&self, case_id: i64) -> Result<Option<i64>> {
        Ok(self
            .state()
            .visits
            .iter()
            .rev()
            .find(|v| v.case_id == case_id)
            .map(|v| v.id))
    }

    async fn create_pending_followup(&self, patient_id: i64, case_id: i64) -> Result<i64> {
        let mut s = self.state();
        let id = s.id();
        s.visits.push(FollowupVisit {
            id,
            patient_id,
            case_id,
        });
        Ok(id)
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn insert_server_events(&self, events: &[ServerEvent]) -> Result<()> {
        self.state().server_events.extend_from_slice(events);
        Ok(())
    }

    async fn insert_web_request_events(&self, events: &[WebRequestEvent]) -> Result<()> {
        self.state().web_events.extend_from_slice(events);
        Ok(())
    }

    async fn insert_client_events(&self, events: &[ClientEvent]) -> Result<()> {
        self.state().client_events.extend_from_slice(events);
        Ok(())
    }
}
