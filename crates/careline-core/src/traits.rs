//! Core traits for careline abstractions.
//!
//! These traits define the storage contract the messaging core consumes and
//! the external collaborators it calls out to. PostgreSQL implementations
//! live in `careline-db`; [`crate::memory::MemoryStore`] implements all of
//! the repositories in memory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::*;

// =============================================================================
// CASE REPOSITORY
// =============================================================================

#[async_trait]
pub trait CaseRepository: Send + Sync {
    /// Fetch a case. Missing cases yield `Error::CaseNotFound`.
    async fn get_case(&self, case_id: i64) -> Result<PatientCase>;

    /// All cases opened for a patient, oldest first.
    async fn cases_for_patient(&self, patient_id: i64) -> Result<Vec<PatientCase>>;

    /// Every provider ever attached to the case.
    async fn care_team(&self, case_id: i64) -> Result<Vec<CareTeamAssignment>>;

    /// The active care team member in `role`, if any.
    async fn active_care_team_member(
        &self,
        case_id: i64,
        role: RoleType,
    ) -> Result<Option<CareTeamAssignment>> {
        Ok(self
            .care_team(case_id)
            .await?
            .into_iter()
            .find(|a| a.role == role && a.is_active()))
    }
}

// =============================================================================
// CASE MESSAGE REPOSITORY
// =============================================================================

#[async_trait]
pub trait CaseMessageRepository: Send + Sync {
    /// Persist a message with its attachments.
    ///
    /// Atomic with media claim acquisition: every photo/audio attachment must
    /// be uploaded by the sender and be unclaimed (or held by
    /// `msg.media_source`), and is re-claimed by the new message. The sender
    /// becomes a participant and gets a read receipt for their own message.
    /// Returns the stored message with attachment ids assigned.
    async fn create_message(&self, msg: &NewCaseMessage) -> Result<CaseMessage>;

    /// Messages ordered by time ascending.
    async fn list_case_messages(
        &self,
        case_id: i64,
        opts: ListCaseMessagesOptions,
    ) -> Result<Vec<CaseMessage>>;

    /// Participants keyed by person id.
    async fn case_message_participants(
        &self,
        case_id: i64,
        with_profiles: bool,
    ) -> Result<HashMap<i64, Participant>>;

    /// Record a read receipt for every unread message. Idempotent.
    async fn mark_case_messages_as_read(&self, case_id: i64, person_id: i64) -> Result<()>;

    /// Count of messages in the case without a receipt for this person.
    /// Private messages never count toward a patient's total.
    async fn unread_message_count(&self, case_id: i64, person_id: i64) -> Result<i64>;

    /// Owning case of a message. Missing messages yield `Error::MessageNotFound`.
    async fn case_id_for_message(&self, message_id: i64) -> Result<i64>;
}

// =============================================================================
// PEOPLE REPOSITORY
// =============================================================================

#[async_trait]
pub trait PeopleRepository: Send + Sync {
    /// Batch lookup. Unknown ids are omitted from the result.
    async fn get_people(&self, ids: &[i64]) -> Result<HashMap<i64, Person>>;

    /// Person id for a patient or doctor id.
    async fn person_id_for_role(&self, role: RoleType, role_id: i64) -> Result<i64>;

    async fn patient(&self, patient_id: i64) -> Result<Patient>;

    async fn doctor(&self, doctor_id: i64) -> Result<Doctor>;

    async fn patient_id_for_account(&self, account_id: i64) -> Result<i64>;

    /// Doctor id for a doctor or care coordinator account.
    async fn doctor_id_for_account(&self, account_id: i64) -> Result<i64>;
}

// =============================================================================
// MEDIA REPOSITORY
// =============================================================================

#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn add_media(&self, uploader_id: i64, url: &str, mime_type: &str) -> Result<i64>;

    async fn get_media(&self, media_id: i64) -> Result<Media>;

    /// Claim unclaimed media. Fails with `Error::Conflict` when already claimed.
    async fn claim_media(&self, media_id: i64, claim: MediaClaim) -> Result<()>;

    async fn media_has_claim(&self, media_id: i64, claim: MediaClaim) -> Result<bool> {
        Ok(self.get_media(media_id).await?.claim == Some(claim))
    }
}

// =============================================================================
// TREATMENT PLAN REPOSITORY
// =============================================================================

#[async_trait]
pub trait TreatmentPlanRepository: Send + Sync {
    async fn treatment_plan(&self, treatment_plan_id: i64) -> Result<TreatmentPlan>;

    /// Create a plan message; media attachments are claimed as
    /// `tp_scheduled_message`.
    async fn create_scheduled_message(
        &self,
        msg: &NewTreatmentPlanScheduledMessage,
    ) -> Result<i64>;

    async fn scheduled_message(&self, id: i64) -> Result<TreatmentPlanScheduledMessage>;

    async fn list_scheduled_messages(
        &self,
        treatment_plan_id: i64,
    ) -> Result<Vec<TreatmentPlanScheduledMessage>>;

    /// Record the queue entry created for a plan message.
    async fn link_scheduled_message(&self, id: i64, scheduled_message_id: i64) -> Result<()>;
}

// =============================================================================
// SCHEDULED MESSAGE REPOSITORY
// =============================================================================

#[async_trait]
pub trait ScheduledMessageRepository: Send + Sync {
    async fn create(&self, msg: &NewScheduledMessage) -> Result<i64>;

    async fn get(&self, id: i64) -> Result<ScheduledMessage>;

    /// Atomically pick one due `scheduled` message whose payload kind is in
    /// `kinds`, flip it to `processing` and return it. Selection among
    /// eligible rows is random. An empty `kinds` leases nothing.
    async fn lease_next(&self, kinds: &[ScheduledPayloadKind])
        -> Result<Option<ScheduledMessage>>;

    /// Move a `processing` message to `status`, recording `error` if given.
    async fn update_status(
        &self,
        id: i64,
        status: ScheduledMessageStatus,
        error: Option<&str>,
    ) -> Result<()>;

    /// Return `processing` rows started before `started_before` to `scheduled`.
    async fn requeue_stale(&self, started_before: DateTime<Utc>) -> Result<u64>;

    async fn create_template(&self, template: &NewScheduledMessageTemplate) -> Result<i64>;

    async fn templates_for_event(&self, event: &str) -> Result<Vec<ScheduledMessageTemplate>>;
}

// =============================================================================
// EXTERNAL COLLABORATORS
// =============================================================================

/// Pending follow-up visits that scheduled plan messages point at.
#[async_trait]
pub trait FollowupVisitStore: Send + Sync {
    /// Most recent pending follow-up visit for the case, if any.
    async fn pending_followup_for_case(&self, case_id: i64) -> Result<Option<i64>>;

    /// Returns the new visit id.
    async fn create_pending_followup(&self, patient_id: i64, case_id: i64) -> Result<i64>;
}

/// Outbound email provider.
#[async_trait]
pub trait EmailService: Send + Sync {
    async fn send(&self, email: &EmailPayload) -> Result<()>;
}

/// Mints client-facing URLs for stored media.
pub trait MediaUrlSigner: Send + Sync {
    fn media_url(&self, media: &Media) -> Result<String>;
}

// =============================================================================
// STORE
// =============================================================================

/// Shared handles to every repository the core consumes.
#[derive(Clone)]
pub struct Store {
    pub cases: Arc<dyn CaseRepository>,
    pub messages: Arc<dyn CaseMessageRepository>,
    pub people: Arc<dyn PeopleRepository>,
    pub media: Arc<dyn MediaRepository>,
    pub treatment_plans: Arc<dyn TreatmentPlanRepository>,
    pub scheduled_messages: Arc<dyn ScheduledMessageRepository>,
    pub visits: Arc<dyn FollowupVisitStore>,
}
