//! Core data models for careline.
//!
//! These types are shared across all careline crates and represent
//! the case-messaging domain: people, cases, messages, media and the
//! scheduled-message queue.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// PEOPLE
// =============================================================================

/// Role a person acts in.
///
/// Care coordinators are stored as doctors and identified on the wire as `MA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleType {
    #[serde(rename = "PATIENT")]
    Patient,
    #[serde(rename = "DOCTOR")]
    Doctor,
    #[serde(rename = "MA")]
    CareCoordinator,
}

impl RoleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleType::Patient => "PATIENT",
            RoleType::Doctor => "DOCTOR",
            RoleType::CareCoordinator => "MA",
        }
    }

    /// Doctors and care coordinators are both providers.
    pub fn is_provider(&self) -> bool {
        matches!(self, RoleType::Doctor | RoleType::CareCoordinator)
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PATIENT" => Ok(RoleType::Patient),
            "DOCTOR" => Ok(RoleType::Doctor),
            "MA" => Ok(RoleType::CareCoordinator),
            other => Err(Error::InvalidInput(format!("unknown role type: {}", other))),
        }
    }
}

/// A participant identity. `role_id` is the patient or doctor id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub role_type: RoleType,
    pub role_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub account_id: i64,
    pub first_name: String,
    pub last_name: String,
}

/// A doctor or care coordinator record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: i64,
    pub account_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub short_display_name: String,
    pub long_display_name: String,
}

/// Display information for a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub first_name: String,
    pub last_name: String,
    pub short_display_name: String,
    pub long_display_name: String,
}

impl From<&Patient> for ParticipantProfile {
    fn from(p: &Patient) -> Self {
        let full = format!("{} {}", p.first_name, p.last_name);
        Self {
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            short_display_name: p.first_name.clone(),
            long_display_name: full,
        }
    }
}

impl From<&Doctor> for ParticipantProfile {
    fn from(d: &Doctor) -> Self {
        Self {
            first_name: d.first_name.clone(),
            last_name: d.last_name.clone(),
            short_display_name: d.short_display_name.clone(),
            long_display_name: d.long_display_name.clone(),
        }
    }
}

/// A person who has posted in a case, optionally with profile rows resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub person: Person,
    pub profile: Option<ParticipantProfile>,
}

impl Participant {
    pub fn display_name(&self) -> String {
        self.profile
            .as_ref()
            .map(|p| p.short_display_name.clone())
            .unwrap_or_default()
    }

    /// First letters of first and last name, uppercased.
    pub fn initials(&self) -> String {
        let Some(profile) = &self.profile else {
            return String::new();
        };
        profile
            .first_name
            .chars()
            .take(1)
            .chain(profile.last_name.chars().take(1))
            .flat_map(char::to_uppercase)
            .collect()
    }
}

// =============================================================================
// CASES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CaseStatus {
    Open,
    Claimed,
    Inactive,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Open => "OPEN",
            CaseStatus::Claimed => "CLAIMED",
            CaseStatus::Inactive => "INACTIVE",
        }
    }
}

impl FromStr for CaseStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OPEN" => Ok(CaseStatus::Open),
            "CLAIMED" => Ok(CaseStatus::Claimed),
            "INACTIVE" => Ok(CaseStatus::Inactive),
            other => Err(Error::Internal(format!("unknown case status: {}", other))),
        }
    }
}

/// A case: one patient, one pathway, one message thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientCase {
    pub id: i64,
    pub patient_id: i64,
    pub pathway_tag: String,
    pub status: CaseStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssignmentStatus {
    Active,
    Inactive,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Active => "ACTIVE",
            AssignmentStatus::Inactive => "INACTIVE",
        }
    }
}

impl FromStr for AssignmentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ACTIVE" => Ok(AssignmentStatus::Active),
            "INACTIVE" => Ok(AssignmentStatus::Inactive),
            other => Err(Error::Internal(format!(
                "unknown assignment status: {}",
                other
            ))),
        }
    }
}

/// A provider attached to a case's care team. `provider_id` is a doctor id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareTeamAssignment {
    pub case_id: i64,
    pub provider_id: i64,
    pub role: RoleType,
    pub status: AssignmentStatus,
}

impl CareTeamAssignment {
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}

// =============================================================================
// ATTACHMENTS
// =============================================================================

/// Prefix clients may put in front of an attachment tag.
pub const ATTACHMENT_TYPE_PREFIX: &str = "attachment:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentType {
    #[serde(alias = "attachment:photo")]
    Photo,
    #[serde(alias = "attachment:audio")]
    Audio,
    #[serde(alias = "attachment:treatment_plan")]
    TreatmentPlan,
    #[serde(alias = "attachment:followup_visit")]
    FollowupVisit,
    #[serde(alias = "attachment:visit")]
    Visit,
    #[serde(alias = "attachment:resource_guide")]
    ResourceGuide,
}

impl AttachmentType {
    /// Bare tag as stored and accepted on input.
    pub fn tag(&self) -> &'static str {
        match self {
            AttachmentType::Photo => "photo",
            AttachmentType::Audio => "audio",
            AttachmentType::TreatmentPlan => "treatment_plan",
            AttachmentType::FollowupVisit => "followup_visit",
            AttachmentType::Visit => "visit",
            AttachmentType::ResourceGuide => "resource_guide",
        }
    }

    /// Prefixed tag as returned to clients.
    pub fn wire_type(&self) -> String {
        format!("{}{}", ATTACHMENT_TYPE_PREFIX, self.tag())
    }

    /// Parse a tag, with or without the `attachment:` prefix.
    pub fn parse(input: &str) -> Result<Self> {
        let tag = input.strip_prefix(ATTACHMENT_TYPE_PREFIX).unwrap_or(input);
        match tag {
            "photo" => Ok(AttachmentType::Photo),
            "audio" => Ok(AttachmentType::Audio),
            "treatment_plan" => Ok(AttachmentType::TreatmentPlan),
            "followup_visit" => Ok(AttachmentType::FollowupVisit),
            "visit" => Ok(AttachmentType::Visit),
            "resource_guide" => Ok(AttachmentType::ResourceGuide),
            other => Err(Error::InvalidInput(format!(
                "unknown attachment type: {}",
                other
            ))),
        }
    }

    pub fn default_title(&self) -> &'static str {
        match self {
            AttachmentType::Photo => "Photo",
            AttachmentType::Audio => "Audio",
            AttachmentType::TreatmentPlan => "Treatment Plan",
            AttachmentType::FollowupVisit => "Follow-Up Visit",
            AttachmentType::Visit => "Visit",
            AttachmentType::ResourceGuide => "Resource Guide",
        }
    }

    /// Media attachments reference an uploaded media row and carry a claim.
    pub fn is_media(&self) -> bool {
        matches!(self, AttachmentType::Photo | AttachmentType::Audio)
    }
}

impl fmt::Display for AttachmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// An attachment as supplied by a sender, before it is bound to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInput {
    pub item_type: AttachmentType,
    pub item_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl AttachmentInput {
    pub fn new(item_type: AttachmentType, item_id: i64) -> Self {
        Self {
            item_type,
            item_id,
            title: None,
            mime_type: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Explicit title if non-blank, otherwise the type's default.
    pub fn resolved_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => self.item_type.default_title().to_string(),
        }
    }
}

/// An attachment row bound to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub item_type: AttachmentType,
    pub item_id: i64,
    pub title: String,
    pub mime_type: Option<String>,
}

// =============================================================================
// MESSAGES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub message_id: i64,
    pub person_id: i64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseMessage {
    pub id: i64,
    pub case_id: i64,
    pub person_id: i64,
    pub body: String,
    pub time: DateTime<Utc>,
    pub is_private: bool,
    pub event_text: Option<String>,
    pub attachments: Vec<Attachment>,
    /// Populated only when listed with read receipts.
    pub read_receipts: Vec<ReadReceipt>,
}

/// A message ready to persist, already validated by the composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCaseMessage {
    pub case_id: i64,
    pub person_id: i64,
    pub body: String,
    pub is_private: bool,
    pub event_text: Option<String>,
    pub attachments: Vec<AttachmentInput>,
    /// Existing claim that media attachments may be transferred from.
    pub media_source: Option<MediaClaim>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListCaseMessagesOptions {
    pub include_private: bool,
    pub include_read_receipts: bool,
}

impl ListCaseMessagesOptions {
    /// Visibility rules for a viewer acting in `role`.
    pub fn for_viewer(role: RoleType) -> Self {
        Self {
            include_private: role.is_provider(),
            include_read_receipts: role == RoleType::CareCoordinator,
        }
    }
}

// =============================================================================
// MEDIA
// =============================================================================

/// Kind of entity that may own an uploaded media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimerType {
    ConversationMessage,
    #[serde(rename = "tp_scheduled_message")]
    TreatmentPlanScheduledMessage,
    #[serde(rename = "ftp_scheduled_message")]
    FavoriteTreatmentPlanScheduledMessage,
}

impl ClaimerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimerType::ConversationMessage => "conversation_message",
            ClaimerType::TreatmentPlanScheduledMessage => "tp_scheduled_message",
            ClaimerType::FavoriteTreatmentPlanScheduledMessage => "ftp_scheduled_message",
        }
    }
}

impl FromStr for ClaimerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "conversation_message" => Ok(ClaimerType::ConversationMessage),
            "tp_scheduled_message" => Ok(ClaimerType::TreatmentPlanScheduledMessage),
            "ftp_scheduled_message" => Ok(ClaimerType::FavoriteTreatmentPlanScheduledMessage),
            other => Err(Error::Internal(format!("unknown claimer type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaClaim {
    pub claimer_type: ClaimerType,
    pub claimer_id: i64,
}

impl MediaClaim {
    pub fn new(claimer_type: ClaimerType, claimer_id: i64) -> Self {
        Self {
            claimer_type,
            claimer_id,
        }
    }
}

/// An uploaded photo or audio clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub id: i64,
    pub uploader_id: i64,
    pub url: String,
    pub mime_type: String,
    pub claim: Option<MediaClaim>,
    pub uploaded_at: DateTime<Utc>,
}

// =============================================================================
// TREATMENT PLANS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TreatmentPlanStatus {
    Draft,
    Active,
    Inactive,
}

impl TreatmentPlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreatmentPlanStatus::Draft => "DRAFT",
            TreatmentPlanStatus::Active => "ACTIVE",
            TreatmentPlanStatus::Inactive => "INACTIVE",
        }
    }
}

impl FromStr for TreatmentPlanStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DRAFT" => Ok(TreatmentPlanStatus::Draft),
            "ACTIVE" => Ok(TreatmentPlanStatus::Active),
            "INACTIVE" => Ok(TreatmentPlanStatus::Inactive),
            other => Err(Error::Internal(format!(
                "unknown treatment plan status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentPlan {
    pub id: i64,
    pub case_id: i64,
    pub patient_id: i64,
    /// Authoring doctor.
    pub doctor_id: i64,
    pub status: TreatmentPlanStatus,
}

/// A message bundled with a treatment plan, sent `scheduled_days` after activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentPlanScheduledMessage {
    pub id: i64,
    pub treatment_plan_id: i64,
    pub scheduled_days: i32,
    pub message: String,
    pub attachments: Vec<AttachmentInput>,
    pub scheduled_message_id: Option<i64>,
}

impl TreatmentPlanScheduledMessage {
    /// Human title, e.g. "Message & Follow-Up Visit in 2 weeks".
    pub fn title(&self) -> String {
        let has_followup = self
            .attachments
            .iter()
            .any(|a| a.item_type == AttachmentType::FollowupVisit);
        let what = if has_followup {
            "Message & Follow-Up Visit"
        } else {
            "Message"
        };
        let when = match self.scheduled_days {
            d if d > 0 && d % 7 == 0 => plural(d / 7, "week"),
            d => plural(d, "day"),
        };
        format!("{} in {}", what, when)
    }
}

fn plural(n: i32, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTreatmentPlanScheduledMessage {
    pub treatment_plan_id: i64,
    /// Person creating the entry; must own any media attached.
    pub sender_person_id: i64,
    pub scheduled_days: i32,
    pub message: String,
    pub attachments: Vec<AttachmentInput>,
}

// =============================================================================
// SCHEDULED MESSAGES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduledMessageStatus {
    Scheduled,
    Processing,
    Sent,
    Errored,
}

impl ScheduledMessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledMessageStatus::Scheduled => "scheduled",
            ScheduledMessageStatus::Processing => "processing",
            ScheduledMessageStatus::Sent => "sent",
            ScheduledMessageStatus::Errored => "errored",
        }
    }
}

impl FromStr for ScheduledMessageStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheduled" => Ok(ScheduledMessageStatus::Scheduled),
            "processing" => Ok(ScheduledMessageStatus::Processing),
            "sent" => Ok(ScheduledMessageStatus::Sent),
            "errored" => Ok(ScheduledMessageStatus::Errored),
            other => Err(Error::Internal(format!(
                "unknown scheduled message status: {}",
                other
            ))),
        }
    }
}

/// Discriminant of [`ScheduledPayload`], used to filter leases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledPayloadKind {
    CaseMessage,
    Email,
    TreatmentPlanMessage,
}

impl ScheduledPayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledPayloadKind::CaseMessage => "case_message",
            ScheduledPayloadKind::Email => "email",
            ScheduledPayloadKind::TreatmentPlanMessage => "treatment_plan_message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseMessagePayload {
    pub case_id: i64,
    pub sender_person_id: i64,
    pub sender_role: RoleType,
    /// Doctor id of the sender.
    pub provider_id: i64,
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentInput>,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentPlanMessagePayload {
    pub treatment_plan_message_id: i64,
    pub treatment_plan_id: i64,
    pub case_id: i64,
    pub patient_id: i64,
}

/// What a scheduled message delivers, stored as tagged JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduledPayload {
    CaseMessage(CaseMessagePayload),
    Email(EmailPayload),
    TreatmentPlanMessage(TreatmentPlanMessagePayload),
}

impl ScheduledPayload {
    pub fn kind(&self) -> ScheduledPayloadKind {
        match self {
            ScheduledPayload::CaseMessage(_) => ScheduledPayloadKind::CaseMessage,
            ScheduledPayload::Email(_) => ScheduledPayloadKind::Email,
            ScheduledPayload::TreatmentPlanMessage(_) => ScheduledPayloadKind::TreatmentPlanMessage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: i64,
    /// Trigger tag, e.g. `insured_patient` or `treatment_plan`.
    pub event: String,
    pub patient_id: i64,
    pub payload: ScheduledPayload,
    pub scheduled: DateTime<Utc>,
    pub status: ScheduledMessageStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScheduledMessage {
    pub event: String,
    pub patient_id: i64,
    pub payload: ScheduledPayload,
    pub scheduled: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMessageTemplate {
    pub id: i64,
    pub name: String,
    pub event: String,
    pub schedule_period_secs: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScheduledMessageTemplate {
    pub name: String,
    pub event: String,
    pub schedule_period_secs: i64,
    pub message: String,
}
