//! Case messaging HTTP handlers.
//!
//! Provides REST API endpoints for a case's message thread:
//! - Posting a message, with optional attachments
//! - Assigning the case between doctor and care coordinator
//! - Listing messages with participants
//! - Marking the thread read and counting unread messages

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use careline_core::{
    AccessIntent, AssignRequest, Attachment, AttachmentInput, AttachmentType, CaseMessage,
    Participant, PatientCase, Person, PostRequest, ReadReceipt, RequestContext, RoleType,
};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;
use crate::urls::app_url;

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// Attachment as sent by clients: `{"type": "photo", "id": 12}`.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
}

impl AttachmentItem {
    fn into_input(self) -> Result<AttachmentInput, ApiError> {
        let item_type = AttachmentType::parse(&self.item_type)?;
        if self.id <= 0 {
            return Err(ApiError::BadRequest(format!(
                "attachment {} is missing an id",
                item_type
            )));
        }
        Ok(AttachmentInput {
            item_type,
            item_id: self.id,
            title: self.title,
            mime_type: self.mimetype,
        })
    }
}

fn parse_attachments(items: Vec<AttachmentItem>) -> Result<Vec<AttachmentInput>, ApiError> {
    items.into_iter().map(AttachmentItem::into_input).collect()
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    #[serde(default)]
    pub case_id: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentItem>,
    #[serde(default)]
    pub is_private: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequestBody {
    #[serde(default)]
    pub case_id: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentItem>,
}

#[derive(Debug, Deserialize)]
pub struct CaseIdBody {
    #[serde(default)]
    pub case_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CaseIdQuery {
    #[serde(default)]
    pub case_id: i64,
}

// =============================================================================
// RESPONSE TYPES
// =============================================================================

pub const MESSAGE_ITEM_TYPE: &str = "conversation_item:message";
pub const PRIVATE_MESSAGE_ITEM_TYPE: &str = "conversation_item:private_message";

#[derive(Debug, Serialize)]
pub struct AttachmentView {
    #[serde(rename = "type")]
    pub item_type: String,
    pub id: i64,
    pub title: String,
    pub mimetype: Option<String>,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct MessageItem {
    #[serde(rename = "type")]
    pub item_type: &'static str,
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// Person id of the sender; resolve through `participants`.
    pub sender: i64,
    pub body: String,
    pub event_text: Option<String>,
    pub attachments: Vec<AttachmentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_receipts: Option<Vec<ReadReceiptView>>,
}

#[derive(Debug, Serialize)]
pub struct ReadReceiptView {
    pub person_id: i64,
    pub time: DateTime<Utc>,
}

impl From<&ReadReceipt> for ReadReceiptView {
    fn from(r: &ReadReceipt) -> Self {
        Self {
            person_id: r.person_id,
            time: r.time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ParticipantView {
    pub person_id: i64,
    pub role: String,
    pub display_name: String,
    pub initials: String,
}

impl From<&Participant> for ParticipantView {
    fn from(p: &Participant) -> Self {
        Self {
            person_id: p.person.id,
            role: p.person.role_type.as_str().to_string(),
            display_name: p.display_name(),
            initials: p.initials(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListMessagesResponse {
    pub items: Vec<MessageItem>,
    pub participants: Vec<ParticipantView>,
}

// =============================================================================
// HELPERS
// =============================================================================

fn require_case_id(case_id: i64) -> Result<i64, ApiError> {
    if case_id == 0 {
        return Err(ApiError::BadRequest("case_id required".into()));
    }
    Ok(case_id)
}

/// Load the case and check the caller may act on it.
async fn authorized_case(
    state: &AppState,
    ctx: &mut RequestContext,
    case_id: i64,
    intent: AccessIntent,
) -> Result<(PatientCase, Person), ApiError> {
    let case = state.store.cases.get_case(require_case_id(case_id)?).await?;
    let person = state.guard.authorize(ctx, &case, intent).await?;
    Ok((case, person))
}

async fn attachment_view(state: &AppState, a: &Attachment) -> Result<AttachmentView, ApiError> {
    let url = if a.item_type.is_media() {
        let media = state.store.media.get_media(a.item_id).await?;
        state.signer.media_url(&media)?
    } else {
        app_url(&state.app_url_scheme, a.item_type, a.item_id)
    };
    Ok(AttachmentView {
        item_type: a.item_type.wire_type(),
        id: a.item_id,
        title: a.title.clone(),
        mimetype: a.mime_type.clone(),
        url,
    })
}

async fn message_item(
    state: &AppState,
    message: &CaseMessage,
    with_receipts: bool,
) -> Result<MessageItem, ApiError> {
    let mut attachments = Vec::with_capacity(message.attachments.len());
    for a in &message.attachments {
        attachments.push(attachment_view(state, a).await?);
    }
    Ok(MessageItem {
        item_type: if message.is_private {
            PRIVATE_MESSAGE_ITEM_TYPE
        } else {
            MESSAGE_ITEM_TYPE
        },
        id: message.id,
        timestamp: message.time,
        sender: message.person_id,
        body: message.body.clone(),
        event_text: message.event_text.clone(),
        attachments,
        read_receipts: with_receipts
            .then(|| message.read_receipts.iter().map(ReadReceiptView::from).collect()),
    })
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Post a message to a case.
///
/// POST /v1/case/messages
pub async fn post_message(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<PostMessageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut ctx = identity.into_context();
    let attachments = parse_attachments(req.attachments)?;
    let (case, sender) = authorized_case(&state, &mut ctx, req.case_id, AccessIntent::Post).await?;

    let mut post = PostRequest::new(case, sender, req.message).with_attachments(attachments);
    if let Some(is_private) = req.is_private {
        post = post.private(is_private);
    }
    let message_id = state.composer.post(post).await?;

    Ok(Json(json!({ "message_id": message_id })))
}

/// Hand the case to the other provider.
///
/// POST /v1/case/assign
pub async fn assign_case(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<AssignRequestBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut ctx = identity.into_context();
    let attachments = parse_attachments(req.attachments)?;
    let (case, actor) = authorized_case(&state, &mut ctx, req.case_id, AccessIntent::Post).await?;

    let message = state
        .composer
        .assign(AssignRequest {
            case,
            actor,
            body: req.message,
            attachments,
        })
        .await?;

    Ok(Json(json!({ "message_id": message.id })))
}

/// List the messages the caller may see, with participants.
///
/// GET /v1/case/messages?case_id=
pub async fn list_messages(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<CaseIdQuery>,
) -> Result<Json<ListMessagesResponse>, ApiError> {
    let mut ctx = identity.into_context();
    let (case, viewer) =
        authorized_case(&state, &mut ctx, query.case_id, AccessIntent::Read).await?;

    let messages = state
        .composer
        .list_messages(case.id, viewer.role_type)
        .await?;
    let with_receipts = viewer.role_type == RoleType::CareCoordinator;

    let mut items = Vec::with_capacity(messages.len());
    for message in &messages {
        items.push(message_item(&state, message, with_receipts).await?);
    }

    let mut participants: Vec<ParticipantView> = state
        .composer
        .participants(case.id)
        .await?
        .values()
        .map(ParticipantView::from)
        .collect();
    participants.sort_by_key(|p| p.person_id);

    Ok(Json(ListMessagesResponse {
        items,
        participants,
    }))
}

/// Mark every message in the case read for the caller.
///
/// POST /v1/case/messages/read
pub async fn mark_read(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<CaseIdBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut ctx = identity.into_context();
    let (case, reader) = authorized_case(&state, &mut ctx, req.case_id, AccessIntent::Read).await?;
    state.composer.mark_read(case.id, reader).await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /v1/case/messages/unread_count?case_id=
pub async fn unread_count(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<CaseIdQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut ctx = identity.into_context();
    let (case, reader) =
        authorized_case(&state, &mut ctx, query.case_id, AccessIntent::Read).await?;
    let count = state.composer.unread_count(case.id, reader.id).await?;
    Ok(Json(json!({ "unread_count": count })))
}
