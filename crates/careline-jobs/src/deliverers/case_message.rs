use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use careline_core::{
    CaseMessage, MessageComposer, PatientCase, Person, PostRequest, Result, RoleType,
    ScheduledMessage, ScheduledPayload, ScheduledPayloadKind, Store,
};

use super::{after_delivery, person_acting_as, publish_reassignment};
use crate::handler::{unexpected_payload, Deliverer};

/// Posts a queued provider message as if it were sent live.
pub struct CaseMessageDeliverer {
    store: Store,
    composer: Arc<MessageComposer>,
}

impl CaseMessageDeliverer {
    pub fn new(store: Store, composer: Arc<MessageComposer>) -> Self {
        Self { store, composer }
    }

    async fn hand_back_to_doctor(
        &self,
        message: CaseMessage,
        sender: Person,
        case: PatientCase,
        care_coordinator_id: i64,
    ) -> Result<()> {
        let Some(doctor) = self
            .store
            .cases
            .active_care_team_member(case.id, RoleType::Doctor)
            .await?
        else {
            return Ok(());
        };
        publish_reassignment(
            &self.store,
            self.composer.bus(),
            message,
            sender,
            case,
            doctor.provider_id,
            care_coordinator_id,
        )
        .await
    }
}

#[async_trait]
impl Deliverer for CaseMessageDeliverer {
    fn kind(&self) -> ScheduledPayloadKind {
        ScheduledPayloadKind::CaseMessage
    }

    async fn deliver(&self, msg: &ScheduledMessage) -> Result<()> {
        let ScheduledPayload::CaseMessage(payload) = &msg.payload else {
            return Err(unexpected_payload(self.kind(), msg));
        };

        let case = self.store.cases.get_case(payload.case_id).await?;
        let sender =
            person_acting_as(&self.store, payload.sender_person_id, payload.sender_role).await?;

        let message = self
            .composer
            .post_message(
                PostRequest::new(case.clone(), sender.clone(), payload.message.clone())
                    .with_attachments(payload.attachments.clone())
                    .private(payload.is_private),
            )
            .await?;

        info!(
            subsystem = "jobs",
            component = "case_message_deliverer",
            scheduled_message_id = msg.id,
            case_id = case.id,
            message_id = message.id,
            "Scheduled case message delivered"
        );

        if payload.sender_role == RoleType::CareCoordinator {
            let case_id = case.id;
            let result = self
                .hand_back_to_doctor(message, sender, case, payload.provider_id)
                .await;
            after_delivery("case_message_deliverer", msg.id, case_id, result);
        }
        Ok(())
    }
}
