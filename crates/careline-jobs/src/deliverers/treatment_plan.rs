use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use careline_core::{
    AttachmentType, CaseMessage, ClaimerType, Error, MediaClaim, MessageComposer, PatientCase,
    Person, PostRequest, Result, RoleType, ScheduledMessage, ScheduledPayload,
    ScheduledPayloadKind, Store, TreatmentPlan, TreatmentPlanStatus,
};

use super::{after_delivery, person_acting_as, publish_reassignment};
use crate::handler::{unexpected_payload, Deliverer};

/// Sends a message bundled with a treatment plan once its day arrives.
pub struct TreatmentPlanMessageDeliverer {
    store: Store,
    composer: Arc<MessageComposer>,
}

impl TreatmentPlanMessageDeliverer {
    pub fn new(store: Store, composer: Arc<MessageComposer>) -> Self {
        Self { store, composer }
    }

    /// Reuse the case's pending follow-up visit, creating one if none exists.
    async fn followup_visit_id(&self, plan: &TreatmentPlan) -> Result<i64> {
        if let Some(visit_id) = self
            .store
            .visits
            .pending_followup_for_case(plan.case_id)
            .await?
        {
            return Ok(visit_id);
        }
        self.store
            .visits
            .create_pending_followup(plan.patient_id, plan.case_id)
            .await
    }

    async fn hand_back_to_doctor(
        &self,
        message: CaseMessage,
        sender: Person,
        case: PatientCase,
        doctor_id: i64,
    ) -> Result<()> {
        let Some(cc) = self
            .store
            .cases
            .active_care_team_member(case.id, RoleType::CareCoordinator)
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
            doctor_id,
            cc.provider_id,
        )
        .await
    }
}

#[async_trait]
impl Deliverer for TreatmentPlanMessageDeliverer {
    fn kind(&self) -> ScheduledPayloadKind {
        ScheduledPayloadKind::TreatmentPlanMessage
    }

    async fn deliver(&self, msg: &ScheduledMessage) -> Result<()> {
        let ScheduledPayload::TreatmentPlanMessage(payload) = &msg.payload else {
            return Err(unexpected_payload(self.kind(), msg));
        };

        let plan = self
            .store
            .treatment_plans
            .treatment_plan(payload.treatment_plan_id)
            .await?;
        if plan.status != TreatmentPlanStatus::Active {
            return Err(Error::InvalidInput(format!(
                "treatment plan {} is no longer active",
                plan.id
            )));
        }

        let entry = self
            .store
            .treatment_plans
            .scheduled_message(payload.treatment_plan_message_id)
            .await?;

        let case = self.store.cases.get_case(plan.case_id).await?;
        let doctor_person_id = self
            .store
            .people
            .person_id_for_role(RoleType::Doctor, plan.doctor_id)
            .await?;
        let sender = person_acting_as(&self.store, doctor_person_id, RoleType::Doctor).await?;

        let mut attachments = entry.attachments.clone();
        if let Some(followup) = attachments
            .iter_mut()
            .find(|a| a.item_type == AttachmentType::FollowupVisit)
        {
            followup.item_id = self.followup_visit_id(&plan).await?;
        }

        let message = self
            .composer
            .post_message(
                PostRequest::new(case.clone(), sender.clone(), entry.message.clone())
                    .with_attachments(attachments)
                    .private(false)
                    .with_media_source(MediaClaim::new(
                        ClaimerType::TreatmentPlanScheduledMessage,
                        entry.id,
                    )),
            )
            .await?;

        info!(
            subsystem = "jobs",
            component = "treatment_plan_deliverer",
            scheduled_message_id = msg.id,
            case_id = case.id,
            message_id = message.id,
            treatment_plan_id = plan.id,
            "Treatment plan message delivered"
        );

        let case_id = case.id;
        let result = self
            .hand_back_to_doctor(message, sender, case, plan.doctor_id)
            .await;
        after_delivery("treatment_plan_deliverer", msg.id, case_id, result);
        Ok(())
    }
}
