//! Deliverers for each scheduled-message payload kind.

mod case_message;
mod email;
mod treatment_plan;

pub use case_message::CaseMessageDeliverer;
pub use email::{EmailDeliverer, HttpEmailService};
pub use treatment_plan::TreatmentPlanMessageDeliverer;

use careline_core::{
    CaseAssignEvent, CaseMessage, DomainEvent, Error, EventBus, PatientCase, Person, Result,
    RoleType, Store,
};
use tracing::warn;

/// Load a person and present them in `role`.
///
/// Care coordinators are stored as doctors, so the stored role is not enough.
async fn person_acting_as(store: &Store, person_id: i64, role: RoleType) -> Result<Person> {
    let mut person = store
        .people
        .get_people(&[person_id])
        .await?
        .remove(&person_id)
        .ok_or_else(|| Error::NotFound(format!("person {}", person_id)))?;
    person.role_type = role;
    Ok(person)
}

/// Log a failed step that runs after the message was stored.
///
/// Returning the error would requeue the row and post the message again.
fn after_delivery(
    component: &'static str,
    scheduled_message_id: i64,
    case_id: i64,
    result: Result<()>,
) {
    if let Err(e) = result {
        warn!(
            subsystem = "jobs",
            component,
            scheduled_message_id,
            case_id,
            error = %e,
            "Post-delivery step failed, message stays sent"
        );
    }
}

/// Announce that the doctor owns the case again after a delivered message.
async fn publish_reassignment(
    store: &Store,
    bus: &EventBus,
    message: CaseMessage,
    person: Person,
    case: PatientCase,
    doctor_id: i64,
    care_coordinator_id: i64,
) -> Result<()> {
    let doctor = store.people.doctor(doctor_id).await?;
    let care_coordinator = store.people.doctor(care_coordinator_id).await?;
    let case_id = case.id;
    if let Err(e) = bus
        .publish(DomainEvent::CaseAssign(CaseAssignEvent {
            message,
            person,
            case,
            doctor,
            care_coordinator,
        }))
        .await
    {
        warn!(
            subsystem = "jobs",
            component = "deliverer",
            case_id,
            error = %e,
            "Reassignment handler failed after delivery"
        );
    }
    Ok(())
}
