//! Case access decisions.
//!
//! [`AccessGuard`] is the one place that turns an acting account into a
//! person and decides whether that person may read or post in a case.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{PatientCase, Person, RoleType};
use crate::traits::{CaseRepository, PeopleRepository};
use crate::uuid_utils::new_v7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    Read,
    Post,
}

/// Per-request state threaded from the HTTP layer into the core.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub account_id: i64,
    pub role: RoleType,
    /// Filled by the guard on first resolution.
    person: Option<Person>,
}

impl RequestContext {
    pub fn new(account_id: i64, role: RoleType) -> Self {
        Self {
            request_id: new_v7(),
            account_id,
            role,
            person: None,
        }
    }

    /// Resolved acting person, if the guard has run.
    pub fn person(&self) -> Option<&Person> {
        self.person.as_ref()
    }
}

pub struct AccessGuard {
    cases: Arc<dyn CaseRepository>,
    people: Arc<dyn PeopleRepository>,
}

impl AccessGuard {
    pub fn new(cases: Arc<dyn CaseRepository>, people: Arc<dyn PeopleRepository>) -> Self {
        Self { cases, people }
    }

    /// Resolve the acting person, caching it in `ctx`.
    pub async fn resolve_person(&self, ctx: &mut RequestContext) -> Result<Person> {
        if let Some(person) = &ctx.person {
            return Ok(person.clone());
        }
        let role_id = match ctx.role {
            RoleType::Patient => self.people.patient_id_for_account(ctx.account_id).await?,
            RoleType::Doctor | RoleType::CareCoordinator => {
                self.people.doctor_id_for_account(ctx.account_id).await?
            }
        };
        let person = Person {
            id: self.people.person_id_for_role(ctx.role, role_id).await?,
            role_type: ctx.role,
            role_id,
        };
        ctx.person = Some(person.clone());
        Ok(person)
    }

    /// Authorize `intent` on `case` and return the acting person.
    ///
    /// Denials are `Error::Forbidden`, distinct from the not-found errors a
    /// missing case or account produces.
    pub async fn authorize(
        &self,
        ctx: &mut RequestContext,
        case: &PatientCase,
        intent: AccessIntent,
    ) -> Result<Person> {
        let person = self.resolve_person(ctx).await?;

        let allowed = match person.role_type {
            RoleType::Patient => person.role_id == case.patient_id,
            RoleType::Doctor => self
                .cases
                .care_team(case.id)
                .await?
                .iter()
                .any(|a| a.provider_id == person.role_id && a.role == RoleType::Doctor && a.is_active()),
            RoleType::CareCoordinator => self
                .cases
                .care_team(case.id)
                .await?
                .iter()
                .any(|a| a.provider_id == person.role_id && a.role == RoleType::CareCoordinator),
        };

        debug!(
            request_id = %ctx.request_id,
            case_id = case.id,
            person_id = person.id,
            role = person.role_type.as_str(),
            ?intent,
            allowed,
            "Case access decision"
        );

        if !allowed {
            return Err(Error::Forbidden(format!(
                "{} {} may not access case {}",
                person.role_type, person.role_id, case.id
            )));
        }
        Ok(person)
    }
}
