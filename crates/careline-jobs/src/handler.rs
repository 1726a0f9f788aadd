//! Delivery contract for scheduled-message payloads.

use async_trait::async_trait;

use careline_core::{Error, Result, ScheduledMessage, ScheduledMessageStatus, ScheduledPayloadKind};

/// How a delivery attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Delivered; the row is marked sent.
    Sent,
    /// Nothing to deliver and nothing to retry; the row is marked sent with
    /// the reason recorded.
    Skipped(String),
    /// Delivery failed; the row goes back to the queue.
    Retry(String),
}

impl DeliveryOutcome {
    /// Validation failures are terminal so they do not loop forever.
    pub fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => DeliveryOutcome::Sent,
            Err(e) if e.is_validation() => DeliveryOutcome::Skipped(e.to_string()),
            Err(e) => DeliveryOutcome::Retry(e.to_string()),
        }
    }

    /// Queue status the row moves to.
    pub fn status(&self) -> ScheduledMessageStatus {
        match self {
            DeliveryOutcome::Sent | DeliveryOutcome::Skipped(_) => ScheduledMessageStatus::Sent,
            DeliveryOutcome::Retry(_) => ScheduledMessageStatus::Scheduled,
        }
    }

    /// Error text recorded on the row.
    pub fn error(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Sent => None,
            DeliveryOutcome::Skipped(reason) | DeliveryOutcome::Retry(reason) => Some(reason),
        }
    }
}

/// Delivers one payload kind.
#[async_trait]
pub trait Deliverer: Send + Sync {
    /// The payload kind this deliverer handles.
    fn kind(&self) -> ScheduledPayloadKind;

    /// Materialize the message. Returning a validation error marks the row
    /// sent without side effects; any other error requeues it.
    async fn deliver(&self, msg: &ScheduledMessage) -> Result<()>;
}

/// Error for a payload routed to the wrong deliverer.
pub(crate) fn unexpected_payload(expected: ScheduledPayloadKind, msg: &ScheduledMessage) -> Error {
    Error::Internal(format!(
        "scheduled message {} carries a {} payload, expected {}",
        msg.id,
        msg.payload.kind().as_str(),
        expected.as_str()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_ok() {
        let outcome = DeliveryOutcome::from_result(Ok(()));
        assert_eq!(outcome, DeliveryOutcome::Sent);
        assert_eq!(outcome.status(), ScheduledMessageStatus::Sent);
        assert!(outcome.error().is_none());
    }

    #[test]
    fn test_validation_error_is_terminal() {
        let outcome = DeliveryOutcome::from_result(Err(Error::InvalidInput(
            "treatment plan 4 is not active".into(),
        )));
        assert_eq!(outcome.status(), ScheduledMessageStatus::Sent);
        assert!(outcome.error().unwrap().contains("not active"));
    }

    #[test]
    fn test_other_errors_requeue() {
        for err in [
            Error::Upstream("email service returned 503".into()),
            Error::CaseNotFound(9),
            Error::Conflict("media 3 already claimed".into()),
        ] {
            let outcome = DeliveryOutcome::from_result(Err(err));
            assert_eq!(outcome.status(), ScheduledMessageStatus::Scheduled);
            assert!(matches!(outcome, DeliveryOutcome::Retry(_)));
        }
    }
}
