//! Centralized default constants for careline.
//!
//! Config structs in every crate fall back to these values when the
//! corresponding environment variable is unset.

// =============================================================================
// SCHEDULED MESSAGE WORKER
// =============================================================================

/// Sleep between lease attempts when the queue has nothing due.
pub const SCHEDMSG_POLL_INTERVAL_MS: u64 = 20_000;

/// A `processing` row older than this is presumed abandoned by a dead worker.
pub const SCHEDMSG_STALE_AFTER_SECS: u64 = 600;

/// Buffer size of the worker's event broadcast channel.
pub const WORKER_EVENT_CAPACITY: usize = 256;

/// Request timeout for the outbound email service.
pub const EMAIL_REQUEST_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// SCHEDULED MESSAGE EVENTS
// =============================================================================

/// Template event for patients who reported insurance on their first visit.
pub const EVENT_INSURED_PATIENT: &str = "insured_patient";

/// Template event for patients who reported no insurance on their first visit.
pub const EVENT_UNINSURED_PATIENT: &str = "uninsured_patient";

/// Template event for a patient viewing a treatment plan.
pub const EVENT_TREATMENT_PLAN_VIEWED: &str = "treatment_plan_viewed";

/// Event tag of queue entries created from treatment plan messages.
pub const EVENT_TREATMENT_PLAN: &str = "treatment_plan";

// =============================================================================
// SERVER
// =============================================================================

pub const SERVER_HOST: &str = "0.0.0.0";

pub const SERVER_PORT: u16 = 3000;

/// Scheme of non-media attachment URLs handed to clients.
pub const APP_URL_SCHEME: &str = "careline";

/// Lifetime requested for media URLs.
pub const MEDIA_URL_EXPIRATION_SECS: u64 = 900;

/// Service name recorded on web request analytics.
pub const SERVICE_NAME: &str = "careline-api";

// =============================================================================
// DATABASE
// =============================================================================

pub const DB_MAX_CONNECTIONS: u32 = 10;

pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;

pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_is_twenty_seconds() {
        assert_eq!(SCHEDMSG_POLL_INTERVAL_MS, 20_000);
    }

    #[test]
    fn test_stale_threshold_exceeds_poll_interval() {
        assert!(SCHEDMSG_STALE_AFTER_SECS * 1000 > SCHEDMSG_POLL_INTERVAL_MS);
    }
}
