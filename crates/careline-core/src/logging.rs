//! Structured logging schema and field name constants for careline.
//!
//! All crates use these names for structured logging fields so log
//! aggregation can query the same field across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue: swallowed handler/analytics error, rescheduled delivery |
//! | INFO  | Lifecycle events (startup, shutdown), deliveries, posts |
//! | DEBUG | Decision points (access decisions, bus dispatch, config choices) |
//! | TRACE | Per-item iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID for one HTTP request. Format: UUIDv7.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "db", "messaging", "events", "analytics", "schedmsg"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "worker", "composer", "guard"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "post", "assign", "mark_read", "lease", "deliver"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

pub const CASE_ID: &str = "case_id";

pub const MESSAGE_ID: &str = "message_id";

pub const PERSON_ID: &str = "person_id";

pub const SCHEDULED_MESSAGE_ID: &str = "scheduled_message_id";

/// Scheduled payload kind, e.g. "treatment_plan_message".
pub const PAYLOAD_KIND: &str = "payload_kind";

/// Namespaced domain event type, e.g. "case_message.posted".
pub const EVENT_TYPE: &str = "event_type";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows affected by a bulk operation.
pub const ROW_COUNT: &str = "row_count";
