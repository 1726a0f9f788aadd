pub mod request_analytics;
pub mod request_id;

pub use request_analytics::record_request;
pub use request_id::MakeRequestUuidV7;
