//! UUID v7 helpers for request and event correlation ids.
//!
//! Entity ids in careline are numeric; UUIDv7 is used only where a
//! time-ordered opaque id is wanted (request ids, log correlation).

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// # Example
///
/// ```
/// use careline_core::uuid_utils::new_v7;
///
/// let id = new_v7();
/// assert_eq!(id.get_version_num(), 7);
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}
