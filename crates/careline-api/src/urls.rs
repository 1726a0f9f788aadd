//! Client-facing URLs for attachments.

use std::time::Duration;

use tracing::trace;

use careline_core::{AttachmentType, Media, MediaUrlSigner, Result};

/// Hands back the stored media URL as-is.
///
/// Deployments fronted by a signing media store swap in their own
/// [`MediaUrlSigner`].
pub struct PassthroughMediaUrlSigner {
    expiration: Duration,
}

impl PassthroughMediaUrlSigner {
    pub fn new(expiration: Duration) -> Self {
        Self { expiration }
    }
}

impl MediaUrlSigner for PassthroughMediaUrlSigner {
    fn media_url(&self, media: &Media) -> Result<String> {
        trace!(
            media_id = media.id,
            expires_in_secs = self.expiration.as_secs(),
            "Issuing media URL"
        );
        Ok(media.url.clone())
    }
}

/// App URL for a non-media attachment, e.g.
/// `careline:///action/view_visit?visit_id=12`.
pub fn app_url(scheme: &str, item_type: AttachmentType, item_id: i64) -> String {
    let tag = item_type.tag();
    format!("{}:///action/view_{}?{}_id={}", scheme, tag, tag, item_id)
}
