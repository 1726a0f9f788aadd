use std::sync::Arc;

use careline_core::{AccessGuard, EventBus, MediaUrlSigner, MessageComposer, Store};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub bus: Arc<EventBus>,
    pub composer: Arc<MessageComposer>,
    pub guard: Arc<AccessGuard>,
    /// Mints URLs for photo and audio attachments.
    pub signer: Arc<dyn MediaUrlSigner>,
    pub app_url_scheme: String,
}

impl AppState {
    pub fn new(
        store: Store,
        bus: Arc<EventBus>,
        composer: Arc<MessageComposer>,
        signer: Arc<dyn MediaUrlSigner>,
        app_url_scheme: impl Into<String>,
    ) -> Self {
        let guard = Arc::new(AccessGuard::new(store.cases.clone(), store.people.clone()));
        Self {
            store,
            bus,
            composer,
            guard,
            signer,
            app_url_scheme: app_url_scheme.into(),
        }
    }
}
