use std::sync::Arc;

use storage::LifecycleSettings;
use storage::repository::LifecycleStore;
use storage::services::notify::Notifier;

/// Shared by every handler; cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LifecycleStore>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: Arc<LifecycleSettings>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        notifier: Arc<dyn Notifier>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            settings: Arc::new(settings),
        }
    }
}
