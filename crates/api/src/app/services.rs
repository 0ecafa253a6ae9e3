use std::sync::Arc;

use collo_infra::InMemoryWipStore;

/// Shared state behind every handler.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub store: Arc<InMemoryWipStore>,
}

impl AppServices {
    pub fn new(store: Arc<InMemoryWipStore>) -> Self {
        Self { store }
    }
}

pub fn build_services() -> AppServices {
    AppServices::new(Arc::new(InMemoryWipStore::new()))
}
