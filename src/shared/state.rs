use std::sync::Arc;

use crate::config::AppConfig;
use crate::identity::IdentityResolver;
use crate::store::MemoryStore;
use crate::workflow::WorkflowEngine;

/// Shared application state handed to every handler. No ambient globals:
/// the acting principal travels with each request, never in process state.
pub struct AppState {
    pub config: AppConfig,
    pub engine: WorkflowEngine,
}

impl AppState {
    /// Wire the engine against the in-memory document store.
    pub fn new(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let identity = IdentityResolver::new(store.clone());
        let engine = WorkflowEngine::new(
            store.clone(),
            store,
            identity,
            config.workflow_options(),
        );
        Self { config, engine }
    }
}
