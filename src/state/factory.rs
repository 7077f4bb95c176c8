use crate::config::{StateBackend, StateConfig};
use crate::error::{AppError, Result};
use crate::state::{HistoryStore, InMemoryHistoryStore, SledHistoryStore};
use std::sync::Arc;

/// Create a history store based on configuration
pub fn create_history_store(config: &StateConfig) -> Result<Arc<dyn HistoryStore>> {
    match config.backend {
        StateBackend::Sled => {
            let path = config.path.as_ref().ok_or_else(|| {
                AppError::Configuration("Sled backend requires 'path' configuration".to_string())
            })?;

            tracing::info!(path = ?path, "Initializing Sled history backend");

            let store = SledHistoryStore::new(path)?;
            Ok(Arc::new(store))
        }

        StateBackend::Memory => Ok(create_in_memory_history_store()),
    }
}

/// Create an in-memory store (for testing and development)
pub fn create_in_memory_history_store() -> Arc<dyn HistoryStore> {
    tracing::info!("Initializing in-memory history backend");
    Arc::new(InMemoryHistoryStore::new())
}
