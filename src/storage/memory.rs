//! In-process storage backend for tests and dry runs.

use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path;
use std::sync::Arc;

use super::{BackendConfig, StorageGateway};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    pub key: Option<Path>,
}

impl StorageGateway {
    pub(super) fn construct_memory(config: MemoryConfig) -> Self {
        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let canonical_url = match &config.key {
            Some(key) => format!("memory://{}", key),
            None => "memory://".to_string(),
        };

        Self {
            config: BackendConfig::Memory(config),
            object_store,
            canonical_url,
        }
    }
}
