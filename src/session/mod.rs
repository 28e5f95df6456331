mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use log::{ info, warn };
use once_cell::sync::OnceCell;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Key under which the session id is persisted.
pub const SESSION_STORAGE_KEY: &str = "rag_chat_session_id";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Narrow key/value interface over whatever persists the session id.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

pub struct SessionManager {
    storage: Arc<dyn SessionStorage>,
    resolved: OnceCell<String>,
}

impl SessionManager {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            storage,
            resolved: OnceCell::new(),
        }
    }

    /// Returns the stored session id, creating and persisting one on first use.
    ///
    /// Storage failures never surface: the caller still gets a usable id, it just
    /// won't outlive the process. Either way the id is fixed for the life of the manager.
    pub fn get_or_create_session_id(&self) -> String {
        self.resolved.get_or_init(|| self.resolve()).clone()
    }

    fn resolve(&self) -> String {
        match self.storage.get(SESSION_STORAGE_KEY) {
            Ok(Some(id)) if !id.trim().is_empty() => {
                return id;
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to read session id: {}", e),
        }

        let id = Uuid::new_v4().to_string();
        match self.storage.set(SESSION_STORAGE_KEY, &id) {
            Ok(()) => info!("Created new session id {}", id),
            Err(e) => warn!("Failed to persist session id {}: {}. Using it for this run only.", id, e),
        }
        id
    }
}
