use super::{ SessionStorage, StorageError };
use log::{ debug, warn };
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

/// JSON object on disk, one string value per key.
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<config dir>/rag-chat/session.json`, or a file in the working directory when the
    /// platform has no config dir.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|mut path| {
                path.push("rag-chat");
                path.push("session.json");
                path
            })
            .unwrap_or_else(|| PathBuf::from(".rag-chat-session.json"))
    }

    fn load(&self) -> Result<HashMap<String, String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = match self.load() {
            Ok(entries) => entries,
            Err(StorageError::Corrupt(e)) => {
                warn!("Replacing corrupt session file {}: {}", self.path.display(), e);
                HashMap::new()
            }
            Err(e) => {
                return Err(e);
            }
        };
        entries.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_string_pretty(&entries)?;
        // Readers only ever see the old file or the complete new one.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!("Wrote {} to {}", key, self.path.display());
        Ok(())
    }
}
