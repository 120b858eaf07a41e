//! Process-wide key settings.
//!
//! A [`KeyStore`] holds the key set the result operations work with. It is
//! empty until keys are loaded, and a reload swaps the whole set at once so
//! readers never see Input keys from one file and Output keys from another.

use crate::error::{CodecError, CodecResult};
use crate::types::TaskPayload;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use taskseal_crypto::{load_keys, open_row, SealedRow, TaskKeys};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct KeyStore {
    keys: RwLock<Option<Arc<TaskKeys>>>,
}

impl KeyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding the keys in `path`.
    pub fn from_keys_file(path: impl AsRef<Path>) -> CodecResult<Self> {
        let store = Self::new();
        store.set_keys_in_settings(path)?;
        Ok(store)
    }

    /// Loads and validates a keys file, then installs it.
    ///
    /// On any failure the previously installed keys (if any) stay in place.
    pub fn set_keys_in_settings(&self, path: impl AsRef<Path>) -> CodecResult<()> {
        let path = path.as_ref();
        let keys = load_keys(path)?;
        self.set_keys(keys);
        info!(path = %path.display(), "keys loaded into settings");
        Ok(())
    }

    pub fn set_keys(&self, keys: TaskKeys) {
        let mut slot = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(keys));
    }

    pub fn is_loaded(&self) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Returns a snapshot of the installed key set.
    pub fn current(&self) -> CodecResult<Arc<TaskKeys>> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CodecError::KeysNotLoaded)
    }

    pub fn clear(&self) {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!("keys cleared from settings");
    }
}

/// Loads a keys file into `store`.
pub fn set_keys_in_settings(store: &KeyStore, path: impl AsRef<Path>) -> CodecResult<()> {
    store.set_keys_in_settings(path)
}

/// Decrypts a single task row's base64 `content` with the Input keys.
///
/// `signature` is the row's base64 signature and is verified before
/// anything is decrypted.
pub fn decrypt_task_content(
    store: &KeyStore,
    content: &str,
    signature: &str,
) -> CodecResult<TaskPayload> {
    let keys = store.current()?;
    let sealed = SealedRow::from_base64(content, signature)?;
    let plaintext = open_row(&sealed, keys.inputs())?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| CodecError::Schema(format!("decrypted task payload is malformed: {e}")))
}
