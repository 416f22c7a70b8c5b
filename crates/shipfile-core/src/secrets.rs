//! Decryption cache for secret values files
//!
//! Secret files referenced by environments and releases are decrypted by an
//! external tool. Decryption is slow, and the same file is commonly
//! referenced by many releases processed concurrently, so results are cached
//! per absolute path for the lifetime of one run.
//!
//! Guarantees:
//! - exactly one decrypt call per path
//! - concurrent requests for the same path block until the first completes,
//!   then all observe the same bytes (or the same error)
//! - requests for distinct paths proceed in parallel

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::{CoreError, Result};

type Slot = Arc<OnceLock<Result<Arc<[u8]>>>>;

/// Decrypts an encrypted values file into plain YAML bytes
pub trait SecretDecryptor: Send + Sync + std::fmt::Debug {
    fn decrypt(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Read-through, never-invalidated cache of decrypted secret files
#[derive(Debug, Default, Clone)]
pub struct DecryptCache {
    slots: Arc<Mutex<HashMap<PathBuf, Slot>>>,
}

impl DecryptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the decrypted content of `path`, decrypting it on first access
    pub fn get_or_decrypt<F>(&self, path: &Path, decrypt: F) -> Result<Arc<[u8]>>
    where
        F: FnOnce(&Path) -> Result<Vec<u8>>,
    {
        let slot = self.slot(path)?;
        slot.get_or_init(|| {
            tracing::debug!(path = %path.display(), "decrypting secret file");
            decrypt(path).map(Arc::from)
        })
        .clone()
    }

    /// Number of paths that have been requested
    pub fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // The map lock is only held while looking up the slot, never during
    // decryption, so distinct paths do not serialize on each other.
    fn slot(&self, path: &Path) -> Result<Slot> {
        let mut slots = self.slots.lock().map_err(|_| CoreError::Decrypt {
            path: path.display().to_string(),
            message: "decryption cache lock poisoned".to_string(),
        })?;
        Ok(Arc::clone(slots.entry(path.to_path_buf()).or_default()))
    }
}
