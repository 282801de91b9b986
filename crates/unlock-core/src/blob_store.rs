//! Ciphertext + nonce persistence for named secrets.
//!
//! Each secret name maps to two entries in a key-value collaborator. Both are
//! written and removed in one atomic batch so a reader never sees a
//! ciphertext without its nonce.

use base64::{engine::general_purpose, Engine as _};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::cipher::EncryptedData;
use crate::error::VaultError;
use crate::fs_atomic::write_atomic;

const CIPHERTEXT_SUFFIX: &str = "ciphertext";
const NONCE_SUFFIX: &str = "nonce";

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt blob: {0}")]
    Corrupt(String),
}

/// Key-value storage for byte strings with atomic multi-key writes.
pub trait BlobPersistence: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError>;
    fn put_all(&self, entries: &[(String, Vec<u8>)]) -> Result<(), BlobError>;
    fn remove_all(&self, keys: &[String]) -> Result<(), BlobError>;
}

#[derive(Debug, Default)]
pub struct MemoryBlobs {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl BlobPersistence for MemoryBlobs {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put_all(&self, entries: &[(String, Vec<u8>)]) -> Result<(), BlobError> {
        let mut map = self.entries.write();
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[String]) -> Result<(), BlobError> {
        let mut map = self.entries.write();
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }
}

/// A JSON document of base64 values, rewritten atomically on every change.
#[derive(Debug)]
pub struct FileBlobs {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileBlobs {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, BlobError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let bytes = std::fs::read(&self.path)?;
        if bytes.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), BlobError> {
        let bytes = serde_json::to_vec_pretty(map)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

impl BlobPersistence for FileBlobs {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let _guard = self.lock.read();
        let map = self.read_map()?;
        map.get(key)
            .map(|encoded| {
                general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| BlobError::Corrupt(format!("{key}: {e}")))
            })
            .transpose()
    }

    fn put_all(&self, entries: &[(String, Vec<u8>)]) -> Result<(), BlobError> {
        let _guard = self.lock.write();
        let mut map = self.read_map()?;
        for (key, value) in entries {
            map.insert(key.clone(), general_purpose::STANDARD.encode(value));
        }
        self.write_map(&map)
    }

    fn remove_all(&self, keys: &[String]) -> Result<(), BlobError> {
        let _guard = self.lock.write();
        let mut map = self.read_map()?;
        let before = map.len();
        for key in keys {
            map.remove(key);
        }
        if map.len() == before {
            return Ok(());
        }
        self.write_map(&map)
    }
}

#[derive(Clone)]
pub struct EncryptedBlobStore {
    backend: Arc<dyn BlobPersistence>,
}

impl EncryptedBlobStore {
    pub fn new(backend: Arc<dyn BlobPersistence>) -> Self {
        Self { backend }
    }

    fn keys_for(name: &str) -> (String, String) {
        (
            format!("secret:{name}:{CIPHERTEXT_SUFFIX}"),
            format!("secret:{name}:{NONCE_SUFFIX}"),
        )
    }

    pub fn save(&self, name: &str, data: &EncryptedData) -> Result<(), VaultError> {
        let (ct_key, nonce_key) = Self::keys_for(name);
        self.backend.put_all(&[
            (nonce_key, data.nonce.clone()),
            (ct_key, data.ciphertext.clone()),
        ])?;
        debug!(name, bytes = data.ciphertext.len(), "stored ciphertext");
        Ok(())
    }

    pub fn load_nonce(&self, name: &str) -> Result<Vec<u8>, VaultError> {
        let (_, nonce_key) = Self::keys_for(name);
        self.backend
            .get(&nonce_key)?
            .ok_or(VaultError::NoSecretFound)
    }

    pub fn load_ciphertext(&self, name: &str) -> Result<Vec<u8>, VaultError> {
        let (ct_key, _) = Self::keys_for(name);
        self.backend.get(&ct_key)?.ok_or(VaultError::NoSecretFound)
    }

    pub fn load(&self, name: &str) -> Result<EncryptedData, VaultError> {
        Ok(EncryptedData {
            nonce: self.load_nonce(name)?,
            ciphertext: self.load_ciphertext(name)?,
        })
    }

    pub fn remove(&self, name: &str) -> Result<(), VaultError> {
        let (ct_key, nonce_key) = Self::keys_for(name);
        self.backend.remove_all(&[ct_key, nonce_key])?;
        Ok(())
    }
}
