use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use keyring::Entry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use zeroize::Zeroizing;

use super::KeyStoreError;
use crate::policy::KeyParameters;

const SERVICE_NAME: &str = "DarklockSystemUnlock";
const KEY_PREFIX: &str = "unlock_key";

/// A stored key together with the parameters it was generated with.
#[derive(Clone)]
pub struct KeyRecord {
    pub material: Zeroizing<Vec<u8>>,
    pub params: KeyParameters,
    pub enrollment_epoch: u64,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("params", &self.params)
            .field("enrollment_epoch", &self.enrollment_epoch)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredKeyRecord {
    material: String,
    params: KeyParameters,
    enrollment_epoch: u64,
    created_at: DateTime<Utc>,
}

impl KeyRecord {
    pub fn to_json(&self) -> Result<Zeroizing<String>, KeyStoreError> {
        let stored = StoredKeyRecord {
            material: general_purpose::STANDARD.encode(self.material.as_slice()),
            params: self.params,
            enrollment_epoch: self.enrollment_epoch,
            created_at: self.created_at,
        };
        let json = serde_json::to_string(&stored)
            .map_err(|e| KeyStoreError::Access(format!("encode key record: {e}")))?;
        let _material = Zeroizing::new(stored.material);
        Ok(Zeroizing::new(json))
    }

    pub fn from_json(json: &str) -> Result<Self, KeyStoreError> {
        let stored: StoredKeyRecord = serde_json::from_str(json)
            .map_err(|e| KeyStoreError::Unrecoverable(format!("decode key record: {e}")))?;
        let encoded = Zeroizing::new(stored.material);
        let material = general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| KeyStoreError::Unrecoverable(format!("decode key material: {e}")))?;
        Ok(Self {
            material: Zeroizing::new(material),
            params: stored.params,
            enrollment_epoch: stored.enrollment_epoch,
            created_at: stored.created_at,
        })
    }
}

/// Where key records physically live.
pub trait KeyMaterialVault: Send + Sync {
    fn load(&self, alias: &str) -> Result<Option<KeyRecord>, KeyStoreError>;
    fn store(&self, alias: &str, record: &KeyRecord) -> Result<(), KeyStoreError>;
    fn remove(&self, alias: &str) -> Result<(), KeyStoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryKeyVault {
    records: RwLock<HashMap<String, KeyRecord>>,
}

impl MemoryKeyVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl KeyMaterialVault for MemoryKeyVault {
    fn load(&self, alias: &str) -> Result<Option<KeyRecord>, KeyStoreError> {
        Ok(self.records.read().get(alias).cloned())
    }

    fn store(&self, alias: &str, record: &KeyRecord) -> Result<(), KeyStoreError> {
        self.records.write().insert(alias.to_string(), record.clone());
        Ok(())
    }

    fn remove(&self, alias: &str) -> Result<(), KeyStoreError> {
        self.records.write().remove(alias);
        Ok(())
    }
}

/// Key records in the OS credential store (Secret Service, Keychain,
/// Credential Manager).
#[derive(Debug, Clone)]
pub struct KeyringKeyVault {
    service: String,
}

impl Default for KeyringKeyVault {
    fn default() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }
}

impl KeyringKeyVault {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, alias: &str) -> Result<Entry, KeyStoreError> {
        Entry::new(&self.service, &format!("{}:{}", KEY_PREFIX, alias))
            .map_err(|e| KeyStoreError::Access(format!("keyring init: {e}")))
    }
}

impl KeyMaterialVault for KeyringKeyVault {
    fn load(&self, alias: &str) -> Result<Option<KeyRecord>, KeyStoreError> {
        let entry = self.entry(alias)?;
        match entry.get_password() {
            Ok(json) => {
                let json = Zeroizing::new(json);
                KeyRecord::from_json(&json).map(Some)
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(KeyStoreError::Access(format!("load key: {e}"))),
        }
    }

    fn store(&self, alias: &str, record: &KeyRecord) -> Result<(), KeyStoreError> {
        let json = record.to_json()?;
        self.entry(alias)?
            .set_password(&json)
            .map_err(|e| KeyStoreError::Access(format!("store key: {e}")))
    }

    fn remove(&self, alias: &str) -> Result<(), KeyStoreError> {
        match self.entry(alias)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeyStoreError::Access(format!("delete key: {e}"))),
        }
    }
}
