//! Software key store with authentication-window bookkeeping.
//!
//! Key material lives in a [`KeyMaterialVault`]. The store itself tracks when
//! the user last proved presence with each authenticator and the biometric
//! enrollment epoch, and refuses to hand out a cipher when the key's window
//! is closed or its enrollment binding is stale.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::material::{KeyMaterialVault, KeyRecord};
use super::{CipherPurpose, KeyStoreError, SecureKeyStore};
use crate::cipher::{Cipher, KEY_LEN};
use crate::error::VaultError;
use crate::fs_atomic::write_atomic;
use crate::policy::{Authenticator, Authenticators, KeyParameters};

// chrono::Duration is millisecond-backed.
const MAX_VALIDITY_SECS: i64 = i64::MAX / 1_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthWindowState {
    pub last_biometric: Option<DateTime<Utc>>,
    pub last_device_credential: Option<DateTime<Utc>>,
    #[serde(default)]
    pub enrollment_epoch: u64,
}

impl AuthWindowState {
    fn latest_for(&self, authenticators: Authenticators) -> Option<DateTime<Utc>> {
        match authenticators {
            Authenticators::BiometricStrong => self.last_biometric,
            Authenticators::BiometricOrCredential => {
                match (self.last_biometric, self.last_device_credential) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                }
            }
        }
    }

    fn window_open(&self, params: &KeyParameters, now: DateTime<Utc>) -> bool {
        let Some(at) = self.latest_for(params.authenticators) else {
            return false;
        };
        let secs = i64::try_from(params.validity_secs)
            .unwrap_or(i64::MAX)
            .min(MAX_VALIDITY_SECS);
        let validity = Duration::seconds(secs);
        at <= now && now - at <= validity
    }
}

pub struct SoftwareKeyStore<V: KeyMaterialVault> {
    vault: V,
    state: RwLock<AuthWindowState>,
    state_path: Option<PathBuf>,
}

impl<V: KeyMaterialVault> SoftwareKeyStore<V> {
    pub fn new(vault: V) -> Self {
        Self {
            vault,
            state: RwLock::new(AuthWindowState::default()),
            state_path: None,
        }
    }

    /// Persist window state at `path`, loading whatever is already there.
    pub fn with_state_file(vault: V, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            serde_json::from_slice(&std::fs::read(&path)?)?
        } else {
            AuthWindowState::default()
        };
        Ok(Self {
            vault,
            state: RwLock::new(state),
            state_path: Some(path),
        })
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    pub fn state(&self) -> AuthWindowState {
        self.state.read().clone()
    }

    pub fn record_authentication_at(&self, authenticator: Authenticator, at: DateTime<Utc>) {
        {
            let mut state = self.state.write();
            match authenticator {
                Authenticator::Biometric => state.last_biometric = Some(at),
                Authenticator::DeviceCredential => state.last_device_credential = Some(at),
            }
        }
        debug!(?authenticator, "authentication window opened");
        self.persist_state();
    }

    /// Close every authentication window, as if the device had been locked.
    pub fn lock(&self) {
        {
            let mut state = self.state.write();
            state.last_biometric = None;
            state.last_device_credential = None;
        }
        info!("authentication windows closed");
        self.persist_state();
    }

    /// Signal that the biometric enrollment set changed. Keys bound to the
    /// previous enrollment become permanently invalid.
    pub fn change_enrollment(&self) {
        let epoch = {
            let mut state = self.state.write();
            state.enrollment_epoch += 1;
            state.last_biometric = None;
            state.enrollment_epoch
        };
        info!(epoch, "biometric enrollment changed");
        self.persist_state();
    }

    fn persist_state(&self) {
        let Some(path) = &self.state_path else {
            return;
        };
        let result = serde_json::to_vec_pretty(&*self.state.read())
            .map_err(std::io::Error::other)
            .and_then(|bytes| write_atomic(path, &bytes));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to persist authentication state");
        }
    }

    fn load_usable(&self, alias: &str) -> Result<KeyRecord, KeyStoreError> {
        let record = self.vault.load(alias)?.ok_or(KeyStoreError::NotFound)?;
        let state = self.state.read();
        if record.params.invalidated_by_enrollment
            && record.enrollment_epoch != state.enrollment_epoch
        {
            return Err(KeyStoreError::PermanentlyInvalidated);
        }
        if record.material.len() != KEY_LEN {
            return Err(KeyStoreError::Unrecoverable(format!(
                "expected {KEY_LEN} byte key, found {}",
                record.material.len()
            )));
        }
        if !state.window_open(&record.params, Utc::now()) {
            return Err(KeyStoreError::AuthenticationRequired);
        }
        Ok(record)
    }
}

impl<V: KeyMaterialVault> SecureKeyStore for SoftwareKeyStore<V> {
    fn contains(&self, alias: &str) -> Result<bool, KeyStoreError> {
        match self.vault.load(alias) {
            Ok(record) => Ok(record.is_some()),
            // an unreadable record is still present
            Err(KeyStoreError::Unrecoverable(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    fn generate(&self, alias: &str, params: &KeyParameters) -> Result<(), KeyStoreError> {
        if self.vault.load(alias)?.is_some() {
            return Ok(());
        }
        let mut material = Zeroizing::new(vec![0u8; KEY_LEN]);
        rand::rngs::OsRng.fill_bytes(&mut material);
        let record = KeyRecord {
            material,
            params: *params,
            enrollment_epoch: self.state.read().enrollment_epoch,
            created_at: Utc::now(),
        };
        self.vault.store(alias, &record)?;
        info!(
            alias,
            lock_behavior = params.lock_behavior.as_wire_str(),
            validity_secs = params.validity_secs,
            "generated key"
        );
        Ok(())
    }

    fn cipher(&self, alias: &str, purpose: CipherPurpose) -> Result<Cipher, KeyStoreError> {
        let record = self.load_usable(alias)?;
        let cipher = match purpose {
            CipherPurpose::Encrypt => Cipher::for_encryption(&record.material),
            CipherPurpose::Decrypt { nonce } => Cipher::for_decryption(&record.material, &nonce),
        };
        cipher.map_err(|e| match e {
            VaultError::CryptoFailure(msg) => KeyStoreError::InvalidParameters(msg),
            other => KeyStoreError::InvalidParameters(other.to_string()),
        })
    }

    fn delete(&self, alias: &str) -> Result<(), KeyStoreError> {
        self.vault.remove(alias)?;
        info!(alias, "deleted key");
        Ok(())
    }

    fn record_authentication(&self, authenticator: Authenticator) {
        self.record_authentication_at(authenticator, Utc::now());
    }
}
