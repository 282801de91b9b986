//! Key lifecycle for named secrets.
//!
//! One key per secret name, created on first use with the caller's policy and
//! kept until deleted or invalidated by the store.

use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::cipher::{Cipher, EncryptedData};
use crate::error::VaultError;
use crate::keystore::{CipherPurpose, KeyStoreError, SecureKeyStore};
use crate::policy::{Authenticator, KeyPolicy};

impl From<KeyStoreError> for VaultError {
    fn from(err: KeyStoreError) -> Self {
        match err {
            KeyStoreError::NotFound => VaultError::NoSecretFound,
            KeyStoreError::AuthenticationRequired => VaultError::AuthenticationRequired,
            KeyStoreError::PermanentlyInvalidated | KeyStoreError::Unrecoverable(_) => {
                VaultError::KeyInvalidated
            }
            KeyStoreError::InvalidParameters(msg) => VaultError::CryptoFailure(msg),
            KeyStoreError::Access(msg) => VaultError::CryptoFailure(msg),
        }
    }
}

#[derive(Clone)]
pub struct SecureKeyManager {
    store: Arc<dyn SecureKeyStore>,
}

impl SecureKeyManager {
    pub fn new(store: Arc<dyn SecureKeyStore>) -> Self {
        Self { store }
    }

    pub fn has_key(&self, name: &str) -> Result<bool, VaultError> {
        self.store
            .contains(name)
            .map_err(|e| VaultError::CryptoFailure(e.to_string()))
    }

    /// Find or create the key for `name` and return a cipher ready to encrypt.
    ///
    /// An invalidated key is deleted and regenerated once; a second
    /// invalidation fails the call.
    pub fn cipher_for_encryption(
        &self,
        name: &str,
        policy: &KeyPolicy,
    ) -> Result<Cipher, VaultError> {
        match self.try_cipher_for_encryption(name, policy) {
            Err(VaultError::KeyInvalidated) => {
                warn!(name, "key invalidated, regenerating");
                self.remove_key(name)?;
                self.try_cipher_for_encryption(name, policy)
                    .map_err(|e| match e {
                        VaultError::KeyInvalidated => VaultError::CryptoFailure(
                            "key invalidated again after regeneration".into(),
                        ),
                        other => other,
                    })
            }
            other => other,
        }
    }

    fn try_cipher_for_encryption(
        &self,
        name: &str,
        policy: &KeyPolicy,
    ) -> Result<Cipher, VaultError> {
        self.store.generate(name, &policy.key_parameters())?;
        Ok(self.store.cipher(name, CipherPurpose::Encrypt)?)
    }

    pub fn cipher_for_decryption(&self, name: &str, nonce: &[u8]) -> Result<Cipher, VaultError> {
        Ok(self.store.cipher(
            name,
            CipherPurpose::Decrypt {
                nonce: nonce.to_vec(),
            },
        )?)
    }

    pub fn encrypt(&self, plaintext: &str, cipher: Cipher) -> Result<EncryptedData, VaultError> {
        cipher.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        cipher: Cipher,
    ) -> Result<Zeroizing<String>, VaultError> {
        let bytes = cipher.decrypt(ciphertext)?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| VaultError::CryptoFailure(format!("plaintext is not UTF-8: {e}")))?;
        Ok(Zeroizing::new(text.to_owned()))
    }

    pub fn remove_key(&self, name: &str) -> Result<(), VaultError> {
        self.store
            .delete(name)
            .map_err(|e| VaultError::CryptoFailure(e.to_string()))
    }

    /// Hand a fresh user-presence proof to the store.
    pub fn authorize(&self, authenticator: Authenticator) {
        debug!(?authenticator, "recording user authentication");
        self.store.record_authentication(authenticator);
    }
}
