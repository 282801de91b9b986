//! Cipher handles bound to a store-held key.
//!
//! AES-256-GCM, 96-bit nonce, 128-bit tag, no padding. A handle is created by
//! the key store with the key already scheduled; callers never see the key
//! bytes. Handles are single-use: `encrypt`/`decrypt` consume them, so an
//! encryption nonce can never be used twice.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::error::VaultError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CipherMode {
    Encrypt,
    Decrypt,
}

/// Output of a single encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

pub struct Cipher {
    aead: Aes256Gcm,
    mode: CipherMode,
    nonce: [u8; NONCE_LEN],
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Cipher {
    /// Schedule `key` for encryption under a fresh random nonce.
    pub fn for_encryption(key: &[u8]) -> Result<Self, VaultError> {
        let aead = Aes256Gcm::new_from_slice(key)
            .map_err(|_| VaultError::CryptoFailure("invalid key length".into()))?;
        let generated = Aes256Gcm::generate_nonce(&mut AeadOsRng);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&generated);
        Ok(Self {
            aead,
            mode: CipherMode::Encrypt,
            nonce,
        })
    }

    /// Schedule `key` for decryption of data sealed under `nonce`.
    pub fn for_decryption(key: &[u8], nonce: &[u8]) -> Result<Self, VaultError> {
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| {
            VaultError::CryptoFailure(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce.len()
            ))
        })?;
        let aead = Aes256Gcm::new_from_slice(key)
            .map_err(|_| VaultError::CryptoFailure("invalid key length".into()))?;
        Ok(Self {
            aead,
            mode: CipherMode::Decrypt,
            nonce,
        })
    }

    pub fn encrypt(self, plaintext: &[u8]) -> Result<EncryptedData, VaultError> {
        if self.mode != CipherMode::Encrypt {
            return Err(VaultError::CryptoFailure(
                "cipher not initialised for encryption".into(),
            ));
        }
        let ciphertext = self
            .aead
            .encrypt(Nonce::from_slice(&self.nonce), plaintext)
            .map_err(|_| VaultError::CryptoFailure("AEAD encryption failed".into()))?;
        Ok(EncryptedData {
            ciphertext,
            nonce: self.nonce.to_vec(),
        })
    }

    pub fn decrypt(self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        if self.mode != CipherMode::Decrypt {
            return Err(VaultError::CryptoFailure(
                "cipher not initialised for decryption".into(),
            ));
        }
        if ciphertext.len() < TAG_LEN {
            return Err(VaultError::CryptoFailure("ciphertext truncated".into()));
        }
        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(&self.nonce), ciphertext)
            .map_err(|_| {
                VaultError::CryptoFailure(
                    "AEAD decryption failed (authentication tag mismatch)".into(),
                )
            })?;
        Ok(Zeroizing::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = [7u8; KEY_LEN];

    #[test]
    fn encrypt_then_decrypt() {
        let sealed = Cipher::for_encryption(&KEY)
            .unwrap()
            .encrypt(b"hunter2")
            .unwrap();
        assert_eq!(sealed.nonce.len(), NONCE_LEN);
        assert_eq!(sealed.ciphertext.len(), 7 + TAG_LEN);
        let opened = Cipher::for_decryption(&KEY, &sealed.nonce)
            .unwrap()
            .decrypt(&sealed.ciphertext)
            .unwrap();
        assert_eq!(opened.as_slice(), b"hunter2");
    }

    #[test]
    fn wrong_mode_is_rejected() {
        let cipher = Cipher::for_encryption(&KEY).unwrap();
        assert!(matches!(
            cipher.decrypt(&[0u8; 32]),
            Err(VaultError::CryptoFailure(_))
        ));
    }

    #[test]
    fn short_nonce_is_rejected() {
        let err = Cipher::for_decryption(&KEY, &[0u8; 8]).unwrap_err();
        assert!(matches!(err, VaultError::CryptoFailure(_)));
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = Cipher::for_encryption(&KEY)
            .unwrap()
            .encrypt(b"payload")
            .unwrap();
        let other = [9u8; KEY_LEN];
        let res = Cipher::for_decryption(&other, &sealed.nonce)
            .unwrap()
            .decrypt(&sealed.ciphertext);
        assert!(res.is_err());
    }
}
