//! Secure key store contract.
//!
//! A key store holds one symmetric key per alias and never hands out key
//! material. Callers ask for a cipher; the store decides whether the current
//! authentication window allows the key to be used.

use thiserror::Error;

use crate::cipher::Cipher;
use crate::policy::{Authenticator, KeyParameters};

mod material;
mod software;

pub use material::{KeyMaterialVault, KeyRecord, KeyringKeyVault, MemoryKeyVault};
pub use software::{AuthWindowState, SoftwareKeyStore};

/// Failure kinds reported by a key store. Callers switch on these; there is
/// no wrapped platform cause to inspect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    #[error("key not found")]
    NotFound,

    #[error("user authentication required")]
    AuthenticationRequired,

    #[error("key permanently invalidated")]
    PermanentlyInvalidated,

    #[error("key material unrecoverable: {0}")]
    Unrecoverable(String),

    #[error("invalid cipher parameters: {0}")]
    InvalidParameters(String),

    #[error("key store access failed: {0}")]
    Access(String),
}

/// What the cipher will be used for. Decryption carries the stored nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherPurpose {
    Encrypt,
    Decrypt { nonce: Vec<u8> },
}

pub trait SecureKeyStore: Send + Sync {
    fn contains(&self, alias: &str) -> Result<bool, KeyStoreError>;

    /// Generate a key under `alias` unless one already exists.
    fn generate(&self, alias: &str, params: &KeyParameters) -> Result<(), KeyStoreError>;

    fn cipher(&self, alias: &str, purpose: CipherPurpose) -> Result<Cipher, KeyStoreError>;

    /// Delete the key. Deleting a missing alias is not an error.
    fn delete(&self, alias: &str) -> Result<(), KeyStoreError>;

    /// Record a successful user-presence proof, opening the authentication
    /// window for keys that accept `authenticator`.
    fn record_authentication(&self, authenticator: Authenticator);
}
