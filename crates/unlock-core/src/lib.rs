//! unlock-core: authenticated secret vault
//!
//! Secrets are sealed with AES-256-GCM under keys that are only usable inside
//! an authentication window. Each request is first attempted silently; if the
//! window has closed the user is prompted once and the request is replayed.
//!
//! # Module layout
//! - `policy`        scopes, lock behaviors, batch control, key parameters
//! - `cipher`        single-use AES-256-GCM handles
//! - `keystore`      software key store with authentication windows
//! - `key_manager`   SecureKeyManager: named keys, encrypt/decrypt
//! - `blob_store`    EncryptedBlobStore: ciphertext + nonce persistence
//! - `prompt`        prompt copy, prompt outcomes, the prompt surface trait
//! - `prompt_policy` silent-attempt and failure-surfacing rules
//! - `capability`    device capability checks
//! - `request`       wire requests and responses
//! - `orchestrator`  ActionOrchestrator state machine
//! - `credential`    Argon2id device passcode
//! - `config`        UnlockSettings
//! - `paths`         data directory layout
//! - `error`         VaultError and wire codes

pub mod blob_store;
pub mod capability;
pub mod cipher;
pub mod config;
pub mod credential;
pub mod error;
mod fs_atomic;
pub mod key_manager;
pub mod keystore;
pub mod orchestrator;
pub mod paths;
pub mod policy;
pub mod prompt;
pub mod prompt_policy;
pub mod request;

pub use blob_store::{BlobPersistence, EncryptedBlobStore, FileBlobs, MemoryBlobs};
pub use error::{VaultError, VaultResult};
pub use key_manager::SecureKeyManager;
pub use orchestrator::{ActionOrchestrator, ActionRun, ActionState};
pub use request::{OperationKind, OperationRequest, Outcome, WireRequest, WireResponse};
