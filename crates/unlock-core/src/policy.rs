//! Key policy vocabulary and its wire representation.
//!
//! Each concept has exactly one enum here. The host speaks camelCase strings
//! (and, for persisted records, small integers); both directions go through
//! the tables in this file.

use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Short validity window for the lock-after-use behaviors.
pub const LOCK_AFTER_USE_SECS: u64 = 5 * 60;
/// Default window for `LockBehavior::LockWithDevice` (14 days).
pub const DEFAULT_AUTO_LOCK_SECS: u64 = 14 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecretScope {
    Sync,
    Backup,
    OneDevice,
    OnePasscode,
    OneBiometric,
}

impl SecretScope {
    const TABLE: [(SecretScope, &'static str, u8); 5] = [
        (SecretScope::Sync, "sync", 1),
        (SecretScope::Backup, "backup", 2),
        (SecretScope::OneDevice, "oneDevice", 3),
        (SecretScope::OnePasscode, "activeSystemLock", 4),
        (SecretScope::OneBiometric, "oneBiometric", 5),
    ];

    pub fn as_wire_str(self) -> &'static str {
        lookup_str(&Self::TABLE, self)
    }

    pub fn from_wire_str(s: &str) -> Result<Self, VaultError> {
        from_str(&Self::TABLE, s, "scope")
    }

    pub fn from_value(v: u8) -> Option<Self> {
        from_value(&Self::TABLE, v)
    }

    /// Keys for this scope are destroyed when the biometric enrollment set changes.
    pub fn invalidated_by_enrollment(self) -> bool {
        self == SecretScope::OneBiometric
    }
}

impl Default for SecretScope {
    fn default() -> Self {
        SecretScope::OnePasscode
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockBehavior {
    LockWithDevice,
    LockAfterUse,
    LockAfterUseBiometricOnly,
}

impl LockBehavior {
    const TABLE: [(LockBehavior, &'static str, u8); 3] = [
        (LockBehavior::LockWithDevice, "lockWithDevice", 1),
        (LockBehavior::LockAfterUse, "lockAfterUse", 2),
        (
            LockBehavior::LockAfterUseBiometricOnly,
            "lockAfterUseBiometricOnly",
            3,
        ),
    ];

    pub fn as_wire_str(self) -> &'static str {
        lookup_str(&Self::TABLE, self)
    }

    pub fn from_wire_str(s: &str) -> Result<Self, VaultError> {
        from_str(&Self::TABLE, s, "lockBehavior")
    }

    pub fn from_value(v: u8) -> Option<Self> {
        from_value(&Self::TABLE, v)
    }

    /// Authenticators the prompt may offer for keys with this behavior.
    pub fn authenticators(self) -> Authenticators {
        match self {
            LockBehavior::LockAfterUseBiometricOnly => Authenticators::BiometricStrong,
            LockBehavior::LockWithDevice | LockBehavior::LockAfterUse => {
                Authenticators::BiometricOrCredential
            }
        }
    }
}

impl Default for LockBehavior {
    fn default() -> Self {
        LockBehavior::LockAfterUse
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchControl {
    #[default]
    None,
    Start,
    Continue,
}

impl BatchControl {
    pub fn as_wire_str(self) -> Option<&'static str> {
        match self {
            BatchControl::None => None,
            BatchControl::Start => Some("start"),
            BatchControl::Continue => Some("continue"),
        }
    }

    /// Absent or unrecognised batch markers mean "no batch".
    pub fn from_wire_str(s: Option<&str>) -> Self {
        match s {
            Some("start") => BatchControl::Start,
            Some("continue") => BatchControl::Continue,
            _ => BatchControl::None,
        }
    }
}

/// Which authenticators can satisfy a prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Authenticators {
    BiometricStrong,
    BiometricOrCredential,
}

impl Authenticators {
    pub fn allows(self, authenticator: Authenticator) -> bool {
        match self {
            Authenticators::BiometricStrong => authenticator == Authenticator::Biometric,
            Authenticators::BiometricOrCredential => true,
        }
    }
}

/// The authenticator that actually proved user presence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Authenticator {
    Biometric,
    DeviceCredential,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyPolicy {
    pub scope: SecretScope,
    pub lock_behavior: LockBehavior,
    pub auto_lock_secs: u64,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            scope: SecretScope::default(),
            lock_behavior: LockBehavior::default(),
            auto_lock_secs: DEFAULT_AUTO_LOCK_SECS,
        }
    }
}

impl KeyPolicy {
    /// Parameters fixed into a key when it is generated.
    pub fn key_parameters(&self) -> KeyParameters {
        let validity_secs = match self.lock_behavior {
            LockBehavior::LockWithDevice => self.auto_lock_secs,
            LockBehavior::LockAfterUse | LockBehavior::LockAfterUseBiometricOnly => {
                LOCK_AFTER_USE_SECS
            }
        };
        KeyParameters {
            scope: self.scope,
            lock_behavior: self.lock_behavior,
            validity_secs,
            authenticators: self.lock_behavior.authenticators(),
            invalidated_by_enrollment: self.scope.invalidated_by_enrollment(),
        }
    }
}

/// Authentication parameters bound to a key for its whole lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyParameters {
    pub scope: SecretScope,
    pub lock_behavior: LockBehavior,
    pub validity_secs: u64,
    pub authenticators: Authenticators,
    pub invalidated_by_enrollment: bool,
}

fn lookup_str<T: PartialEq + Copy>(table: &[(T, &'static str, u8)], item: T) -> &'static str {
    table
        .iter()
        .find(|(v, _, _)| *v == item)
        .map(|(_, s, _)| *s)
        .unwrap_or_default()
}

fn from_str<T: Copy>(
    table: &[(T, &'static str, u8)],
    s: &str,
    field: &str,
) -> Result<T, VaultError> {
    table
        .iter()
        .find(|(_, name, _)| *name == s)
        .map(|(v, _, _)| *v)
        .ok_or_else(|| VaultError::ArgsParsingFailed(format!("unknown {field} '{s}'")))
}

fn from_value<T: Copy>(table: &[(T, &'static str, u8)], n: u8) -> Option<T> {
    table.iter().find(|(_, _, v)| *v == n).map(|(t, _, _)| *t)
}
