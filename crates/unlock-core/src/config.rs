use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::capability::StaticCapabilities;
use crate::credential::DeviceCredential;
use crate::fs_atomic::write_atomic;
use crate::policy::{KeyPolicy, LockBehavior, SecretScope, DEFAULT_AUTO_LOCK_SECS};

pub const DEFAULT_MAX_PASSCODE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnlockSettings {
    /// Feeds the default prompt title ("<label> unlock").
    #[serde(default)]
    pub app_label: Option<String>,
    #[serde(default)]
    pub default_scope: SecretScope,
    #[serde(default)]
    pub default_lock_behavior: LockBehavior,
    #[serde(default = "default_auto_lock_secs")]
    pub auto_lock_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_passcode_attempts: u32,
    #[serde(default = "default_capabilities")]
    pub capabilities: StaticCapabilities,
    #[serde(default)]
    pub credential: Option<DeviceCredential>,
}

fn default_auto_lock_secs() -> u64 {
    DEFAULT_AUTO_LOCK_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_PASSCODE_ATTEMPTS
}

fn default_capabilities() -> StaticCapabilities {
    StaticCapabilities::passcode_only(true)
}

impl Default for UnlockSettings {
    fn default() -> Self {
        Self {
            app_label: None,
            default_scope: SecretScope::default(),
            default_lock_behavior: LockBehavior::default(),
            auto_lock_secs: DEFAULT_AUTO_LOCK_SECS,
            max_passcode_attempts: DEFAULT_MAX_PASSCODE_ATTEMPTS,
            capabilities: default_capabilities(),
            credential: None,
        }
    }
}

impl UnlockSettings {
    /// Missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let settings: Self =
            serde_json::from_slice(&data).map_err(|e| anyhow!("settings parse: {e}"))?;
        if settings.max_passcode_attempts == 0 {
            return Err(anyhow!("maxPasscodeAttempts must be at least 1"));
        }
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &data).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn key_policy(&self) -> KeyPolicy {
        KeyPolicy {
            scope: self.default_scope,
            lock_behavior: self.default_lock_behavior,
            auto_lock_secs: self.auto_lock_secs,
        }
    }
}
