use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

pub const KDF_TIME_COST: u32 = 3;
pub const KDF_MEMORY_COST: u32 = 65536; // 64MB
pub const KDF_PARALLELISM: u32 = 4;
pub const MIN_PASSCODE_LEN: usize = 4;

/// Device credential as an Argon2id PHC string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCredential {
    pub passcode_hash: String,
}

fn hasher() -> Result<Argon2<'static>> {
    let params = Params::new(KDF_MEMORY_COST, KDF_TIME_COST, KDF_PARALLELISM, None)
        .map_err(|e| anyhow!("argon2 params: {e}"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

impl DeviceCredential {
    pub fn create(passcode: &str) -> Result<Self> {
        if passcode.chars().count() < MIN_PASSCODE_LEN {
            return Err(anyhow!(
                "passcode must be at least {MIN_PASSCODE_LEN} characters"
            ));
        }
        let salt = SaltString::generate(&mut OsRng);
        let hash = hasher()?
            .hash_password(passcode.as_bytes(), &salt)
            .map_err(|e| anyhow!("argon2 hash: {e}"))?;
        Ok(Self {
            passcode_hash: hash.to_string(),
        })
    }

    /// Wrong passcodes are `Ok(false)`; only a malformed stored hash errors.
    pub fn verify(&self, passcode: &str) -> Result<bool> {
        let parsed = PasswordHash::new(&self.passcode_hash)
            .map_err(|e| anyhow!("stored passcode hash: {e}"))?;
        Ok(Argon2::default()
            .verify_password(passcode.as_bytes(), &parsed)
            .is_ok())
    }
}
