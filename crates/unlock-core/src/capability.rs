//! Device capability checks, run before any vault operation.

use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::policy::Authenticators;

/// Which authenticators the device can offer right now.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Availability {
    Biometric,
    Passcode,
    BiometricAndPasscode,
}

impl Availability {
    pub fn as_wire_str(self) -> &'static str {
        match self {
            Availability::Biometric => "biometric",
            Availability::Passcode => "passcode",
            Availability::BiometricAndPasscode => "biometric+passcode",
        }
    }
}

pub trait DeviceCapabilities: Send + Sync {
    /// Fails with `HardwareNotSupported` or `NotEnrolled` when nothing in
    /// `authenticators` can currently be used.
    fn check(&self, authenticators: Authenticators) -> Result<Availability, VaultError>;
}

/// Capabilities known up front (configuration, tests).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StaticCapabilities {
    pub biometric_hardware: bool,
    pub biometric_enrolled: bool,
    pub device_credential_set: bool,
}

impl StaticCapabilities {
    pub fn all() -> Self {
        Self {
            biometric_hardware: true,
            biometric_enrolled: true,
            device_credential_set: true,
        }
    }

    pub fn passcode_only(device_credential_set: bool) -> Self {
        Self {
            biometric_hardware: false,
            biometric_enrolled: false,
            device_credential_set,
        }
    }
}

impl DeviceCapabilities for StaticCapabilities {
    fn check(&self, authenticators: Authenticators) -> Result<Availability, VaultError> {
        let biometric = self.biometric_hardware && self.biometric_enrolled;
        match authenticators {
            Authenticators::BiometricStrong => {
                if !self.biometric_hardware {
                    Err(VaultError::HardwareNotSupported)
                } else if !self.biometric_enrolled {
                    Err(VaultError::NotEnrolled)
                } else {
                    Ok(Availability::Biometric)
                }
            }
            Authenticators::BiometricOrCredential => match (biometric, self.device_credential_set) {
                (true, true) => Ok(Availability::BiometricAndPasscode),
                (true, false) => Ok(Availability::Biometric),
                (false, true) => Ok(Availability::Passcode),
                (false, false) => Err(VaultError::NotEnrolled),
            },
        }
    }
}
