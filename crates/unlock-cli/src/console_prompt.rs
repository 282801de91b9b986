use anyhow::{anyhow, Result};
use tracing::{debug, warn};
use unlock_core::credential::DeviceCredential;
use unlock_core::error::codes;
use unlock_core::policy::{Authenticator, Authenticators};
use unlock_core::prompt::{AuthResult, PromptCopy, PromptSurface};
use zeroize::Zeroizing;

pub const PASSCODE_ENV: &str = "UNLOCK_PASSCODE";
pub const PASSCODE_CONFIRM_ENV: &str = "UNLOCK_PASSCODE_CONFIRM";

/// Terminal prompt verifying the device passcode. Output goes to stderr so
/// stdout stays machine-readable.
pub struct ConsolePrompt {
    credential: Option<DeviceCredential>,
    max_attempts: u32,
}

impl ConsolePrompt {
    pub fn new(credential: Option<DeviceCredential>, max_attempts: u32) -> Self {
        Self {
            credential,
            max_attempts: max_attempts.max(1),
        }
    }

    fn render(copy: &PromptCopy) {
        eprintln!("== {} ==", copy.title);
        if let Some(subtitle) = &copy.subtitle {
            eprintln!("{subtitle}");
        }
        if let Some(description) = &copy.description {
            eprintln!("{description}");
        }
        eprintln!("(leave empty to {})", copy.cancel_button_title.to_lowercase());
    }
}

impl PromptSurface for ConsolePrompt {
    fn present(&self, authenticators: Authenticators, copy: &PromptCopy) -> AuthResult {
        if authenticators == Authenticators::BiometricStrong {
            return AuthResult::OtherError {
                code: codes::HARDWARE_NOT_SUPPORTED,
                message: "biometric prompt is not available on the console".into(),
            };
        }
        let Some(credential) = &self.credential else {
            return AuthResult::OtherError {
                code: codes::NOT_ENROLLED,
                message: "no device passcode set; run init first".into(),
            };
        };

        if let Some(passcode) = passcode_from_env() {
            return match credential.verify(&passcode) {
                Ok(true) => AuthResult::Succeeded(Authenticator::DeviceCredential),
                Ok(false) => AuthResult::OtherError {
                    code: codes::AUTHENTICATION_FAILED,
                    message: format!("passcode from {PASSCODE_ENV} rejected"),
                },
                Err(e) => AuthResult::OtherError {
                    code: codes::UNKNOWN_ERROR,
                    message: e.to_string(),
                },
            };
        }

        Self::render(copy);
        for attempt in 1..=self.max_attempts {
            let entry = match rpassword::prompt_password("Passcode: ") {
                Ok(entry) => Zeroizing::new(entry),
                Err(e) => {
                    return AuthResult::OtherError {
                        code: codes::UNKNOWN_ERROR,
                        message: format!("passcode prompt: {e}"),
                    }
                }
            };
            if entry.is_empty() {
                return AuthResult::Cancelled;
            }
            match credential.verify(&entry) {
                Ok(true) => {
                    debug!(attempt, "passcode accepted");
                    return AuthResult::Succeeded(Authenticator::DeviceCredential);
                }
                Ok(false) => {
                    warn!(attempt, "passcode rejected");
                    eprintln!("Passcode not recognized.");
                }
                Err(e) => {
                    return AuthResult::OtherError {
                        code: codes::UNKNOWN_ERROR,
                        message: e.to_string(),
                    }
                }
            }
        }
        AuthResult::Lockout(format!("{} failed passcode attempts", self.max_attempts))
    }
}

fn passcode_from_env() -> Option<Zeroizing<String>> {
    std::env::var(PASSCODE_ENV)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(Zeroizing::new)
}

pub fn prompt_new_passcode() -> Result<Zeroizing<String>> {
    if let Some(pw) = passcode_from_env() {
        if let Ok(confirm) = std::env::var(PASSCODE_CONFIRM_ENV) {
            if confirm != *pw {
                return Err(anyhow!("passcode confirmation mismatch"));
            }
        }
        return Ok(pw);
    }
    let first = Zeroizing::new(
        rpassword::prompt_password("New passcode: ").map_err(|e| anyhow!("passcode prompt: {e}"))?,
    );
    let second = Zeroizing::new(
        rpassword::prompt_password("Confirm passcode: ")
            .map_err(|e| anyhow!("passcode prompt: {e}"))?,
    );
    if *first != *second {
        return Err(anyhow!("passcodes do not match"));
    }
    Ok(first)
}

pub fn prompt_secret_value() -> Result<Option<Zeroizing<String>>> {
    let value = Zeroizing::new(
        rpassword::prompt_password("Secret value: ").map_err(|e| anyhow!("secret prompt: {e}"))?,
    );
    Ok(if value.is_empty() { None } else { Some(value) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn biometric_requests_are_refused() {
        let prompt = ConsolePrompt::new(None, 3);
        let result = prompt.present(Authenticators::BiometricStrong, &PromptCopy::default());
        assert!(matches!(
            result,
            AuthResult::OtherError { code, .. } if code == codes::HARDWARE_NOT_SUPPORTED
        ));
    }

    #[test]
    fn missing_credential_reports_not_enrolled() {
        let prompt = ConsolePrompt::new(None, 3);
        let result = prompt.present(Authenticators::BiometricOrCredential, &PromptCopy::default());
        assert!(matches!(
            result,
            AuthResult::OtherError { code, .. } if code == codes::NOT_ENROLLED
        ));
    }
}
