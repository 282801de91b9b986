use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::policy::{Authenticator, Authenticators};

pub const DEFAULT_TITLE: &str = "App unlock";
pub const DEFAULT_CANCEL_TITLE: &str = "Cancel";

/// Text shown on the authentication prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PromptCopy {
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub cancel_button_title: String,
    pub confirmation_required: bool,
}

impl Default for PromptCopy {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            subtitle: None,
            description: None,
            cancel_button_title: DEFAULT_CANCEL_TITLE.to_string(),
            confirmation_required: true,
        }
    }
}

/// Terminal outcome of one prompt. Recoverable mismatches (a single wrong
/// fingerprint or passcode) are handled inside the surface and never show up
/// here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Succeeded(Authenticator),
    Cancelled,
    NegativeButton,
    Lockout(String),
    LockoutPermanent(String),
    OtherError { code: i32, message: String },
}

impl AuthResult {
    pub fn into_result(self) -> Result<Authenticator, VaultError> {
        match self {
            AuthResult::Succeeded(authenticator) => Ok(authenticator),
            AuthResult::Cancelled | AuthResult::NegativeButton => {
                Err(VaultError::AuthenticationDismissed)
            }
            AuthResult::Lockout(msg) => Err(VaultError::LockedOut(msg)),
            AuthResult::LockoutPermanent(msg) => Err(VaultError::LockedOutPermanent(msg)),
            AuthResult::OtherError { code, message } => Err(VaultError::Prompt { code, message }),
        }
    }
}

/// The user-facing authentication prompt. `present` blocks until the user
/// succeeds, gives up, or the platform reports a terminal error.
pub trait PromptSurface: Send + Sync {
    fn present(&self, authenticators: Authenticators, copy: &PromptCopy) -> AuthResult;
}
