use thiserror::Error;

/// Numeric error codes reported to the host on the wire.
pub mod codes {
    pub const UNKNOWN_ERROR: i32 = -100;
    pub const AUTHENTICATION_FAILED: i32 = -102;
    pub const HARDWARE_NOT_SUPPORTED: i32 = -104;
    pub const NOT_ENROLLED: i32 = -106;
    pub const DISMISSED: i32 = -108;
    pub const LOCKED_OUT: i32 = -111;
    pub const LOCKED_OUT_PERMANENT: i32 = -112;
    pub const NO_SECRET_FOUND: i32 = -113;
    pub const ARGS_PARSING_FAILED: i32 = -115;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Invalid request arguments: {0}")]
    ArgsParsingFailed(String),

    #[error("No secret found")]
    NoSecretFound,

    #[error("User authentication required")]
    AuthenticationRequired,

    #[error("Key permanently invalidated")]
    KeyInvalidated,

    #[error("Authentication dismissed by user")]
    AuthenticationDismissed,

    #[error("Too many attempts, try again later: {0}")]
    LockedOut(String),

    #[error("Too many attempts, authentication disabled: {0}")]
    LockedOutPermanent(String),

    #[error("Authentication hardware not supported")]
    HardwareNotSupported,

    #[error("No biometric or device credential enrolled")]
    NotEnrolled,

    #[error("Crypto failure: {0}")]
    CryptoFailure(String),

    #[error("Prompt error {code}: {message}")]
    Prompt { code: i32, message: String },

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl VaultError {
    /// Code reported to the host for this failure.
    pub fn code(&self) -> i32 {
        match self {
            VaultError::ArgsParsingFailed(_) => codes::ARGS_PARSING_FAILED,
            VaultError::NoSecretFound | VaultError::KeyInvalidated => codes::NO_SECRET_FOUND,
            VaultError::AuthenticationRequired => codes::AUTHENTICATION_FAILED,
            VaultError::AuthenticationDismissed => codes::DISMISSED,
            VaultError::LockedOut(_) => codes::LOCKED_OUT,
            VaultError::LockedOutPermanent(_) => codes::LOCKED_OUT_PERMANENT,
            VaultError::HardwareNotSupported => codes::HARDWARE_NOT_SUPPORTED,
            VaultError::NotEnrolled => codes::NOT_ENROLLED,
            VaultError::Prompt { code, .. } => *code,
            VaultError::CryptoFailure(_) | VaultError::Unknown(_) => codes::UNKNOWN_ERROR,
        }
    }

    /// True when the failure means "nothing usable is stored under this name".
    pub fn is_missing_secret(&self) -> bool {
        matches!(self, VaultError::NoSecretFound | VaultError::KeyInvalidated)
    }
}

impl From<crate::blob_store::BlobError> for VaultError {
    fn from(err: crate::blob_store::BlobError) -> Self {
        match err {
            crate::blob_store::BlobError::Corrupt(msg) => VaultError::CryptoFailure(msg),
            other => VaultError::Unknown(other.to_string()),
        }
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
