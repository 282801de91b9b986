//! When to try an operation without prompting.

use crate::error::VaultError;
use crate::policy::BatchControl;
use crate::request::OperationKind;

/// Whether `kind` should first be attempted against the current
/// authentication window instead of prompting up front.
///
/// Delete is inverted relative to Set/Get: it is destructive, so it only
/// rides an existing window when the caller explicitly continues a batch.
pub fn should_attempt_silently(kind: OperationKind, batch: BatchControl) -> bool {
    match kind {
        OperationKind::Challenge => false,
        OperationKind::SetSecret | OperationKind::GetSecret => batch != BatchControl::Start,
        OperationKind::DeleteSecret => batch == BatchControl::Continue,
        OperationKind::HasSecret | OperationKind::IsAvailable => true,
    }
}

/// Whether a failed silent attempt goes straight back to the caller rather
/// than falling through to a prompt.
pub fn should_surface_failure(failure: &VaultError, interaction_not_allowed: bool) -> bool {
    !matches!(failure, VaultError::AuthenticationRequired) || interaction_not_allowed
}
