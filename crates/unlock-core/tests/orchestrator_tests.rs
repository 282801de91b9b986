use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use unlock_core::blob_store::{BlobError, BlobPersistence};
use unlock_core::capability::{Availability, StaticCapabilities};
use unlock_core::error::codes;
use unlock_core::keystore::{MemoryKeyVault, SoftwareKeyStore};
use unlock_core::policy::{
    Authenticator, Authenticators, BatchControl, LockBehavior, SecretScope,
};
use unlock_core::prompt::{AuthResult, PromptCopy, PromptSurface};
use unlock_core::{
    ActionOrchestrator, ActionState, EncryptedBlobStore, MemoryBlobs, OperationKind,
    OperationRequest, Outcome, SecureKeyManager, VaultError, WireRequest, WireResponse,
};

/// Plays back queued results; succeeds with the strongest allowed
/// authenticator once the queue is empty.
#[derive(Default)]
struct ScriptedPrompt {
    queued: Mutex<VecDeque<AuthResult>>,
    presented: Mutex<Vec<(Authenticators, String)>>,
}

impl ScriptedPrompt {
    fn push(&self, result: AuthResult) {
        self.queued.lock().push_back(result);
    }

    fn calls(&self) -> usize {
        self.presented.lock().len()
    }
}

impl PromptSurface for ScriptedPrompt {
    fn present(&self, authenticators: Authenticators, copy: &PromptCopy) -> AuthResult {
        self.presented
            .lock()
            .push((authenticators, copy.title.clone()));
        self.queued.lock().pop_front().unwrap_or(match authenticators {
            Authenticators::BiometricStrong => AuthResult::Succeeded(Authenticator::Biometric),
            Authenticators::BiometricOrCredential => {
                AuthResult::Succeeded(Authenticator::DeviceCredential)
            }
        })
    }
}

struct Harness {
    orchestrator: ActionOrchestrator,
    store: Arc<SoftwareKeyStore<MemoryKeyVault>>,
    blobs: Arc<MemoryBlobs>,
    prompt: Arc<ScriptedPrompt>,
}

impl Harness {
    fn new() -> Self {
        Self::with_capabilities(StaticCapabilities::all())
    }

    fn with_capabilities(capabilities: StaticCapabilities) -> Self {
        let store = Arc::new(SoftwareKeyStore::new(MemoryKeyVault::new()));
        let blobs = Arc::new(MemoryBlobs::new());
        let prompt = Arc::new(ScriptedPrompt::default());
        let orchestrator = ActionOrchestrator::new(
            SecureKeyManager::new(store.clone()),
            EncryptedBlobStore::new(blobs.clone()),
            prompt.clone(),
            Arc::new(capabilities),
        );
        Self {
            orchestrator,
            store,
            blobs,
            prompt,
        }
    }

    fn set(&self, name: &str, value: &str) {
        let request = OperationRequest::new(OperationKind::SetSecret)
            .named(name)
            .with_secret(value);
        assert_eq!(self.orchestrator.execute(&request), Ok(Outcome::Completed));
    }
}

fn secret(value: &str) -> Outcome {
    Outcome::Secret(zeroize::Zeroizing::new(value.to_string()))
}

#[test]
fn set_prompts_once_and_replays() {
    let h = Harness::new();
    let request = OperationRequest::new(OperationKind::SetSecret)
        .named("token")
        .with_secret("abc123");

    let run = h.orchestrator.run(&request);
    assert_eq!(run.result, Ok(Outcome::Completed));
    assert_eq!(run.prompts, 1);
    assert_eq!(
        run.states,
        vec![
            ActionState::Idle,
            ActionState::Attempting,
            ActionState::NeedsPrompt,
            ActionState::PromptPending,
            ActionState::PostPromptAttempt,
            ActionState::Succeeded,
        ]
    );
    assert_eq!(
        h.blobs.keys(),
        vec![
            "secret:token:ciphertext".to_string(),
            "secret:token:nonce".to_string()
        ]
    );

    // window is still open, so the read is silent
    let get = OperationRequest::new(OperationKind::GetSecret).named("token");
    assert_eq!(h.orchestrator.execute(&get), Ok(secret("abc123")));
    assert_eq!(h.prompt.calls(), 1);
}

#[test]
fn missing_secret_fails_without_prompt() {
    let h = Harness::new();
    let run = h
        .orchestrator
        .run(&OperationRequest::new(OperationKind::GetSecret).named("absent"));
    assert_eq!(run.result, Err(VaultError::NoSecretFound));
    assert_eq!(run.result.unwrap_err().code(), codes::NO_SECRET_FOUND);
    assert_eq!(
        run.states,
        vec![
            ActionState::Idle,
            ActionState::Attempting,
            ActionState::Failed
        ]
    );
    assert_eq!(h.prompt.calls(), 0);
}

#[test]
fn set_without_value_touches_nothing() {
    let h = Harness::new();
    let request = OperationRequest::new(OperationKind::SetSecret).named("token");
    let err = h.orchestrator.execute(&request).unwrap_err();
    assert!(matches!(err, VaultError::ArgsParsingFailed(_)));
    assert_eq!(err.code(), codes::ARGS_PARSING_FAILED);
    assert_eq!(h.prompt.calls(), 0);
    assert!(h.blobs.keys().is_empty());
    assert!(h.store.vault().is_empty());
}

#[test]
fn continued_batch_prompts_at_most_once() {
    let h = Harness::new();
    h.set("a", "one");
    h.store.lock();

    for (name, value) in [("a", "one"), ("b", "two")] {
        let request = OperationRequest::new(OperationKind::SetSecret)
            .named(name)
            .with_secret(value)
            .with_batch(BatchControl::Continue);
        h.orchestrator.execute(&request).unwrap();
    }
    // one prompt for the initial set, one when the continued batch found the
    // window closed, none for the second continued request
    assert_eq!(h.prompt.calls(), 2);
}

#[test]
fn post_prompt_failure_is_final() {
    let h = Harness::new();
    // a dismissed prompt ends the run without a retry
    h.prompt.push(AuthResult::Cancelled);
    let request = OperationRequest::new(OperationKind::SetSecret)
        .named("bio")
        .with_secret("x")
        .with_lock_behavior(LockBehavior::LockAfterUseBiometricOnly);
    let run = h.orchestrator.run(&request);
    assert_eq!(run.result, Err(VaultError::AuthenticationDismissed));
    assert_eq!(run.prompts, 1);
    assert!(!run.states.contains(&ActionState::PostPromptAttempt));
}

#[test]
fn post_prompt_attempt_failure_is_final() {
    let h = Harness::new();
    let set = OperationRequest::new(OperationKind::SetSecret)
        .named("bio")
        .with_secret("fingerprint-bound")
        .with_lock_behavior(LockBehavior::LockAfterUseBiometricOnly);
    assert_eq!(h.orchestrator.execute(&set), Ok(Outcome::Completed));
    h.store.lock();

    // the default get accepts a passcode, which cannot unlock a biometric-only key
    let calls = h.prompt.calls();
    let run = h
        .orchestrator
        .run(&OperationRequest::new(OperationKind::GetSecret).named("bio"));
    assert_eq!(run.result, Err(VaultError::AuthenticationRequired));
    assert_eq!(run.prompts, 1);
    assert_eq!(h.prompt.calls(), calls + 1);
    assert_eq!(
        &run.states[run.states.len() - 2..],
        &[ActionState::PostPromptAttempt, ActionState::Failed]
    );
}

/// Memory backend whose removals always fail.
struct StuckBlobs(MemoryBlobs);

impl BlobPersistence for StuckBlobs {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        self.0.get(key)
    }

    fn put_all(&self, entries: &[(String, Vec<u8>)]) -> Result<(), BlobError> {
        self.0.put_all(entries)
    }

    fn remove_all(&self, _keys: &[String]) -> Result<(), BlobError> {
        Err(BlobError::Io(std::io::Error::other("disk full")))
    }
}

#[test]
fn failed_blob_removal_keeps_secret_readable() {
    let store = Arc::new(SoftwareKeyStore::new(MemoryKeyVault::new()));
    let orchestrator = ActionOrchestrator::new(
        SecureKeyManager::new(store.clone()),
        EncryptedBlobStore::new(Arc::new(StuckBlobs(MemoryBlobs::new()))),
        Arc::new(ScriptedPrompt::default()),
        Arc::new(StaticCapabilities::all()),
    );
    let set = OperationRequest::new(OperationKind::SetSecret)
        .named("token")
        .with_secret("abc123");
    assert_eq!(orchestrator.execute(&set), Ok(Outcome::Completed));

    let delete = OperationRequest::new(OperationKind::DeleteSecret)
        .named("token")
        .with_batch(BatchControl::Continue);
    let err = orchestrator.execute(&delete).unwrap_err();
    assert_eq!(err.code(), codes::UNKNOWN_ERROR);

    assert!(!store.vault().is_empty());
    assert_eq!(
        orchestrator.execute(&OperationRequest::new(OperationKind::GetSecret).named("token")),
        Ok(secret("abc123"))
    );
}

#[test]
fn delete_removes_key_and_blob() {
    let h = Harness::new();
    h.set("token", "abc123");

    let delete = OperationRequest::new(OperationKind::DeleteSecret).named("token");
    let run = h.orchestrator.run(&delete);
    assert_eq!(run.result, Ok(Outcome::Completed));
    // delete outside a continued batch always prompts
    assert_eq!(run.prompts, 1);
    assert_eq!(run.states[1], ActionState::PromptPending);

    assert!(h.blobs.keys().is_empty());
    assert!(h.store.vault().is_empty());
    assert_eq!(
        h.orchestrator
            .execute(&OperationRequest::new(OperationKind::HasSecret).named("token")),
        Ok(Outcome::Exists(false))
    );
    assert_eq!(
        h.orchestrator
            .execute(&OperationRequest::new(OperationKind::GetSecret).named("token")),
        Err(VaultError::NoSecretFound)
    );
}

#[test]
fn delete_in_continued_batch_is_silent_and_idempotent() {
    let h = Harness::new();
    h.set("token", "abc123");
    let calls = h.prompt.calls();

    let delete = OperationRequest::new(OperationKind::DeleteSecret)
        .named("token")
        .with_batch(BatchControl::Continue);
    assert_eq!(h.orchestrator.execute(&delete), Ok(Outcome::Completed));
    assert_eq!(h.orchestrator.execute(&delete), Ok(Outcome::Completed));
    assert_eq!(h.prompt.calls(), calls);
}

#[test]
fn non_interactive_request_surfaces_authentication_required() {
    let h = Harness::new();
    h.set("token", "abc123");
    h.store.lock();

    let get = OperationRequest::new(OperationKind::GetSecret)
        .named("token")
        .non_interactive();
    let err = h.orchestrator.execute(&get).unwrap_err();
    assert_eq!(err, VaultError::AuthenticationRequired);
    assert_eq!(err.code(), codes::AUTHENTICATION_FAILED);
    assert_eq!(h.prompt.calls(), 1);
}

#[test]
fn prompt_failures_map_to_codes() {
    let h = Harness::new();
    let challenge = OperationRequest::new(OperationKind::Challenge);

    h.prompt.push(AuthResult::NegativeButton);
    assert_eq!(
        h.orchestrator.execute(&challenge).unwrap_err().code(),
        codes::DISMISSED
    );

    h.prompt.push(AuthResult::Lockout("try later".into()));
    assert_eq!(
        h.orchestrator.execute(&challenge),
        Err(VaultError::LockedOut("try later".into()))
    );

    h.prompt
        .push(AuthResult::LockoutPermanent("sensor disabled".into()));
    assert_eq!(
        h.orchestrator.execute(&challenge).unwrap_err().code(),
        codes::LOCKED_OUT_PERMANENT
    );

    h.prompt.push(AuthResult::OtherError {
        code: -7,
        message: "hw unavailable".into(),
    });
    assert_eq!(h.orchestrator.execute(&challenge).unwrap_err().code(), -7);
}

#[test]
fn start_batch_prompts_even_with_open_window() {
    let h = Harness::new();
    h.set("token", "abc123");

    let get = OperationRequest::new(OperationKind::GetSecret)
        .named("token")
        .with_batch(BatchControl::Start);
    let run = h.orchestrator.run(&get);
    assert_eq!(run.result, Ok(secret("abc123")));
    assert_eq!(
        run.states,
        vec![
            ActionState::Idle,
            ActionState::PromptPending,
            ActionState::PostPromptAttempt,
            ActionState::Succeeded,
        ]
    );
    assert_eq!(h.prompt.calls(), 2);
}

#[test]
fn challenge_prompts_and_opens_window() {
    let h = Harness::new();
    assert!(h.store.state().last_device_credential.is_none());
    let run = h
        .orchestrator
        .run(&OperationRequest::new(OperationKind::Challenge));
    assert_eq!(run.result, Ok(Outcome::Completed));
    assert_eq!(run.prompts, 1);
    assert!(h.store.state().last_device_credential.is_some());
    assert_eq!(h.prompt.presented.lock()[0].1, "App unlock");
}

#[test]
fn has_secret_never_prompts() {
    let h = Harness::new();
    let has = OperationRequest::new(OperationKind::HasSecret).named("token");
    assert_eq!(h.orchestrator.execute(&has), Ok(Outcome::Exists(false)));

    h.set("token", "abc123");
    h.store.lock();
    let calls = h.prompt.calls();
    assert_eq!(h.orchestrator.execute(&has), Ok(Outcome::Exists(true)));
    assert_eq!(h.prompt.calls(), calls);
}

#[test]
fn biometric_only_key_prompts_for_biometric() {
    let h = Harness::new();
    let request = OperationRequest::new(OperationKind::SetSecret)
        .named("bio")
        .with_secret("fingerprint-bound")
        .with_lock_behavior(LockBehavior::LockAfterUseBiometricOnly);
    assert_eq!(h.orchestrator.execute(&request), Ok(Outcome::Completed));
    assert_eq!(
        h.prompt.presented.lock()[0].0,
        Authenticators::BiometricStrong
    );
    assert!(h.store.state().last_biometric.is_some());
}

#[test]
fn passcode_does_not_satisfy_biometric_only_prompt() {
    let h = Harness::new();
    h.prompt
        .push(AuthResult::Succeeded(Authenticator::DeviceCredential));
    let request = OperationRequest::new(OperationKind::Challenge)
        .with_lock_behavior(LockBehavior::LockAfterUseBiometricOnly);
    let err = h.orchestrator.execute(&request).unwrap_err();
    assert_eq!(err.code(), codes::UNKNOWN_ERROR);
    assert!(h.store.state().last_device_credential.is_none());
}

#[test]
fn lock_with_device_outlives_lock_after_use() {
    let h = Harness::new();
    let request = OperationRequest::new(OperationKind::SetSecret)
        .named("long")
        .with_secret("lived")
        .with_lock_behavior(LockBehavior::LockWithDevice);
    h.orchestrator.execute(&request).unwrap();
    h.set("short", "lived");

    h.store.lock();
    h.store
        .record_authentication_at(Authenticator::DeviceCredential, Utc::now() - Duration::hours(1));
    let calls = h.prompt.calls();

    let get_long = OperationRequest::new(OperationKind::GetSecret)
        .named("long")
        .non_interactive();
    assert_eq!(h.orchestrator.execute(&get_long), Ok(secret("lived")));
    let get_short = OperationRequest::new(OperationKind::GetSecret)
        .named("short")
        .non_interactive();
    assert_eq!(
        h.orchestrator.execute(&get_short),
        Err(VaultError::AuthenticationRequired)
    );
    assert_eq!(h.prompt.calls(), calls);
}

#[test]
fn enrollment_change_invalidates_biometric_scoped_secret() {
    let h = Harness::new();
    let set = OperationRequest::new(OperationKind::SetSecret)
        .named("bio")
        .with_secret("v1")
        .with_scope(SecretScope::OneBiometric)
        .with_lock_behavior(LockBehavior::LockAfterUseBiometricOnly);
    h.orchestrator.execute(&set).unwrap();
    h.store.change_enrollment();
    let calls = h.prompt.calls();

    let get = OperationRequest::new(OperationKind::GetSecret).named("bio");
    assert_eq!(h.orchestrator.execute(&get), Err(VaultError::NoSecretFound));
    assert_eq!(
        h.orchestrator
            .execute(&OperationRequest::new(OperationKind::HasSecret).named("bio")),
        Ok(Outcome::Exists(false))
    );
    assert_eq!(h.prompt.calls(), calls);

    // storing again replaces the invalidated key
    let set_again = OperationRequest::new(OperationKind::SetSecret)
        .named("bio")
        .with_secret("v2")
        .with_scope(SecretScope::OneBiometric)
        .with_lock_behavior(LockBehavior::LockAfterUseBiometricOnly);
    h.orchestrator.execute(&set_again).unwrap();
    assert_eq!(h.orchestrator.execute(&get), Ok(secret("v2")));
}

#[test]
fn capability_check_runs_first() {
    let h = Harness::with_capabilities(StaticCapabilities::passcode_only(false));
    let set = OperationRequest::new(OperationKind::SetSecret)
        .named("token")
        .with_secret("abc123");
    let err = h.orchestrator.execute(&set).unwrap_err();
    assert_eq!(err.code(), codes::NOT_ENROLLED);
    assert_eq!(h.prompt.calls(), 0);
    assert!(h.blobs.keys().is_empty());

    let h = Harness::with_capabilities(StaticCapabilities::passcode_only(true));
    let bio = OperationRequest::new(OperationKind::Challenge)
        .with_lock_behavior(LockBehavior::LockAfterUseBiometricOnly);
    assert_eq!(
        h.orchestrator.execute(&bio),
        Err(VaultError::HardwareNotSupported)
    );
}

#[test]
fn is_available_reports_usable_authenticators() {
    let h = Harness::with_capabilities(StaticCapabilities::passcode_only(true));
    assert_eq!(
        h.orchestrator
            .execute(&OperationRequest::new(OperationKind::IsAvailable)),
        Ok(Outcome::Available(Availability::Passcode))
    );
    assert_eq!(h.prompt.calls(), 0);
}

#[test]
fn wire_round_trip() {
    let h = Harness::new();
    let exec = |value: serde_json::Value| {
        let wire: WireRequest = serde_json::from_value(value).unwrap();
        let result = OperationRequest::from_wire(wire, Some("Wallet"))
            .and_then(|request| h.orchestrator.execute(&request));
        serde_json::to_value(WireResponse::from_result(&result)).unwrap()
    };

    assert_eq!(
        exec(serde_json::json!({"operationKind": "setSecret", "secretName": "pin", "secretValue": "0000"})),
        serde_json::json!({"status": "success", "result": null})
    );
    assert_eq!(
        exec(serde_json::json!({"operationKind": "getSecret", "secretName": "pin"})),
        serde_json::json!({"status": "success", "result": "0000"})
    );
    assert_eq!(
        exec(serde_json::json!({"operationKind": "getSecret", "secretName": "other"}))["code"],
        serde_json::json!(codes::NO_SECRET_FOUND)
    );
    assert_eq!(
        exec(serde_json::json!({"operationKind": "setSecret", "lockBehavior": "never"}))["code"],
        serde_json::json!(codes::ARGS_PARSING_FAILED)
    );
    assert_eq!(h.prompt.presented.lock()[0].1, "Wallet unlock");
}
