//! Action orchestration: silent attempt, prompt, replay.
//!
//! ```text
//! Idle -> Attempting -> Succeeded
//!                    -> Failed
//!                    -> NeedsPrompt -> PromptPending -> PostPromptAttempt -> Succeeded | Failed
//! Idle -> PromptPending (challenge, batch start, delete outside a batch)
//! ```
//!
//! The prompt is presented at most once per run. The post-prompt attempt is
//! the only retry; its failures are final.

use std::sync::Arc;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::blob_store::EncryptedBlobStore;
use crate::capability::DeviceCapabilities;
use crate::error::VaultError;
use crate::key_manager::SecureKeyManager;
use crate::prompt::PromptSurface;
use crate::prompt_policy::{should_attempt_silently, should_surface_failure};
use crate::request::{OperationKind, OperationRequest, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Idle,
    Attempting,
    NeedsPrompt,
    PromptPending,
    PostPromptAttempt,
    Succeeded,
    Failed,
}

enum Step {
    Idle,
    Attempting,
    NeedsPrompt,
    PromptPending,
    PostPromptAttempt,
    Succeeded(Outcome),
    Failed(VaultError),
}

impl Step {
    fn state(&self) -> ActionState {
        match self {
            Step::Idle => ActionState::Idle,
            Step::Attempting => ActionState::Attempting,
            Step::NeedsPrompt => ActionState::NeedsPrompt,
            Step::PromptPending => ActionState::PromptPending,
            Step::PostPromptAttempt => ActionState::PostPromptAttempt,
            Step::Succeeded(_) => ActionState::Succeeded,
            Step::Failed(_) => ActionState::Failed,
        }
    }
}

/// Result of one orchestrated request, with the path it took.
#[derive(Debug)]
pub struct ActionRun {
    pub result: Result<Outcome, VaultError>,
    pub states: Vec<ActionState>,
    pub prompts: u32,
}

impl ActionRun {
    fn immediate(result: Result<Outcome, VaultError>) -> Self {
        let last = if result.is_ok() {
            ActionState::Succeeded
        } else {
            ActionState::Failed
        };
        Self {
            result,
            states: vec![ActionState::Idle, last],
            prompts: 0,
        }
    }
}

/// Per-run context threaded through the state machine.
struct RunContext<'a> {
    request: &'a OperationRequest,
    states: Vec<ActionState>,
    prompts: u32,
}

pub struct ActionOrchestrator {
    keys: SecureKeyManager,
    blobs: EncryptedBlobStore,
    prompt: Arc<dyn PromptSurface>,
    capabilities: Arc<dyn DeviceCapabilities>,
}

impl ActionOrchestrator {
    pub fn new(
        keys: SecureKeyManager,
        blobs: EncryptedBlobStore,
        prompt: Arc<dyn PromptSurface>,
        capabilities: Arc<dyn DeviceCapabilities>,
    ) -> Self {
        Self {
            keys,
            blobs,
            prompt,
            capabilities,
        }
    }

    pub fn keys(&self) -> &SecureKeyManager {
        &self.keys
    }

    pub fn execute(&self, request: &OperationRequest) -> Result<Outcome, VaultError> {
        self.run(request).result
    }

    pub fn run(&self, request: &OperationRequest) -> ActionRun {
        let span = info_span!(
            "vault_action",
            run_id = %Uuid::new_v4(),
            kind = request.kind.as_wire_str(),
            name = %request.secret_name,
        );
        let _enter = span.enter();

        let availability = match self
            .capabilities
            .check(request.policy.lock_behavior.authenticators())
        {
            Ok(availability) => availability,
            Err(e) => {
                warn!(error = %e, "capability check failed");
                return ActionRun::immediate(Err(e));
            }
        };

        let run = match request.kind {
            OperationKind::IsAvailable => {
                ActionRun::immediate(Ok(Outcome::Available(availability)))
            }
            OperationKind::HasSecret => {
                ActionRun::immediate(self.has_secret(&request.secret_name).map(Outcome::Exists))
            }
            _ => self.drive(request),
        };
        match &run.result {
            Ok(_) => info!(prompts = run.prompts, "action succeeded"),
            Err(e) => info!(prompts = run.prompts, code = e.code(), error = %e, "action failed"),
        }
        run
    }

    /// Existence check. Never prompts: a key whose window has closed still
    /// counts as present.
    pub fn has_secret(&self, name: &str) -> Result<bool, VaultError> {
        let nonce = match self.blobs.load_nonce(name) {
            Ok(nonce) => nonce,
            Err(e) if e.is_missing_secret() => return Ok(false),
            Err(e) => return Err(e),
        };
        match self.keys.cipher_for_decryption(name, &nonce) {
            Ok(_) | Err(VaultError::AuthenticationRequired) => Ok(true),
            Err(e) if e.is_missing_secret() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn drive(&self, request: &OperationRequest) -> ActionRun {
        let mut ctx = RunContext {
            request,
            states: vec![ActionState::Idle],
            prompts: 0,
        };
        let mut step = Step::Idle;
        loop {
            step = match step {
                Step::Succeeded(outcome) => {
                    return ActionRun {
                        result: Ok(outcome),
                        states: ctx.states,
                        prompts: ctx.prompts,
                    }
                }
                Step::Failed(err) => {
                    return ActionRun {
                        result: Err(err),
                        states: ctx.states,
                        prompts: ctx.prompts,
                    }
                }
                current => {
                    let from = current.state();
                    let next = self.advance(&mut ctx, current);
                    let to = next.state();
                    debug!(?from, ?to, "state transition");
                    ctx.states.push(to);
                    next
                }
            };
        }
    }

    fn advance(&self, ctx: &mut RunContext<'_>, step: Step) -> Step {
        let request = ctx.request;
        match step {
            Step::Idle => {
                if request.kind == OperationKind::SetSecret && request.secret_value.is_none() {
                    return Step::Failed(VaultError::ArgsParsingFailed(
                        "secret value is required".into(),
                    ));
                }
                if should_attempt_silently(request.kind, request.batch) {
                    Step::Attempting
                } else {
                    Step::PromptPending
                }
            }
            Step::Attempting => match self.attempt(request) {
                Ok(outcome) => Step::Succeeded(outcome),
                Err(e) if should_surface_failure(&e, request.interaction_not_allowed) => {
                    Step::Failed(e)
                }
                Err(_) => Step::NeedsPrompt,
            },
            Step::NeedsPrompt => Step::PromptPending,
            Step::PromptPending => {
                // nothing transitions back into PromptPending
                debug_assert_eq!(ctx.prompts, 0);
                ctx.prompts += 1;
                let authenticators = request.policy.lock_behavior.authenticators();
                match self.prompt.present(authenticators, &request.copy).into_result() {
                    Ok(authenticator) if authenticators.allows(authenticator) => {
                        self.keys.authorize(authenticator);
                        Step::PostPromptAttempt
                    }
                    Ok(authenticator) => Step::Failed(VaultError::Unknown(format!(
                        "prompt accepted disallowed authenticator {authenticator:?}"
                    ))),
                    Err(e) => Step::Failed(e),
                }
            }
            Step::PostPromptAttempt => match self.attempt(request) {
                Ok(outcome) => Step::Succeeded(outcome),
                Err(e) => Step::Failed(e),
            },
            terminal @ (Step::Succeeded(_) | Step::Failed(_)) => terminal,
        }
    }

    /// The cryptographic part of each action, run either silently or right
    /// after a successful prompt.
    fn attempt(&self, request: &OperationRequest) -> Result<Outcome, VaultError> {
        let name = request.secret_name.as_str();
        match request.kind {
            OperationKind::Challenge => Ok(Outcome::Completed),
            OperationKind::SetSecret => {
                let value = request.secret_value.as_ref().ok_or_else(|| {
                    VaultError::ArgsParsingFailed("secret value is required".into())
                })?;
                let cipher = self.keys.cipher_for_encryption(name, &request.policy)?;
                let sealed = self.keys.encrypt(value, cipher)?;
                self.blobs.save(name, &sealed)?;
                Ok(Outcome::Completed)
            }
            OperationKind::GetSecret => {
                let nonce = self.blobs.load_nonce(name)?;
                let cipher = self
                    .keys
                    .cipher_for_decryption(name, &nonce)
                    .map_err(|e| match e {
                        VaultError::KeyInvalidated => VaultError::NoSecretFound,
                        other => other,
                    })?;
                let ciphertext = self.blobs.load_ciphertext(name)?;
                let secret = self.keys.decrypt(&ciphertext, cipher)?;
                if secret.is_empty() {
                    return Err(VaultError::NoSecretFound);
                }
                Ok(Outcome::Secret(secret))
            }
            OperationKind::DeleteSecret => {
                // blobs first: a failed delete must leave the secret readable
                self.blobs.remove(name)?;
                self.keys.remove_key(name)?;
                Ok(Outcome::Completed)
            }
            OperationKind::HasSecret | OperationKind::IsAvailable => Err(VaultError::Unknown(
                format!("{} is not a prompted action", request.kind.as_wire_str()),
            )),
        }
    }
}
