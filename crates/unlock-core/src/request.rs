//! Requests and responses as the host sees them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::capability::Availability;
use crate::error::VaultError;
use crate::policy::{BatchControl, KeyPolicy, LockBehavior, SecretScope, DEFAULT_AUTO_LOCK_SECS};
use crate::prompt::{PromptCopy, DEFAULT_CANCEL_TITLE, DEFAULT_TITLE};

/// Secret name used when a request does not carry one.
pub const DEFAULT_SECRET_NAME: &str = "__aio_secret_key";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    IsAvailable,
    Challenge,
    SetSecret,
    HasSecret,
    GetSecret,
    DeleteSecret,
}

impl OperationKind {
    const TABLE: [(OperationKind, &'static str, u8); 6] = [
        (OperationKind::IsAvailable, "isAvailable", 1),
        (OperationKind::Challenge, "challenge", 2),
        (OperationKind::SetSecret, "setSecret", 3),
        (OperationKind::HasSecret, "hasSecret", 4),
        (OperationKind::GetSecret, "getSecret", 5),
        (OperationKind::DeleteSecret, "deleteSecret", 6),
    ];

    pub fn as_wire_str(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(k, _, _)| *k == self)
            .map(|(_, s, _)| *s)
            .unwrap_or_default()
    }

    pub fn from_value(v: u8) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(_, _, value)| *value == v)
            .map(|(k, _, _)| *k)
    }

    pub fn from_wire_str(s: &str) -> Result<Self, VaultError> {
        Self::TABLE
            .iter()
            .find(|(_, name, _)| *name == s)
            .map(|(k, _, _)| *k)
            .ok_or_else(|| VaultError::ArgsParsingFailed(format!("unknown operation '{s}'")))
    }
}

/// A fully parsed request. Threaded by value through the orchestrator so no
/// request state lives on the orchestrator itself.
#[derive(Clone)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub secret_name: String,
    pub secret_value: Option<Zeroizing<String>>,
    pub policy: KeyPolicy,
    pub interaction_not_allowed: bool,
    pub batch: BatchControl,
    pub copy: PromptCopy,
}

impl std::fmt::Debug for OperationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRequest")
            .field("kind", &self.kind)
            .field("secret_name", &self.secret_name)
            .field("has_secret_value", &self.secret_value.is_some())
            .field("policy", &self.policy)
            .field("interaction_not_allowed", &self.interaction_not_allowed)
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}

impl OperationRequest {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            secret_name: DEFAULT_SECRET_NAME.to_string(),
            secret_value: None,
            policy: KeyPolicy::default(),
            interaction_not_allowed: false,
            batch: BatchControl::None,
            copy: PromptCopy::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.secret_name = name.into();
        self
    }

    pub fn with_secret(mut self, value: impl Into<String>) -> Self {
        self.secret_value = Some(Zeroizing::new(value.into()));
        self
    }

    pub fn with_lock_behavior(mut self, lock_behavior: LockBehavior) -> Self {
        self.policy.lock_behavior = lock_behavior;
        self
    }

    pub fn with_scope(mut self, scope: SecretScope) -> Self {
        self.policy.scope = scope;
        self
    }

    pub fn with_batch(mut self, batch: BatchControl) -> Self {
        self.batch = batch;
        self
    }

    pub fn non_interactive(mut self) -> Self {
        self.interaction_not_allowed = true;
        self
    }

    /// Build from the wire shape, applying defaults for absent fields.
    /// `app_label` feeds the default prompt title.
    pub fn from_wire(wire: WireRequest, app_label: Option<&str>) -> Result<Self, VaultError> {
        let kind = wire.operation_kind.parse(
            "operationKind",
            OperationKind::from_wire_str,
            OperationKind::from_value,
        )?;
        let scope = match &wire.scope {
            Some(code) => code.parse("scope", SecretScope::from_wire_str, SecretScope::from_value)?,
            None => SecretScope::default(),
        };
        let lock_behavior = match &wire.lock_behavior {
            Some(code) => code.parse(
                "lockBehavior",
                LockBehavior::from_wire_str,
                LockBehavior::from_value,
            )?,
            None => LockBehavior::default(),
        };
        let default_title = app_label
            .map(|label| format!("{label} unlock"))
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        Ok(Self {
            kind,
            secret_name: wire
                .secret_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_SECRET_NAME.to_string()),
            secret_value: wire.secret_value.map(Zeroizing::new),
            policy: KeyPolicy {
                scope,
                lock_behavior,
                auto_lock_secs: wire.auto_lock_seconds.unwrap_or(DEFAULT_AUTO_LOCK_SECS),
            },
            interaction_not_allowed: wire.interaction_not_allowed.unwrap_or(false),
            batch: BatchControl::from_wire_str(wire.batch.as_deref()),
            copy: PromptCopy {
                title: wire.title.unwrap_or(default_title),
                subtitle: wire.subtitle,
                description: wire.description,
                cancel_button_title: wire
                    .cancel_button_title
                    .unwrap_or_else(|| DEFAULT_CANCEL_TITLE.to_string()),
                confirmation_required: wire.confirmation_required.unwrap_or(true),
            },
        })
    }
}

/// An enum field sent either by name (`"lockWithDevice"`) or by its numeric
/// wire value (`1`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WireCode {
    Name(String),
    Value(u8),
}

impl Default for WireCode {
    fn default() -> Self {
        WireCode::Name(String::new())
    }
}

impl From<&str> for WireCode {
    fn from(name: &str) -> Self {
        WireCode::Name(name.to_string())
    }
}

impl WireCode {
    fn parse<T>(
        &self,
        field: &str,
        by_name: impl Fn(&str) -> Result<T, VaultError>,
        by_value: impl Fn(u8) -> Option<T>,
    ) -> Result<T, VaultError> {
        match self {
            WireCode::Name(name) => by_name(name),
            WireCode::Value(value) => by_value(*value).ok_or_else(|| {
                VaultError::ArgsParsingFailed(format!("unknown {field} value {value}"))
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    #[serde(alias = "action")]
    pub operation_kind: WireCode,
    pub secret_name: Option<String>,
    #[serde(alias = "secret")]
    pub secret_value: Option<String>,
    pub scope: Option<WireCode>,
    pub lock_behavior: Option<WireCode>,
    #[serde(alias = "androidAutoLockTimeSeconds")]
    pub auto_lock_seconds: Option<u64>,
    pub interaction_not_allowed: Option<bool>,
    pub confirmation_required: Option<bool>,
    pub batch: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub cancel_button_title: Option<String>,
}

/// Successful result of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Secret(Zeroizing<String>),
    Exists(bool),
    Available(Availability),
}

impl Outcome {
    fn to_value(&self) -> Value {
        match self {
            Outcome::Completed => Value::Null,
            Outcome::Secret(secret) => Value::String(secret.as_str().to_owned()),
            Outcome::Exists(exists) => Value::Bool(*exists),
            Outcome::Available(availability) => {
                Value::String(availability.as_wire_str().to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum WireResponse {
    Success { result: Value },
    Failure { code: i32, message: String },
}

impl WireResponse {
    pub fn from_result(result: &Result<Outcome, VaultError>) -> Self {
        match result {
            Ok(outcome) => WireResponse::Success {
                result: outcome.to_value(),
            },
            Err(err) => WireResponse::Failure {
                code: err.code(),
                message: err.to_string(),
            },
        }
    }
}
