//! Account status action pipeline: scope guard, parameter validation, keyed
//! lookup and response formatting.

pub mod format;
pub mod lookup;
pub mod params;
pub mod scope;

use serde_json::Value;
use sha2::{Digest, Sha256};
use teller_contracts::{AccountStatusRecord, ActionRequest, ActionResponse};
use thiserror::Error;

pub use format::format_response;
pub use lookup::{AccountStatusGateway, LookupOutcome, PartialAccountRecord, UNKNOWN_FIELD};
pub use params::extract_account_id;
pub use scope::{evaluate_scope, ScopeDecision, ScopePolicy, REFUSAL_MESSAGE, SUPPORTED_OPERATION};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvocationError {
    #[error("request outside supported scope: {reason_code}")]
    OutOfScope { reason_code: &'static str },
    #[error("invalid account_id parameter")]
    InvalidParameter,
    #[error("account {account_id} not found")]
    NotFound { account_id: u64 },
    #[error("account store unavailable: {reason_code}")]
    BackendUnavailable { reason_code: String },
}

/// Pipeline stage that produced the terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scope,
    Validate,
    Lookup,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Scope => "scope",
            Stage::Validate => "validate",
            Stage::Lookup => "lookup",
        }
    }
}

impl InvocationError {
    /// `None` for refusals: those are a conversational decision, not an HTTP fault.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            InvocationError::OutOfScope { .. } => None,
            InvocationError::InvalidParameter => Some(400),
            InvocationError::NotFound { .. } => Some(404),
            InvocationError::BackendUnavailable { .. } => Some(503),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            InvocationError::OutOfScope { .. } => Stage::Scope,
            InvocationError::InvalidParameter => Stage::Validate,
            InvocationError::NotFound { .. } | InvocationError::BackendUnavailable { .. } => {
                Stage::Lookup
            }
        }
    }

    pub fn reason_code(&self) -> &str {
        match self {
            InvocationError::OutOfScope { reason_code } => *reason_code,
            InvocationError::InvalidParameter => "invalid_account_id",
            InvocationError::NotFound { .. } => "account_not_found",
            InvocationError::BackendUnavailable { reason_code } => reason_code.as_str(),
        }
    }

    /// Whether a caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InvocationError::BackendUnavailable { .. })
    }
}

pub type Outcome = Result<AccountStatusRecord, InvocationError>;

/// Runs scope guard, validator and gateway in order, stopping at the first
/// terminal outcome. The gateway is called at most once.
pub async fn resolve(
    request: &ActionRequest,
    policy: &ScopePolicy,
    gateway: &dyn AccountStatusGateway,
) -> Outcome {
    if let ScopeDecision::Refuse { reason_code } = evaluate_scope(request, policy) {
        return Err(InvocationError::OutOfScope { reason_code });
    }
    tracing::debug!(api_path = %request.api_path, "scope allow");

    let account_id = extract_account_id(&request.parameters)?;
    tracing::debug!("account_id parameter valid");

    match gateway.get_by_account_id(account_id).await {
        LookupOutcome::Found(record) => Ok(record),
        LookupOutcome::NotFound => Err(InvocationError::NotFound { account_id }),
        LookupOutcome::Unavailable { reason_code } => {
            Err(InvocationError::BackendUnavailable { reason_code })
        }
    }
}

/// Resolves and formats one invocation.
pub async fn handle(
    request: &ActionRequest,
    policy: &ScopePolicy,
    gateway: &dyn AccountStatusGateway,
) -> ActionResponse {
    let outcome = resolve(request, policy, gateway).await;
    format_response(request, &outcome)
}

/// SHA-256 over the JCS-canonical form of the request, so logically identical
/// invocations share a fingerprint regardless of key order or whitespace.
pub fn request_fingerprint(request: &ActionRequest) -> Result<String, String> {
    let value = serde_json::to_value(request)
        .map_err(|err| format!("failed to encode request: {err}"))?;
    jcs_sha256_hex(&value)
}

pub fn jcs_sha256_hex(value: &Value) -> Result<String, String> {
    let canonical = serde_jcs::to_string(value)
        .map_err(|err| format!("failed to canonicalize JSON via JCS: {err}"))?;
    Ok(sha256_hex(canonical.as_bytes()))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
