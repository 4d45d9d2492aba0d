//! Topic guard that runs before any parameter is looked at.

use teller_contracts::ActionRequest;

/// The only operation this handler implements.
pub const SUPPORTED_OPERATION: &str = "getAccountStatus";

/// Shown to the end user for anything outside the supported topic. Must stay a
/// fixed literal: no request content, system names or codes.
pub const REFUSAL_MESSAGE: &str = "I'm sorry, I can only help with checking the status of a new account. For anything else, please contact the bank directly.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopePolicy {
    allowed_action_groups: Vec<String>,
}

impl ScopePolicy {
    /// An empty list trusts whatever action group tag the agent declares.
    pub fn new(allowed_action_groups: Vec<String>) -> Self {
        Self {
            allowed_action_groups,
        }
    }

    pub fn allowed_action_groups(&self) -> &[String] {
        &self.allowed_action_groups
    }

    fn admits_group(&self, action_group: &str) -> bool {
        self.allowed_action_groups.is_empty()
            || self
                .allowed_action_groups
                .iter()
                .any(|group| group == action_group)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeDecision {
    Allow,
    Refuse { reason_code: &'static str },
}

pub fn evaluate_scope(request: &ActionRequest, policy: &ScopePolicy) -> ScopeDecision {
    if !policy.admits_group(&request.action_group) {
        return ScopeDecision::Refuse {
            reason_code: "scope_action_group_not_allowed",
        };
    }
    let operation = request
        .api_path
        .strip_prefix('/')
        .unwrap_or(&request.api_path);
    if operation != SUPPORTED_OPERATION {
        return ScopeDecision::Refuse {
            reason_code: "scope_unsupported_operation",
        };
    }
    ScopeDecision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(action_group: &str, api_path: &str) -> ActionRequest {
        ActionRequest {
            action_group: action_group.to_string(),
            api_path: api_path.to_string(),
            http_method: "POST".to_string(),
            ..ActionRequest::default()
        }
    }

    fn default_policy() -> ScopePolicy {
        ScopePolicy::new(vec!["CustomerAccountStatus".to_string()])
    }

    #[test]
    fn allows_account_status_with_or_without_leading_slash() {
        let policy = default_policy();
        for path in ["/getAccountStatus", "getAccountStatus"] {
            assert_eq!(
                evaluate_scope(&request("CustomerAccountStatus", path), &policy),
                ScopeDecision::Allow
            );
        }
    }

    #[test]
    fn refuses_other_operations() {
        let policy = default_policy();
        for path in [
            "/transferFunds",
            "/getBalance",
            "/getTransactionHistory",
            "/verifyIdentity",
            "/GetAccountStatus",
            "/getAccountStatus/extra",
            "",
        ] {
            assert_eq!(
                evaluate_scope(&request("CustomerAccountStatus", path), &policy),
                ScopeDecision::Refuse {
                    reason_code: "scope_unsupported_operation"
                },
                "{path}"
            );
        }
    }

    #[test]
    fn refuses_undeclared_action_group() {
        let decision = evaluate_scope(
            &request("transfer funds", "/getAccountStatus"),
            &default_policy(),
        );
        assert_eq!(
            decision,
            ScopeDecision::Refuse {
                reason_code: "scope_action_group_not_allowed"
            }
        );
    }

    #[test]
    fn empty_allow_list_trusts_group_tag() {
        let policy = ScopePolicy::new(Vec::new());
        assert_eq!(
            evaluate_scope(&request("AnyGroup", "/getAccountStatus"), &policy),
            ScopeDecision::Allow
        );
        assert!(matches!(
            evaluate_scope(&request("AnyGroup", "/closeAccount"), &policy),
            ScopeDecision::Refuse { .. }
        ));
    }

    #[test]
    fn refusal_text_does_not_leak_internals() {
        let lowered = REFUSAL_MESSAGE.to_lowercase();
        for word in ["guardrail", "scope", "lambda", "table", "error", "backend"] {
            assert!(!lowered.contains(word), "{word}");
        }
    }
}
