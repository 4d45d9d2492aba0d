use serde::Serialize;
use teller_contracts::{
    ActionRequest, ActionResponse, ActionResult, ErrorBody, JsonBody, RefusalBody, ResponseBody,
    MESSAGE_VERSION,
};

use crate::scope::REFUSAL_MESSAGE;
use crate::{InvocationError, Outcome};

pub const INVALID_ACCOUNT_ID: &str = "Invalid account_id provided";
pub const ACCOUNT_NOT_FOUND: &str = "Account not found";
pub const SERVICE_UNAVAILABLE: &str = "Service temporarily unavailable";

/// Builds the single response envelope for an invocation outcome.
///
/// The request's action group, path, method and session attributes are echoed
/// whatever the outcome. A 200 is only reachable from a found record.
pub fn format_response(request: &ActionRequest, outcome: &Outcome) -> ActionResponse {
    let (http_status_code, body) = match outcome {
        Ok(record) => (Some(200), encode(record)),
        Err(InvocationError::OutOfScope { .. }) => (
            None,
            encode(&RefusalBody {
                message: REFUSAL_MESSAGE.to_string(),
            }),
        ),
        Err(InvocationError::InvalidParameter) => (Some(400), error_body(INVALID_ACCOUNT_ID, None)),
        Err(InvocationError::NotFound { account_id }) => (
            Some(404),
            error_body(ACCOUNT_NOT_FOUND, Some(*account_id)),
        ),
        Err(InvocationError::BackendUnavailable { .. }) => {
            (Some(503), error_body(SERVICE_UNAVAILABLE, None))
        }
    };

    ActionResponse {
        message_version: MESSAGE_VERSION.to_string(),
        response: ActionResult {
            action_group: request.action_group.clone(),
            api_path: request.api_path.clone(),
            http_method: request.http_method.clone(),
            http_status_code,
            response_body: ResponseBody {
                application_json: JsonBody { body },
            },
        },
        session_attributes: request.session_attributes.clone(),
        prompt_session_attributes: request.prompt_session_attributes.clone(),
    }
}

fn error_body(message: &str, account_id: Option<u64>) -> String {
    encode(&ErrorBody {
        error: message.to_string(),
        account_id,
    })
}

// Bodies are flat structs of strings and integers; serialization cannot fail.
fn encode<T: Serialize>(body: &T) -> String {
    serde_json::to_string(body).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use teller_contracts::AccountStatusRecord;

    fn request() -> ActionRequest {
        let mut req = ActionRequest {
            action_group: "CustomerAccountStatus".to_string(),
            api_path: "/getAccountStatus".to_string(),
            http_method: "POST".to_string(),
            ..ActionRequest::default()
        };
        req.session_attributes
            .insert("channel".to_string(), json!("mobile"));
        req
    }

    fn body(response: &ActionResponse) -> &str {
        &response.response.response_body.application_json.body
    }

    #[test]
    fn found_record_is_200_with_all_fields_in_order() {
        let record = AccountStatusRecord {
            account_id: 5555,
            customer_name: "John Doe".to_string(),
            account_status: "Active".to_string(),
            account_type: "Checking".to_string(),
            created_date: "2025-12-01".to_string(),
        };
        let response = format_response(&request(), &Ok(record));
        assert_eq!(response.status_code(), Some(200));
        assert_eq!(
            body(&response),
            r#"{"account_id":5555,"customer_name":"John Doe","account_status":"Active","account_type":"Checking","created_date":"2025-12-01"}"#
        );
    }

    #[test]
    fn error_outcomes_use_fixed_bodies() {
        let cases = [
            (
                InvocationError::InvalidParameter,
                400,
                r#"{"error":"Invalid account_id provided"}"#,
            ),
            (
                InvocationError::NotFound { account_id: 999999 },
                404,
                r#"{"error":"Account not found","account_id":999999}"#,
            ),
            (
                InvocationError::BackendUnavailable {
                    reason_code: "store_timeout".to_string(),
                },
                503,
                r#"{"error":"Service temporarily unavailable"}"#,
            ),
        ];
        for (err, status, expected) in cases {
            let response = format_response(&request(), &Err(err));
            assert_eq!(response.status_code(), Some(status));
            assert_eq!(body(&response), expected);
        }
    }

    #[test]
    fn refusal_has_no_status_code_and_fixed_message() {
        let response = format_response(
            &request(),
            &Err(InvocationError::OutOfScope {
                reason_code: "scope_unsupported_operation",
            }),
        );
        assert_eq!(response.status_code(), None);
        let value = response.body_json().unwrap();
        assert_eq!(value["message"], REFUSAL_MESSAGE);
        assert!(!body(&response).contains("scope_unsupported_operation"));
    }

    #[test]
    fn envelope_echoes_request_fields() {
        let mut req = request();
        req.action_group = "SomethingElse".to_string();
        req.api_path = "/transferFunds".to_string();
        req.http_method = "GET".to_string();
        let response = format_response(&req, &Err(InvocationError::InvalidParameter));
        assert_eq!(response.message_version, "1.0");
        assert_eq!(response.response.action_group, "SomethingElse");
        assert_eq!(response.response.api_path, "/transferFunds");
        assert_eq!(response.response.http_method, "GET");
        assert_eq!(response.session_attributes["channel"], json!("mobile"));
    }

    #[test]
    fn unavailable_body_hides_reason() {
        let response = format_response(
            &request(),
            &Err(InvocationError::BackendUnavailable {
                reason_code: "sqlite_query_failed".to_string(),
            }),
        );
        assert!(!body(&response).contains("sqlite"));
    }
}
