use serde_json::Value;
use teller_contracts::ActionParameter;

use crate::InvocationError;

pub const ACCOUNT_ID_PARAM: &str = "account_id";

/// Reads the first `account_id` parameter. Later duplicates are ignored.
pub fn extract_account_id(parameters: &[ActionParameter]) -> Result<u64, InvocationError> {
    let raw = parameters
        .iter()
        .find(|p| p.name == ACCOUNT_ID_PARAM)
        .and_then(|p| p.value.as_ref());
    match raw {
        Some(Value::String(text)) => parse_account_id(text),
        _ => Err(InvocationError::InvalidParameter),
    }
}

fn parse_account_id(text: &str) -> Result<u64, InvocationError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InvocationError::InvalidParameter);
    }
    // all-digit input can only fail here on overflow
    text.parse::<u64>()
        .map_err(|_| InvocationError::InvalidParameter)
}
