//! Keyed read port for account status records.
//!
//! Gateways return a [`LookupOutcome`] instead of an error so that "no such
//! account" stays an ordinary answer and only infrastructure trouble is marked
//! as retryable.

use async_trait::async_trait;
use serde_json::{Map, Value};
use teller_contracts::AccountStatusRecord;

/// Placeholder for a field the store left empty.
pub const UNKNOWN_FIELD: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(AccountStatusRecord),
    NotFound,
    /// Timeout, throttling or connectivity failure. The only retryable outcome.
    Unavailable { reason_code: String },
}

impl LookupOutcome {
    pub fn unavailable(reason_code: impl Into<String>) -> Self {
        Self::Unavailable {
            reason_code: reason_code.into(),
        }
    }
}

/// One point read by account id. Implementations must not scan or issue
/// secondary queries, and must report absence as [`LookupOutcome::NotFound`].
#[async_trait]
pub trait AccountStatusGateway: Send + Sync {
    async fn get_by_account_id(&self, account_id: u64) -> LookupOutcome;
}

/// A stored row as the backend returned it, before placeholders are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialAccountRecord {
    pub customer_name: Option<String>,
    pub account_status: Option<String>,
    pub account_type: Option<String>,
    pub created_date: Option<String>,
}

const CUSTOMER_NAME_KEYS: [&str; 2] = ["customer_name", "CustomerName"];
const ACCOUNT_STATUS_KEYS: [&str; 2] = ["account_status", "AccountStatus"];
const ACCOUNT_TYPE_KEYS: [&str; 2] = ["account_type", "AccountType"];
const CREATED_DATE_KEYS: [&str; 2] = ["created_date", "CreatedDate"];
const ACCOUNT_ID_KEYS: [&str; 2] = ["account_id", "AccountID"];

impl PartialAccountRecord {
    /// Fills absent or blank fields with [`UNKNOWN_FIELD`]. The id is the key
    /// the store was queried with.
    pub fn into_record(self, account_id: u64) -> AccountStatusRecord {
        AccountStatusRecord {
            account_id,
            customer_name: or_unknown(self.customer_name),
            account_status: or_unknown(self.account_status),
            account_type: or_unknown(self.account_type),
            created_date: or_unknown(self.created_date),
        }
    }

    /// Reads a document item. Accepts plain JSON values and typed attribute
    /// values (`{"S": "Active"}`, `{"N": "5555"}`), under snake_case or
    /// PascalCase names.
    pub fn from_item(item: &Map<String, Value>) -> Self {
        Self {
            customer_name: field(item, &CUSTOMER_NAME_KEYS),
            account_status: field(item, &ACCOUNT_STATUS_KEYS),
            account_type: field(item, &ACCOUNT_TYPE_KEYS),
            created_date: field(item, &CREATED_DATE_KEYS),
        }
    }

    /// Reads a store response document. `{"Item": {...}}` wrappers are
    /// unwrapped; a document with no item and no account field means the key
    /// does not exist.
    pub fn from_document(document: &Value) -> Option<Self> {
        let object = document.as_object()?;
        if let Some(item) = object.get("Item") {
            return item.as_object().map(Self::from_item);
        }
        let is_item = ACCOUNT_ID_KEYS
            .iter()
            .chain(&CUSTOMER_NAME_KEYS)
            .chain(&ACCOUNT_STATUS_KEYS)
            .chain(&ACCOUNT_TYPE_KEYS)
            .chain(&CREATED_DATE_KEYS)
            .any(|key| object.contains_key(*key));
        is_item.then(|| Self::from_item(object))
    }
}

fn or_unknown(value: Option<String>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => UNKNOWN_FIELD.to_string(),
    }
}

fn field(item: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| item.get(*key))
        .and_then(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(typed) => typed
            .get("S")
            .or_else(|| typed.get("N"))
            .and_then(scalar_text),
        Value::Null | Value::Array(_) => None,
    }
}
