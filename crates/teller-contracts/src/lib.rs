use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const API_VERSION: &str = "1.0.0";
pub const MESSAGE_VERSION: &str = "1.0";

#[derive(Debug, Clone)]
pub struct ContractSchemaManifest {
    pub path: &'static str,
    pub sha256: &'static str,
    pub body: &'static str,
}

#[derive(Debug, Clone)]
pub struct ContractsManifest {
    pub openapi_sha256: &'static str,
    pub openapi_body: &'static str,
    pub contracts_set_sha256: &'static str,
    pub generated_at: &'static str,
    pub schemas: Vec<ContractSchemaManifest>,
}

include!(concat!(env!("OUT_DIR"), "/generated_contracts.rs"));

pub fn contracts_manifest_v1() -> ContractsManifest {
    ContractsManifest {
        openapi_sha256: GENERATED_OPENAPI_SHA256,
        openapi_body: GENERATED_OPENAPI_BODY,
        contracts_set_sha256: GENERATED_CONTRACTS_SET_SHA256,
        generated_at: GENERATED_AT_RFC3339,
        schemas: GENERATED_CONTRACT_SCHEMAS
            .iter()
            .map(|(path, sha256, body)| ContractSchemaManifest { path, sha256, body })
            .collect(),
    }
}

impl ContractsManifest {
    pub fn schema(&self, file_name: &str) -> Option<&ContractSchemaManifest> {
        self.schemas
            .iter()
            .find(|schema| schema.path.rsplit('/').next() == Some(file_name))
    }
}

/// One named parameter of an action invocation.
///
/// `value` is kept as raw JSON: upstream agents usually send strings, but the
/// validator decides what is acceptable, not the decoder. An entry without a
/// usable `name` decodes with an empty name and never matches anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionParameter {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(
        default,
        rename = "type",
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Session attribute map echoed back to the agent untouched.
pub type Attributes = BTreeMap<String, Value>;

/// Inbound invocation from the orchestrating agent.
///
/// Decoding never rejects a JSON object: fields the agent runtime adds around
/// the invocation are ignored, and fields of the wrong shape fall back to
/// their empty value so the pipeline still produces an envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub action_group: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub api_path: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub http_method: String,
    #[serde(default, deserialize_with = "lenient_parameters")]
    pub parameters: Vec<ActionParameter>,
    #[serde(default, deserialize_with = "lenient_attributes")]
    pub session_attributes: Attributes,
    #[serde(default, deserialize_with = "lenient_attributes")]
    pub prompt_session_attributes: Attributes,
}

impl ActionRequest {
    /// Reads an invocation event. Anything that is not a JSON object becomes an
    /// empty request, which the scope guard then refuses.
    pub fn from_event(event: Value) -> Self {
        match event {
            Value::Object(_) => serde_json::from_value(event).unwrap_or_default(),
            _ => Self::default(),
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_opt_string(deserializer)?.unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

// Non-object entries are dropped; object entries always decode.
fn lenient_parameters<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<ActionParameter>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}

fn lenient_attributes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Attributes, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Ok(Attributes::new()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountStatusRecord {
    pub account_id: u64,
    pub customer_name: String,
    pub account_status: String,
    pub account_type: String,
    pub created_date: String,
}

/// Error object carried inside a non-200 response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<u64>,
}

/// Body returned instead of an error when a request is outside the supported topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefusalBody {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonBody {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseBody {
    #[serde(rename = "application/json")]
    pub application_json: JsonBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action_group: String,
    pub api_path: String,
    pub http_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,
    pub response_body: ResponseBody,
}

/// Outbound envelope handed back to the orchestrating agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub message_version: String,
    pub response: ActionResult,
    #[serde(default)]
    pub session_attributes: Attributes,
    #[serde(default)]
    pub prompt_session_attributes: Attributes,
}

impl ActionResponse {
    pub fn status_code(&self) -> Option<u16> {
        self.response.http_status_code
    }

    /// Decodes the inner JSON string body.
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.response.response_body.application_json.body)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsMetadata {
    pub api_version: String,
    pub message_version: String,
    pub openapi_sha256: String,
    pub contracts_set_sha256: String,
    pub generated_at: String,
    pub schemas: BTreeMap<String, String>,
    pub supported_operation: String,
    pub allowed_action_groups: Vec<String>,
}
