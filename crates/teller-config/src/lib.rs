use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Server,
    #[serde(default)]
    pub scope: Scope,
    pub store: Store,
    #[serde(default)]
    pub audit: Audit,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default = "default_allowed_action_groups")]
    pub allowed_action_groups: Vec<String>,
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            allowed_action_groups: default_allowed_action_groups(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Memory,
    Sqlite,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    #[serde(rename = "type")]
    pub kind: StoreKind,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub sqlite_path: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub records: Vec<SeedRecord>,
}

/// Account row preloaded into the in-memory store. Absent fields stay absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedRecord {
    pub account_id: u64,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub account_status: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub created_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Audit {
    #[serde(default)]
    pub jsonl_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_allowed_action_groups() -> Vec<String> {
    vec!["CustomerAccountStatus".to_string()]
}

fn default_timeout_ms() -> u64 {
    2_000
}

fn default_table() -> String {
    "customer_account_status".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    parse_and_validate(&config_text)
}

pub fn parse_and_validate(config_text: &str) -> Result<Config, ConfigError> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    let store = &cfg.store;
    if store.timeout_ms == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "store.timeout_ms must be >= 1".to_string(),
        ));
    }
    match store.kind {
        StoreKind::Memory => {
            if store.sqlite_path.is_some() || store.endpoint.is_some() {
                return Err(ConfigError::UnsupportedConfig(
                    "store.sqlite_path and store.endpoint are not supported when store.type=memory"
                        .to_string(),
                ));
            }
            let mut seen = HashSet::new();
            for record in &store.records {
                if !seen.insert(record.account_id) {
                    return Err(ConfigError::UnsupportedConfig(format!(
                        "store.records contains account_id {} more than once",
                        record.account_id
                    )));
                }
            }
        }
        StoreKind::Sqlite => {
            if store
                .sqlite_path
                .as_ref()
                .map(|v| v.trim().is_empty())
                .unwrap_or(true)
            {
                return Err(ConfigError::UnsupportedConfig(
                    "store.sqlite_path is required when store.type=sqlite".to_string(),
                ));
            }
            if !is_sql_identifier(&store.table) {
                return Err(ConfigError::UnsupportedConfig(format!(
                    "store.table={:?} is not a plain SQL identifier",
                    store.table
                )));
            }
        }
        StoreKind::Http => {
            let endpoint = store.endpoint.as_deref().unwrap_or_default();
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::UnsupportedConfig(
                    "store.endpoint must be an http(s) URL when store.type=http".to_string(),
                ));
            }
        }
    }
    if !matches!(store.kind, StoreKind::Memory) && !store.records.is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "store.records is only supported when store.type=memory".to_string(),
        ));
    }
    Ok(())
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
