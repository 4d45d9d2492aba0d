//! Append-only, hash-chained log of invocation decisions.
//!
//! Each line is one [`AuditRecord`]. `record_hash` is the JCS SHA-256 of the
//! record without its own hash, and `prev_hash` links to the line before. The
//! first record has no `prev_hash`. Records carry routing metadata and the
//! decision only; customer fields never reach this file.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use teller_contracts::ActionRequest;
use teller_kernel::{jcs_sha256_hex, request_fingerprint, InvocationError, Outcome};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit file io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: not an audit record")]
    Malformed { line: usize },
    #[error("line {line}: prev_hash does not link to the previous record")]
    BrokenLink { line: usize },
    #[error("line {line}: record_hash does not match the record")]
    Tampered { line: usize },
    #[error("audit record encode failed: {0}")]
    Encode(String),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AuditRecord {
    pub audit_id: String,
    pub invocation_fingerprint: String,
    pub action_group: String,
    pub api_path: String,
    pub http_method: String,
    pub stage: String,
    pub result: String,
    pub reason_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(default)]
    pub record_hash: String,
}

impl AuditRecord {
    pub fn for_invocation(request: &ActionRequest, outcome: &Outcome) -> Self {
        let (stage, result, reason_code, http_status_code) = match outcome {
            Ok(_) => ("lookup", "found", "account_found", Some(200)),
            Err(err) => (
                err.stage().as_str(),
                result_name(err),
                err.reason_code(),
                err.status_code(),
            ),
        };
        Self {
            audit_id: format!("audit_{}", uuid::Uuid::new_v4().as_simple()),
            invocation_fingerprint: request_fingerprint(request).unwrap_or_default(),
            action_group: request.action_group.clone(),
            api_path: request.api_path.clone(),
            http_method: request.http_method.clone(),
            stage: stage.to_string(),
            result: result.to_string(),
            reason_code: reason_code.to_string(),
            http_status_code,
            ts: Utc::now().to_rfc3339(),
            prev_hash: None,
            record_hash: String::new(),
        }
    }

    /// Hash over every field except `record_hash`.
    pub fn chain_digest(&self) -> Result<String, AuditError> {
        let mut value =
            serde_json::to_value(self).map_err(|e| AuditError::Encode(e.to_string()))?;
        if let Value::Object(fields) = &mut value {
            fields.remove("record_hash");
        }
        jcs_sha256_hex(&value).map_err(AuditError::Encode)
    }

    fn linked_to(mut self, prev_hash: Option<String>) -> Result<Self, AuditError> {
        self.prev_hash = prev_hash;
        self.record_hash = self.chain_digest()?;
        Ok(self)
    }
}

fn result_name(err: &InvocationError) -> &'static str {
    match err {
        InvocationError::OutOfScope { .. } => "refused",
        InvocationError::InvalidParameter => "invalid",
        InvocationError::NotFound { .. } => "not_found",
        InvocationError::BackendUnavailable { .. } => "unavailable",
    }
}

/// Non-blank lines with their 1-based line numbers, decoded where possible.
fn read_records(text: &str) -> impl Iterator<Item = (usize, Option<AuditRecord>)> + '_ {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| (idx + 1, serde_json::from_str(line).ok()))
}

pub struct AuditTrail {
    tail: Mutex<ChainTail>,
}

struct ChainTail {
    file: File,
    head: Option<String>,
}

impl AuditTrail {
    /// Opens or creates the trail, continuing the chain from its last record.
    /// A trail whose last line is not a record is refused rather than forked.
    pub async fn open(path: &str) -> Result<Self, AuditError> {
        let head = match tokio::fs::read_to_string(path).await {
            Ok(text) => match read_records(&text).last() {
                Some((_, Some(record))) => Some(record.record_hash),
                Some((line, None)) => return Err(AuditError::Malformed { line }),
                None => None,
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            tail: Mutex::new(ChainTail { file, head }),
        })
    }

    /// Links and writes one record. Failures are logged and leave the chain
    /// head where it was; they never reach the invocation.
    pub async fn append(&self, record: AuditRecord) {
        let mut tail = self.tail.lock().await;
        let record = match record.linked_to(tail.head.clone()) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "audit record not linked");
                return;
            }
        };
        let mut line = match serde_json::to_string(&record) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "audit record encode failed");
                return;
            }
        };
        line.push('\n');
        if let Err(err) = write_line(&mut tail.file, &line).await {
            tracing::warn!(error = %err, audit_id = %record.audit_id, "audit append failed");
            return;
        }
        tail.head = Some(record.record_hash);
    }
}

async fn write_line(file: &mut File, line: &str) -> std::io::Result<()> {
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

/// Re-derives the chain and returns the number of verified records.
pub fn verify_audit_chain(path: &str) -> Result<usize, AuditError> {
    let text = std::fs::read_to_string(path)?;
    let mut head: Option<String> = None;
    let mut verified = 0;

    for (line, record) in read_records(&text) {
        let record = record.ok_or(AuditError::Malformed { line })?;
        if record.prev_hash != head {
            return Err(AuditError::BrokenLink { line });
        }
        if record.chain_digest()? != record.record_hash {
            return Err(AuditError::Tampered { line });
        }
        head = Some(record.record_hash);
        verified += 1;
    }
    Ok(verified)
}
