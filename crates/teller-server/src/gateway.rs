use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use teller_config::{SeedRecord, Store, StoreKind};
use teller_kernel::{AccountStatusGateway, LookupOutcome, PartialAccountRecord};

/// Builds the configured store adapter, bounded by `store.timeout_ms`.
pub fn gateway_from_config(store: &Store) -> Result<Arc<dyn AccountStatusGateway>, String> {
    let timeout = Duration::from_millis(store.timeout_ms.max(1));
    let gateway: Arc<dyn AccountStatusGateway> = match store.kind {
        StoreKind::Memory => Arc::new(TimedGateway::new(
            MemoryGateway::from_seed(&store.records),
            timeout,
        )),
        StoreKind::Sqlite => {
            let path = store
                .sqlite_path
                .clone()
                .ok_or_else(|| "store.sqlite_path is required for sqlite store".to_string())?;
            Arc::new(TimedGateway::new(
                SqliteGateway::open(&path, &store.table, timeout)?,
                timeout,
            ))
        }
        StoreKind::Http => {
            let endpoint = store
                .endpoint
                .clone()
                .ok_or_else(|| "store.endpoint is required for http store".to_string())?;
            Arc::new(TimedGateway::new(
                HttpGateway::new(&endpoint, timeout)?,
                timeout,
            ))
        }
    };
    Ok(gateway)
}

/// Caps a single lookup. An expired read counts as a backend failure.
pub struct TimedGateway<G> {
    inner: G,
    timeout: Duration,
}

impl<G> TimedGateway<G> {
    pub fn new(inner: G, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<G: AccountStatusGateway> AccountStatusGateway for TimedGateway<G> {
    async fn get_by_account_id(&self, account_id: u64) -> LookupOutcome {
        match tokio::time::timeout(self.timeout, self.inner.get_by_account_id(account_id)).await {
            Ok(outcome) => outcome,
            Err(_) => LookupOutcome::unavailable("store_timeout"),
        }
    }
}

#[derive(Default)]
pub struct MemoryGateway {
    records: HashMap<u64, PartialAccountRecord>,
}

impl MemoryGateway {
    pub fn from_seed(records: &[SeedRecord]) -> Self {
        Self {
            records: records
                .iter()
                .map(|r| {
                    (
                        r.account_id,
                        PartialAccountRecord {
                            customer_name: r.customer_name.clone(),
                            account_status: r.account_status.clone(),
                            account_type: r.account_type.clone(),
                            created_date: r.created_date.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl AccountStatusGateway for MemoryGateway {
    async fn get_by_account_id(&self, account_id: u64) -> LookupOutcome {
        match self.records.get(&account_id) {
            Some(partial) => LookupOutcome::Found(partial.clone().into_record(account_id)),
            None => LookupOutcome::NotFound,
        }
    }
}

/// Read-only point lookups against a local SQLite table.
///
/// Each lookup opens its own read-only connection on the blocking pool, so
/// concurrent invocations never share a handle.
#[derive(Clone)]
pub struct SqliteGateway {
    path: String,
    query: String,
    busy_timeout: Duration,
}

impl SqliteGateway {
    /// `table` must already be a validated identifier; it is spliced into the query.
    pub fn open(path: &str, table: &str, busy_timeout: Duration) -> Result<Self, String> {
        let gateway = Self {
            path: path.to_string(),
            query: format!(
                "SELECT customer_name, account_status, account_type, created_date FROM {table} WHERE account_id = ?1"
            ),
            busy_timeout,
        };
        let conn = gateway.connect().map_err(|e| e.to_string())?;
        conn.prepare(&gateway.query).map_err(|e| e.to_string())?;
        Ok(gateway)
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    fn lookup_blocking(&self, account_id: i64) -> rusqlite::Result<Option<PartialAccountRecord>> {
        let conn = self.connect()?;
        conn.query_row(&self.query, params![account_id], |row| {
            Ok(PartialAccountRecord {
                customer_name: column_text(row.get_ref(0)?),
                account_status: column_text(row.get_ref(1)?),
                account_type: column_text(row.get_ref(2)?),
                created_date: column_text(row.get_ref(3)?),
            })
        })
        .optional()
    }
}

fn column_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Integer(v) => Some(v.to_string()),
        ValueRef::Real(v) => Some(v.to_string()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

#[async_trait]
impl AccountStatusGateway for SqliteGateway {
    async fn get_by_account_id(&self, account_id: u64) -> LookupOutcome {
        // SQLite integers are signed; larger ids cannot be stored.
        let Ok(key) = i64::try_from(account_id) else {
            return LookupOutcome::NotFound;
        };
        let gateway = self.clone();
        match tokio::task::spawn_blocking(move || gateway.lookup_blocking(key)).await {
            Ok(Ok(Some(partial))) => LookupOutcome::Found(partial.into_record(account_id)),
            Ok(Ok(None)) => LookupOutcome::NotFound,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "sqlite lookup failed");
                LookupOutcome::unavailable("sqlite_query_failed")
            }
            Err(err) => {
                tracing::warn!(error = %err, "sqlite lookup task failed");
                LookupOutcome::unavailable("sqlite_task_failed")
            }
        }
    }
}

/// Point lookups against a keyed document store over HTTP:
/// `GET {endpoint}/accounts/{id}`.
pub struct HttpGateway {
    base: String,
    client: Client,
}

impl HttpGateway {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            base: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl AccountStatusGateway for HttpGateway {
    async fn get_by_account_id(&self, account_id: u64) -> LookupOutcome {
        let url = format!("{}/accounts/{account_id}", self.base);
        let response = match self.client.get(&url).send().await {
            Ok(v) => v,
            Err(err) if err.is_timeout() => return LookupOutcome::unavailable("http_timeout"),
            Err(err) => {
                tracing::warn!(error = %err, "account store request failed");
                return LookupOutcome::unavailable("http_transport_error");
            }
        };

        match response.status() {
            StatusCode::NOT_FOUND => return LookupOutcome::NotFound,
            StatusCode::TOO_MANY_REQUESTS => return LookupOutcome::unavailable("http_throttled"),
            status if !status.is_success() => {
                tracing::warn!(status = status.as_u16(), "account store returned error status");
                return LookupOutcome::unavailable("http_status_error");
            }
            _ => {}
        }

        let document: Value = match response.json().await {
            Ok(v) => v,
            Err(_) => return LookupOutcome::unavailable("http_decode_error"),
        };
        match PartialAccountRecord::from_document(&document) {
            Some(partial) => LookupOutcome::Found(partial.into_record(account_id)),
            None => LookupOutcome::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};
    use teller_kernel::UNKNOWN_FIELD;

    struct SlowGateway;

    #[async_trait]
    impl AccountStatusGateway for SlowGateway {
        async fn get_by_account_id(&self, _account_id: u64) -> LookupOutcome {
            tokio::time::sleep(Duration::from_secs(5)).await;
            LookupOutcome::NotFound
        }
    }

    fn temp_db_path(label: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        std::env::temp_dir()
            .join(format!("teller-{label}-{nanos}.db"))
            .to_string_lossy()
            .to_string()
    }

    fn seed_sqlite(path: &str) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "
            CREATE TABLE customer_account_status (
                account_id INTEGER PRIMARY KEY,
                customer_name TEXT,
                account_status TEXT,
                account_type TEXT,
                created_date TEXT
            );
            INSERT INTO customer_account_status VALUES
                (5555, 'John Doe', 'Active', 'Checking', '2025-12-01'),
                (6000, 'Jane Roe', NULL, NULL, NULL);
            ",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn memory_gateway_distinguishes_found_and_missing() {
        let gateway = MemoryGateway::from_seed(&[SeedRecord {
            account_id: 5555,
            customer_name: Some("John Doe".to_string()),
            ..SeedRecord::default()
        }]);
        match gateway.get_by_account_id(5555).await {
            LookupOutcome::Found(record) => {
                assert_eq!(record.customer_name, "John Doe");
                assert_eq!(record.account_status, UNKNOWN_FIELD);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            gateway.get_by_account_id(1).await,
            LookupOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn timed_gateway_reports_timeout_as_unavailable() {
        let gateway = TimedGateway::new(SlowGateway, Duration::from_millis(20));
        assert_eq!(
            gateway.get_by_account_id(5555).await,
            LookupOutcome::unavailable("store_timeout")
        );
    }

    #[tokio::test]
    async fn sqlite_gateway_reads_rows_and_fills_unknown() {
        let path = temp_db_path("gateway");
        seed_sqlite(&path);
        let gateway =
            SqliteGateway::open(&path, "customer_account_status", Duration::from_secs(1)).unwrap();

        match gateway.get_by_account_id(5555).await {
            LookupOutcome::Found(record) => assert_eq!(record.account_type, "Checking"),
            other => panic!("unexpected {other:?}"),
        }
        match gateway.get_by_account_id(6000).await {
            LookupOutcome::Found(record) => {
                assert_eq!(record.customer_name, "Jane Roe");
                assert_eq!(record.created_date, UNKNOWN_FIELD);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            gateway.get_by_account_id(999999).await,
            LookupOutcome::NotFound
        );
        assert_eq!(
            gateway.get_by_account_id(u64::MAX).await,
            LookupOutcome::NotFound
        );
    }

    #[test]
    fn sqlite_gateway_fails_fast_on_missing_table() {
        let path = temp_db_path("missing-table");
        Connection::open(&path).unwrap();
        assert!(SqliteGateway::open(&path, "customer_account_status", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn sqlite_gateway_reports_unavailable_when_file_disappears() {
        let path = temp_db_path("vanishing");
        seed_sqlite(&path);
        let gateway =
            SqliteGateway::open(&path, "customer_account_status", Duration::from_secs(1)).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            gateway.get_by_account_id(5555).await,
            LookupOutcome::unavailable("sqlite_query_failed")
        );
    }

    #[tokio::test]
    async fn http_gateway_reports_unreachable_store_as_unavailable() {
        let gateway = HttpGateway::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            gateway.get_by_account_id(5555).await,
            LookupOutcome::Unavailable { .. }
        ));
    }
}
