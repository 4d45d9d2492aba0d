use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use teller_config::Config;
use teller_contracts::{
    contracts_manifest_v1, ActionRequest, ActionResponse, ContractsMetadata, API_VERSION,
    MESSAGE_VERSION,
};
use teller_kernel::{
    format_response, resolve, AccountStatusGateway, Outcome, ScopePolicy, SUPPORTED_OPERATION,
};

pub mod audit;
pub mod gateway;

pub use audit::{verify_audit_chain, AuditError, AuditRecord, AuditTrail};
/// Transport-level message for a body that could not be read as JSON.
pub const UNREADABLE_BODY: &str = "request body must be JSON";

pub use gateway::{gateway_from_config, HttpGateway, MemoryGateway, SqliteGateway, TimedGateway};

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg).await?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

pub async fn build_app(cfg: Config) -> Result<Router, String> {
    let gateway = gateway_from_config(&cfg.store)?;
    build_app_with_gateway(cfg, gateway).await
}

/// Same as [`build_app`] but with a caller-supplied account store.
pub async fn build_app_with_gateway(
    cfg: Config,
    gateway: Arc<dyn AccountStatusGateway>,
) -> Result<Router, String> {
    let state = AppState::new(cfg, gateway).await?;
    Ok(Router::new()
        .route("/v1/healthz", get(healthz))
        .route("/v1/invocations", post(invocations))
        .route("/v1/contracts", get(contracts))
        .route("/v1/openapi.yaml", get(openapi))
        .with_state(state))
}

/// Runs a single invocation outside the HTTP server.
pub async fn invoke_once(cfg: Config, request: ActionRequest) -> Result<ActionResponse, String> {
    let gateway = gateway_from_config(&cfg.store)?;
    let state = AppState::new(cfg, gateway).await?;
    Ok(state.process_invocation(&request).await)
}

#[derive(Clone)]
struct AppState {
    scope: ScopePolicy,
    gateway: Arc<dyn AccountStatusGateway>,
    audit: Option<Arc<AuditTrail>>,
}

impl AppState {
    async fn new(cfg: Config, gateway: Arc<dyn AccountStatusGateway>) -> Result<Self, String> {
        let audit = match cfg.audit.jsonl_path.as_deref() {
            Some(path) => Some(Arc::new(
                AuditTrail::open(path)
                    .await
                    .map_err(|e| format!("audit trail unavailable: {e}"))?,
            )),
            None => None,
        };
        Ok(Self {
            scope: ScopePolicy::new(cfg.scope.allowed_action_groups),
            gateway,
            audit,
        })
    }

    async fn process_invocation(&self, request: &ActionRequest) -> ActionResponse {
        let outcome = resolve(request, &self.scope, self.gateway.as_ref()).await;
        log_outcome(request, &outcome);
        let response = format_response(request, &outcome);

        if let Some(audit) = &self.audit {
            audit
                .append(AuditRecord::for_invocation(request, &outcome))
                .await;
        }
        response
    }
}

fn log_outcome(request: &ActionRequest, outcome: &Outcome) {
    match outcome {
        Ok(_) => tracing::info!(
            action_group = %request.action_group,
            api_path = %request.api_path,
            status = 200,
            "account status returned"
        ),
        Err(err) if err.is_retryable() => tracing::warn!(
            action_group = %request.action_group,
            api_path = %request.api_path,
            status = 503,
            reason_code = err.reason_code(),
            "account store unavailable"
        ),
        Err(err) => tracing::info!(
            action_group = %request.action_group,
            api_path = %request.api_path,
            stage = err.stage().as_str(),
            status = ?err.status_code(),
            reason_code = err.reason_code(),
            "invocation ended early"
        ),
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Any JSON body yields an envelope. Only bodies that are not JSON at all are
/// rejected at the transport level.
async fn invocations(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ActionResponse>, (StatusCode, Json<Value>)> {
    let Json(event) = payload.map_err(|rejection| {
        tracing::debug!(status = rejection.status().as_u16(), "invocation body rejected");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": "validation_error", "message": UNREADABLE_BODY}})),
        )
    })?;
    let request = ActionRequest::from_event(event);
    Ok(Json(state.process_invocation(&request).await))
}

async fn contracts(State(state): State<AppState>) -> Json<ContractsMetadata> {
    let manifest = contracts_manifest_v1();
    let schemas: BTreeMap<String, String> = manifest
        .schemas
        .iter()
        .map(|s| (s.path.to_string(), s.sha256.to_string()))
        .collect();
    Json(ContractsMetadata {
        api_version: API_VERSION.to_string(),
        message_version: MESSAGE_VERSION.to_string(),
        openapi_sha256: manifest.openapi_sha256.to_string(),
        contracts_set_sha256: manifest.contracts_set_sha256.to_string(),
        generated_at: manifest.generated_at.to_string(),
        schemas,
        supported_operation: SUPPORTED_OPERATION.to_string(),
        allowed_action_groups: state.scope.allowed_action_groups().to_vec(),
    })
}

async fn openapi() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/yaml")],
        contracts_manifest_v1().openapi_body,
    )
}
