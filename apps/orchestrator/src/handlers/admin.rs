// [apps/orchestrator/src/handlers/admin.rs]
/*!
 * =================================================================
 * APARATO: FLEET ADMINISTRATION HANDLERS (V4.5 - COMMAND CENTER)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: RECUPERACIÓN, DRENADO, MIGRACIÓN Y TOKENS
 * =================================================================
 */

use crate::errors::GatewayError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;
use wopr_domain_models::node::NodeLifecycleEvent;
use wopr_domain_models::RecoveryTrigger;

#[derive(Debug, Deserialize, Default)]
pub struct MigrationRequest {
    pub target_node_id: Option<String>,
    pub estimated_mb: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TokenIssueRequest {
    pub user_id: String,
    #[serde(default)]
    pub label: String,
}

/// POST /api/admin/nodes/:id/recover - recuperación manual.
#[instrument(skip(application_state))]
pub async fn handle_trigger_recovery(
    State(application_state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let recovery_service = application_state.recovery_service();
    let sealed_event = recovery_service
        .trigger_recovery(&node_id, RecoveryTrigger::Manual)
        .await?;
    Ok(Json(serde_json::to_value(sealed_event).unwrap_or_default()))
}

/// POST /api/admin/recovery/:id/retry - reintento de items en espera.
#[instrument(skip(application_state))]
pub async fn handle_retry_waiting(
    State(application_state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let recovery_service = application_state.recovery_service();
    let sealed_event = recovery_service.retry_waiting(&event_id).await?;
    Ok(Json(serde_json::to_value(sealed_event).unwrap_or_default()))
}

/// POST /api/admin/nodes/:id/drain - drenado coordinado.
#[instrument(skip(application_state))]
pub async fn handle_drain_node(
    State(application_state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let migration_orchestrator = application_state.migration_orchestrator();
    let drain_report = migration_orchestrator.drain(&node_id).await?;
    Ok(Json(json!({
        "node_id": drain_report.node_id,
        "migrated": drain_report.migrated,
        "failed": drain_report.failed,
    })))
}

/// POST /api/admin/migration/:botId - migración dirigida.
#[instrument(skip(application_state, migration_request))]
pub async fn handle_migrate_bot(
    State(application_state): State<AppState>,
    Path(bot_id): Path<String>,
    migration_request: Option<Json<MigrationRequest>>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let Json(request) = migration_request.unwrap_or_default();
    let migration_orchestrator = application_state.migration_orchestrator();
    let outcome = migration_orchestrator
        .migrate(&bot_id, request.target_node_id.as_deref(), request.estimated_mb)
        .await;

    Ok(Json(json!({
        "success": outcome.success,
        "sourceNodeId": outcome.source_node_id,
        "targetNodeId": outcome.target_node_id,
        "downtimeMs": outcome.downtime_ms,
        "error": outcome.error,
    })))
}

/// POST /api/admin/nodes/:id/decommission - retiro definitivo.
#[instrument(skip(application_state))]
pub async fn handle_decommission_node(
    State(application_state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let final_status = application_state
        .node_repository
        .transition(&node_id, NodeLifecycleEvent::AdminDecommission, "admin_decommission", "admin")
        .await?;
    Ok(Json(json!({ "node_id": node_id, "status": final_status.as_str() })))
}

/// GET /api/admin/nodes - radiografía de la flota.
pub async fn handle_list_nodes(
    State(application_state): State<AppState>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let fleet = application_state.node_repository.list().await?;
    Ok(Json(serde_json::to_value(fleet).unwrap_or_default()))
}

/// POST /api/admin/registration-tokens - emisión one-shot.
#[instrument(skip(application_state, issue_request))]
pub async fn handle_issue_registration_token(
    State(application_state): State<AppState>,
    Json(issue_request): Json<TokenIssueRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let token = Uuid::new_v4().to_string();
    let issued = application_state
        .credential_repository
        .issue_token(&token, &issue_request.user_id, &issue_request.label)
        .await?;

    application_state
        .audit_repository
        .append("admin", "token.issued", &issued.user_id, Some(json!({ "label": issued.label })))
        .await;

    Ok(Json(json!({ "token": issued.token, "label": issued.label })))
}
