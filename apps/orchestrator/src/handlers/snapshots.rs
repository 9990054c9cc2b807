// [apps/orchestrator/src/handlers/snapshots.rs]
/*!
 * =================================================================
 * APARATO: SNAPSHOT HANDLERS (V4.3 - VAULT SURFACE)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: CAPTURA, LISTADO Y RESTAURACIÓN DE SNAPSHOTS
 * =================================================================
 */

use crate::errors::GatewayError;
use crate::middleware::ServiceIdentity;
use crate::services::SnapshotError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::instrument;
use wopr_domain_models::SnapshotTrigger;

#[derive(Debug, Deserialize)]
pub struct SnapshotCreateRequest {
    pub trigger: Option<String>,
    /// Directorio de estado; por defecto <WOPR_HOME_BASE>/<instancia>.
    pub src_dir: Option<String>,
    #[serde(default)]
    pub plugins: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotRestoreRequest {
    pub dst_dir: Option<String>,
}

impl From<SnapshotError> for GatewayError {
    fn from(fault: SnapshotError) -> Self {
        match fault {
            SnapshotError::UnsafeInstanceId(candidate) => {
                GatewayError::Validation(format!("unsafe instance id: {}", candidate))
            }
            SnapshotError::SnapshotNotFound(snapshot_id) => {
                GatewayError::NotFound(format!("snapshot {}", snapshot_id))
            }
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

fn state_dir_for(application_state: &AppState, instance_id: &str, explicit: Option<String>) -> PathBuf {
    match explicit {
        Some(explicit_dir) => PathBuf::from(explicit_dir),
        None => {
            let home_base = application_state
                .config
                .wopr_home_base
                .clone()
                .unwrap_or_else(|| "bot-homes".to_string());
            PathBuf::from(home_base).join(instance_id)
        }
    }
}

/// POST /api/instances/:id/snapshots
#[instrument(skip(application_state, identity, create_request))]
pub async fn handle_create_snapshot(
    State(application_state): State<AppState>,
    Extension(identity): Extension<ServiceIdentity>,
    Path(instance_id): Path<String>,
    Json(create_request): Json<SnapshotCreateRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let trigger = create_request
        .trigger
        .as_deref()
        .and_then(SnapshotTrigger::parse)
        .unwrap_or(SnapshotTrigger::Manual);

    let src_dir = state_dir_for(&application_state, &instance_id, create_request.src_dir);
    let record = application_state
        .snapshot_vault
        .create(&instance_id, &identity.tenant_id, &src_dir, trigger, create_request.plugins)
        .await?;

    Ok(Json(serde_json::to_value(record).unwrap_or_default()))
}

/// GET /api/instances/:id/snapshots
pub async fn handle_list_snapshots(
    State(application_state): State<AppState>,
    Path(instance_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let records = application_state.snapshot_vault.list(&instance_id).await?;
    Ok(Json(serde_json::to_value(records).unwrap_or_default()))
}

/// POST /api/instances/:id/snapshots/:sid/restore
#[instrument(skip(application_state, restore_request))]
pub async fn handle_restore_snapshot(
    State(application_state): State<AppState>,
    Path((instance_id, snapshot_id)): Path<(String, String)>,
    Json(restore_request): Json<SnapshotRestoreRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let dst_dir = state_dir_for(&application_state, &instance_id, restore_request.dst_dir);
    application_state.snapshot_vault.restore(&snapshot_id, &dst_dir).await?;
    Ok(Json(json!({ "restored": snapshot_id, "instance": instance_id })))
}

/// DELETE /api/instances/:id/snapshots/:sid
#[instrument(skip(application_state))]
pub async fn handle_delete_snapshot(
    State(application_state): State<AppState>,
    Path((_instance_id, snapshot_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    application_state.snapshot_vault.delete(&snapshot_id).await?;
    Ok(Json(json!({ "deleted": snapshot_id })))
}
