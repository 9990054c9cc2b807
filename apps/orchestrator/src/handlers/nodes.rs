// [apps/orchestrator/src/handlers/nodes.rs]
/*!
 * =================================================================
 * APARATO: NODE REGISTRATION HANDLER (V4.6 - TRIPLE AUTH STRATA)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: ALTA DE NODOS POR SECRETO ESTÁTICO, SECRETO
 *                  PERSISTENTE O TOKEN ONE-SHOT
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ORDERED STRATA: estático -> por-nodo -> one-shot, evaluados en
 *    ese orden; cualquier otro bearer es 401.
 * 2. SECRET ONCE: El secreto por nodo 'wopr_node_<32hex>' viaja en
 *    claro EXACTAMENTE una vez (la respuesta de consagración); el
 *    sustrato solo conserva su SHA-256.
 * 3. DRAIN VETO: Un nodo en draining/offline no puede re-registrarse
 *    (409); el decomisionado tampoco.
 * =================================================================
 */

use crate::errors::GatewayError;
use crate::middleware::fingerprint;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use wopr_domain_models::credential::looks_like_uuid;

#[derive(Debug, Deserialize)]
pub struct NodeRegistrationRequest {
    /// Identificador propuesto por el nodo (vías 1 y 2).
    pub node_id: Option<String>,
    pub host: String,
    pub capacity_mb: i64,
    pub agent_version: String,
}

#[derive(Debug, Serialize)]
pub struct NodeRegistrationResponse {
    pub node_id: String,
    pub status: String,
    /// Presente SOLO en la consagración one-shot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_secret: Option<String>,
}

/**
 * POST /internal/nodes/register - tres vías de autenticación.
 */
#[instrument(skip(application_state, request_headers, registration))]
pub async fn handle_node_registration(
    State(application_state): State<AppState>,
    request_headers: HeaderMap,
    Json(registration): Json<NodeRegistrationRequest>,
) -> Result<Json<NodeRegistrationResponse>, GatewayError> {
    let bearer = request_headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|text| text.strip_prefix("Bearer "))
        .ok_or(GatewayError::Unauthorized)?
        .to_string();

    // --- VÍA 1: SECRETO ESTÁTICO COMPARTIDO ---
    if let Some(static_secret) = application_state.config.node_static_secret.as_deref() {
        if crate::middleware::constant_time_equals(bearer.as_bytes(), static_secret.as_bytes()) {
            let node_id = registration
                .node_id
                .clone()
                .ok_or_else(|| GatewayError::Validation("node_id required for static auth".to_string()))?;
            let record = register_checked(&application_state, &node_id, &registration).await?;
            return Ok(Json(NodeRegistrationResponse {
                node_id: record,
                status: "active".to_string(),
                node_secret: None,
            }));
        }
    }

    // --- VÍA 2: SECRETO PERSISTENTE POR NODO (no-UUID) ---
    if !looks_like_uuid(&bearer) {
        if let Some(owner_node_id) = application_state
            .credential_repository
            .find_node_by_secret_hash(&fingerprint(&bearer))
            .await?
        {
            // El id lo fija el mapeo almacenado, no el payload.
            let record = register_checked(&application_state, &owner_node_id, &registration).await?;
            return Ok(Json(NodeRegistrationResponse {
                node_id: record,
                status: "active".to_string(),
                node_secret: None,
            }));
        }
    }

    // --- VÍA 3: TOKEN DE REGISTRO ONE-SHOT (UUID) ---
    if looks_like_uuid(&bearer) {
        match application_state.credential_repository.consume_token(&bearer).await {
            Ok(consumed_token) => {
                let fresh_node_id = format!("self-{}", random_hex(4));
                let fresh_node_secret = format!("wopr_node_{}", random_hex(16));

                application_state
                    .credential_repository
                    .store_secret_hash(&fresh_node_id, &fingerprint(&fresh_node_secret))
                    .await?;

                let record = register_checked(&application_state, &fresh_node_id, &registration).await?;

                application_state
                    .audit_repository
                    .append(
                        "node-registry",
                        "node.consecrated",
                        &fresh_node_id,
                        Some(serde_json::json!({ "token_owner": consumed_token.user_id })),
                    )
                    .await;

                info!("🎫 [NODE_CONSECRATED]: [{}] via one-shot token.", fresh_node_id);
                // El secreto en claro viaja exactamente una vez.
                return Ok(Json(NodeRegistrationResponse {
                    node_id: record,
                    status: "active".to_string(),
                    node_secret: Some(fresh_node_secret),
                }));
            }
            Err(wopr_infra_db::DbError::TokenUnavailable) => {
                warn!("⛔ [NODE_REGISTER]: One-shot token unknown or already burned.");
            }
            Err(other_fault) => return Err(other_fault.into()),
        }
    }

    Err(GatewayError::Unauthorized)
}

/// Registro con veto de estados (draining/offline/decommissioned -> 409).
async fn register_checked(
    application_state: &AppState,
    node_id: &str,
    registration: &NodeRegistrationRequest,
) -> Result<String, GatewayError> {
    if let Some(existing_node) = application_state.node_repository.find(node_id).await? {
        if existing_node.status.rejects_registration()
            || existing_node.status == wopr_domain_models::NodeStatus::Decommissioned
        {
            return Err(GatewayError::Conflict(format!(
                "node {} is {}",
                node_id,
                existing_node.status.as_str()
            )));
        }
    }

    let record = application_state
        .node_repository
        .register_or_refresh(node_id, &registration.host, registration.capacity_mb, &registration.agent_version)
        .await?;

    application_state
        .audit_repository
        .append(
            "node-registry",
            "node.registered",
            node_id,
            Some(serde_json::json!({ "capacity_mb": registration.capacity_mb })),
        )
        .await;

    Ok(record.id)
}

fn random_hex(byte_count: usize) -> String {
    let mut random_bytes = vec![0u8; byte_count];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    hex::encode(random_bytes)
}
