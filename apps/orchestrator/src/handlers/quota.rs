// [apps/orchestrator/src/handlers/quota.rs]
/*!
 * =================================================================
 * APARATO: QUOTA HANDLERS (V4.2 - FLEET BALANCE PROBE)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: BALANCE + LÍMITES DE INSTANCIA PARA LA FLOTA
 * =================================================================
 */

use crate::errors::GatewayError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct QuotaQuery {
    pub tenant: String,
}

#[derive(Debug, Deserialize)]
pub struct QuotaCheckRequest {
    pub tenant: String,
}

/// GET /quota/?tenant=… - balance e instancias activas.
#[instrument(skip(application_state))]
pub async fn handle_quota_status(
    State(application_state): State<AppState>,
    Query(quota_query): Query<QuotaQuery>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let balance = application_state.ledger.balance(&quota_query.tenant).await?;
    let active_instances = application_state
        .bot_repository
        .count_active_for_tenant(&quota_query.tenant)
        .await?;

    Ok(Json(json!({
        "tenant": quota_query.tenant,
        "balance_cents": balance.to_cents_floor(),
        "activeInstances": active_instances,
    })))
}

/// POST /quota/check - 402 cuando el balance no es positivo.
#[instrument(skip(application_state, check_request))]
pub async fn handle_quota_check(
    State(application_state): State<AppState>,
    Json(check_request): Json<QuotaCheckRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let balance = application_state.ledger.balance(&check_request.tenant).await?;
    if !balance.is_positive() {
        return Err(GatewayError::InsufficientCredits {
            balance,
            required: wopr_core_credit::Credit::zero(),
        });
    }
    Ok(Json(json!({ "tenant": check_request.tenant, "ok": true })))
}
