// [apps/orchestrator/src/handlers/payments.rs]
/*!
 * =================================================================
 * APARATO: PAYMENT WEBHOOK RECEIVER (V4.3 - IDEMPOTENCY CONTRACT)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: CONTRATO credit(...) DE LOS PROVEEDORES DE PAGO
 *
 * El proveedor concreto (firma, parsing del evento) es un colaborador
 * externo; aquí vive EXCLUSIVAMENTE el contrato de idempotencia:
 * webhook_seen + reference_id del Ledger hacen inocuo todo replay.
 * =================================================================
 */

use crate::errors::GatewayError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use wopr_core_credit::Credit;
use wopr_domain_models::TransactionType;

#[derive(Debug, Deserialize)]
pub struct PaymentWebhookPayload {
    pub event_id: String,
    pub tenant_id: String,
    pub amount_cents: u64,
}

/**
 * POST /api/webhooks/payments/:source
 *
 * Doble escudo: el par (event_id, source) en webhook_seen y el
 * reference_id del Ledger. Un replay retorna duplicate sin alterar
 * el balance.
 */
#[instrument(skip(application_state, payload), fields(source = %source))]
pub async fn handle_payment_webhook(
    State(application_state): State<AppState>,
    Path(source): Path<String>,
    Json(payload): Json<PaymentWebhookPayload>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let reference_id = format!("{}_{}", source, payload.event_id);

    // 1. ESCUDO RÁPIDO: evento ya visto.
    if application_state
        .webhook_repository
        .is_duplicate(&payload.event_id, &source)
        .await?
    {
        return Ok(Json(json!({ "duplicate": true, "event_id": payload.event_id })));
    }

    // 2. ACREDITACIÓN IDEMPOTENTE (reference_id decide la carrera).
    let amount = Credit::from_cents(payload.amount_cents)
        .map_err(|fault| GatewayError::Validation(fault.to_string()))?;

    application_state
        .ledger
        .credit(
            &payload.tenant_id,
            amount,
            TransactionType::Purchase,
            &format!("{} payment {}", source, payload.event_id),
            Some(&reference_id),
        )
        .await?;

    // 3. SELLO DEL EVENTO.
    application_state
        .webhook_repository
        .mark_seen(&payload.event_id, &source)
        .await?;

    info!(
        "💰 [PAYMENT_SEALED]: Tenant [{}] +{} cents via {}.",
        payload.tenant_id, payload.amount_cents, source
    );
    Ok(Json(json!({ "credited": true, "event_id": payload.event_id })))
}
