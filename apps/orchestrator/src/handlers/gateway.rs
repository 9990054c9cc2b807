// [apps/orchestrator/src/handlers/gateway.rs]
/*!
 * =================================================================
 * APARATO: METERED GATEWAY PROXY (V4.7 - EIGHT-STAGE PIPELINE)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: AUTH -> CAP -> CUPO -> BREAKER -> PROXY -> METER
 *                  -> DEBIT, EN ESE ORDEN Y SOLO EN ESE ORDEN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ACCOUNTING NEVER BLOCKS: El meter y el débito ocurren DESPUÉS
 *    de que la respuesta aguas arriba ya es un éxito; su fallo jamás
 *    revierte la petición (WAL/DLQ garantizan la contabilidad).
 * 2. FACADE REWRITE: /v1/openai/ * y /v1/anthropic/ * se canonicalizan
 *    y reutilizan el mismo pipeline.
 * 3. INSUFFICIENCY POLICY: El débito insolvente se audita y se deja
 *    al cron de runtime como autoridad de suspensión.
 * =================================================================
 */

use crate::errors::GatewayError;
use crate::middleware::ServiceIdentity;
use crate::services::breaker::BreakerVerdict;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use tracing::{debug, instrument, warn};
use wopr_core_credit::Credit;
use wopr_domain_models::{capability_for_path, Capability, MeterEvent, TransactionType, UsageMeasure};
use wopr_infra_providers::{models_document, provider_cost};

/**
 * Manejador único de las rutas proxy del gateway (/v1/ *).
 */
#[instrument(skip(application_state, identity, request_headers, request_body), fields(tenant = %identity.tenant_id))]
pub async fn handle_capability_proxy(
    State(application_state): State<AppState>,
    Extension(identity): Extension<ServiceIdentity>,
    OriginalUri(original_uri): OriginalUri,
    request_headers: HeaderMap,
    request_body: Bytes,
) -> Result<Response, GatewayError> {
    let canonical_path = canonicalize_facade_path(original_uri.path());
    let now = Utc::now();

    // --- ETAPA 1: RESOLUCIÓN DE CAPACIDAD ---
    let capability = capability_for_path(&canonical_path)
        .ok_or_else(|| GatewayError::NotFound(format!("route {}", canonical_path)))?;

    // --- ETAPA 2: TOPES DE GASTO (402) ---
    if let Some(cap_block) = application_state
        .spending_sentinel
        .check(&identity.tenant_id, capability, now)
        .await?
    {
        return Err(GatewayError::SpendingCapExceeded {
            scope: cap_block.scope.as_str().to_string(),
            cap: cap_block.cap_raw,
            spent: cap_block.spent_raw,
        });
    }

    // --- ETAPA 3: CUPO POR CAPACIDAD (429) ---
    let rate_decision = application_state
        .rate_limiter
        .check(&identity.tenant_id, capability, now)
        .await?;
    if !rate_decision.allowed {
        return Err(GatewayError::RateLimited {
            limit: rate_decision.limit,
            remaining: rate_decision.remaining,
            reset_epoch: rate_decision.reset_epoch,
        });
    }

    // --- ETAPA 4: CIRCUIT BREAKER (503) ---
    if let BreakerVerdict::Open { retry_after_seconds } = application_state
        .breaker_shield
        .guard(identity.instance_id(), now)
        .await?
    {
        return Err(GatewayError::CircuitOpen { retry_after_seconds });
    }

    // --- ETAPA 5: REENVÍO A LA MALLA (502 al agotarse) ---
    let content_type = request_headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/json")
        .to_string();

    let upstream_result = application_state
        .upstream_forwarder
        .dispatch(
            &application_state.provider_registry,
            capability,
            &canonical_path,
            &content_type,
            &request_body,
        )
        .await;

    let upstream_response = match upstream_result {
        Ok(response) => response,
        Err(mesh_fault) => {
            // El fallo cuenta contra el breaker de la instancia.
            let _ = application_state
                .breaker_shield
                .record_failure(identity.instance_id(), now)
                .await;
            return Err(mesh_fault.into());
        }
    };

    // --- ETAPA 6: MEDICIÓN (jamás falla la petición) ---
    let requested_model = extract_model(&request_body);
    let consumed_units = extract_units(capability, &request_body, &upstream_response.body);
    let cost = provider_cost(capability, consumed_units, requested_model.as_deref());
    let charge = cost
        .apply_margin_basis_points(application_state.config.margin_basis_points)
        .unwrap_or(cost);

    let mut meter_event = MeterEvent::forge(
        identity.tenant_id.clone(),
        cost,
        charge,
        capability,
        upstream_response.provider.clone(),
    );
    meter_event.duration_ms = Some(upstream_response.duration_ms);
    meter_event.session_id = request_headers
        .get("x-session-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    meter_event.usage = Some(UsageMeasure {
        units: consumed_units,
        unit_type: unit_type_for(capability).to_string(),
    });
    meter_event.tier = requested_model.clone();

    let meter_event_id = meter_event.id.clone();
    application_state.meter_emitter.emit(meter_event).await;

    // --- ETAPA 7: DÉBITO (reference = id del evento) ---
    let debit_result = application_state
        .ledger
        .debit(
            &identity.tenant_id,
            charge,
            TransactionType::AdapterUsage,
            &format!("{} via {}", capability.as_str(), upstream_response.provider),
            Some(&meter_event_id),
        )
        .await;

    if let Err(debit_fault) = debit_result {
        match debit_fault {
            wopr_domain_ledger::LedgerError::InsufficientBalance { balance, required } => {
                // La petición ya es exitosa; la insolvencia se audita y
                // el cron de runtime es la autoridad de suspensión.
                warn!(
                    "🕳️ [POST_PAY_INSOLVENCY]: Tenant [{}] balance {} below charge {}.",
                    identity.tenant_id, balance, required
                );
                application_state
                    .audit_repository
                    .append(
                        "gateway",
                        "debit.insufficient",
                        &identity.tenant_id,
                        Some(serde_json::json!({
                            "meter_event": meter_event_id,
                            "balance_raw": balance.raw(),
                            "required_raw": required.raw(),
                        })),
                    )
                    .await;
            }
            other_fault => {
                warn!("⚠️ [POST_PAY_FAULT]: Debit deferred to reconciliation: {}", other_fault);
            }
        }
    }

    // --- ETAPA 8: RESPUESTA AL TENANT ---
    debug!(
        "🛫 [GATEWAY]: {} {} -> {} ({} units, charge {}).",
        identity.tenant_id, canonical_path, upstream_response.status, consumed_units, charge
    );

    let mut response = Response::builder()
        .status(StatusCode::from_u16(upstream_response.status).unwrap_or(StatusCode::OK))
        .body(axum::body::Body::from(upstream_response.body))
        .map_err(|build_fault| GatewayError::Internal(build_fault.to_string()))?;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        upstream_response
            .content_type
            .parse()
            .unwrap_or_else(|_| "application/json".parse().unwrap()),
    );
    response.headers_mut().insert(
        "X-RateLimit-Limit",
        rate_decision.limit.to_string().parse().unwrap(),
    );
    response.headers_mut().insert(
        "X-RateLimit-Remaining",
        rate_decision.remaining.to_string().parse().unwrap(),
    );
    response.headers_mut().insert(
        "X-RateLimit-Reset",
        rate_decision.reset_epoch.to_string().parse().unwrap(),
    );
    Ok(response)
}

/// Catálogo de modelos del registro (GET /v1/models).
pub async fn handle_models_catalog(
    State(application_state): State<AppState>,
) -> impl IntoResponse {
    Json(models_document(application_state.provider_registry.descriptors()))
}

/// Canonicaliza las fachadas /v1/openai/ * y /v1/anthropic/ *.
#[must_use]
pub fn canonicalize_facade_path(path: &str) -> String {
    if let Some(suffix) = path.strip_prefix("/v1/openai/") {
        return format!("/v1/{}", suffix);
    }
    if let Some(suffix) = path.strip_prefix("/v1/anthropic/") {
        return format!("/v1/{}", suffix);
    }
    path.to_string()
}

fn unit_type_for(capability: Capability) -> &'static str {
    match capability {
        Capability::Llm => "tokens",
        Capability::ImageGen => "images",
        Capability::AudioSpeech => "seconds",
        Capability::Telephony => "segments",
    }
}

/// Modelo solicitado, si el cuerpo es JSON y lo declara.
fn extract_model(request_body: &[u8]) -> Option<String> {
    serde_json::from_slice::<serde_json::Value>(request_body)
        .ok()?
        .get("model")?
        .as_str()
        .map(str::to_string)
}

/**
 * Unidades consumidas: el usage reportado por el proveedor manda;
 * sin usage, la heurística por clase de capacidad decide.
 */
fn extract_units(capability: Capability, request_body: &[u8], response_body: &[u8]) -> i64 {
    if let Ok(response_json) = serde_json::from_slice::<serde_json::Value>(response_body) {
        if let Some(total_tokens) = response_json
            .get("usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(|tokens| tokens.as_i64())
        {
            return total_tokens.max(1);
        }
        if let Some(duration_seconds) = response_json
            .get("usage")
            .and_then(|usage| usage.get("duration_seconds"))
            .and_then(|duration| duration.as_i64())
        {
            return duration_seconds.max(1);
        }
    }

    match capability {
        // Aproximación nominal: ~4 bytes por token de entrada.
        Capability::Llm => ((request_body.len() as i64) / 4).max(1),
        Capability::ImageGen => 1,
        Capability::AudioSpeech => ((request_body.len() as i64) / 32_000).max(1),
        Capability::Telephony => 1,
    }
}
