// [apps/orchestrator/src/middleware.rs]
/*!
 * =================================================================
 * APARATO: GALVANIC AUTHENTICATION GUARDS (V4.4 - TRIPLE CITIZENSHIP)
 * CLASIFICACIÓN: SECURITY STRATUM (ESTRATO L4)
 * RESPONSABILIDAD: VALIDACIÓN DE BEARER E INYECCIÓN DE IDENTIDAD
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. TRIPLE CITIZENSHIP: Llave de servicio de tenant (/v1/ *), token
 *    de flota (/quota/ *) y token de administración (/api/admin/ *).
 * 2. HASH AT REST: La llave de servicio viaja en claro SOLO en el
 *    header; el sustrato la conoce únicamente como SHA-256.
 * 3. FEATURE GATING: La ausencia del token de entorno deshabilita la
 *    superficie completa (401 incondicional), jamás la abre.
 * =================================================================
 */

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Identidad resuelta de una llave de servicio válida.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub tenant_id: String,
    pub service_key_id: String,
}

impl ServiceIdentity {
    /// Identidad de instancia usada por el circuit breaker.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.service_key_id
    }
}

/// Extrae el bearer crudo del header Authorization.
#[must_use]
pub fn extract_bearer(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header_value| header_value.to_str().ok())
        .and_then(|header_text| header_text.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Huella SHA-256 hexadecimal de una credencial.
#[must_use]
pub fn fingerprint(credential: &str) -> String {
    hex::encode(Sha256::digest(credential.as_bytes()))
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response()
}

/**
 * Guardia de llaves de servicio (/v1/ *): resuelve el tenant dueño del
 * bearer e inyecta ServiceIdentity en la petición.
 */
pub async fn service_key_guard(
    State(application_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(bearer) = extract_bearer(&request) else {
        return unauthorized();
    };

    match application_state
        .service_key_repository
        .resolve(&fingerprint(&bearer))
        .await
    {
        Ok(Some(key_identity)) => {
            debug!("🔑 [SERVICE_KEY]: Tenant [{}] authenticated.", key_identity.tenant_id);
            request.extensions_mut().insert(ServiceIdentity {
                tenant_id: key_identity.tenant_id,
                service_key_id: key_identity.service_key_id,
            });
            next.run(request).await
        }
        Ok(None) => unauthorized(),
        Err(resolution_fault) => {
            warn!("⚠️ [SERVICE_KEY_FAULT]: Resolution collapsed: {}", resolution_fault);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal" })),
            )
                .into_response()
        }
    }
}

/**
 * Guardia de administración (/api/admin/ *). Token ausente en el
 * entorno = superficie deshabilitada.
 */
pub async fn admin_guard(
    State(application_state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected_token) = application_state.config.admin_api_token.clone() else {
        warn!("⛔ [ADMIN_SURFACE_OFF]: ADMIN_API_TOKEN absent; surface disabled.");
        return unauthorized();
    };

    match extract_bearer(&request) {
        Some(bearer) if constant_time_equals(bearer.as_bytes(), expected_token.as_bytes()) => {
            next.run(request).await
        }
        _ => unauthorized(),
    }
}

/**
 * Guardia del endpoint de cuota (/quota/ *), gobernado por
 * FLEET_API_TOKEN.
 */
pub async fn fleet_token_guard(
    State(application_state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected_token) = application_state.config.fleet_api_token.clone() else {
        warn!("⛔ [QUOTA_SURFACE_OFF]: FLEET_API_TOKEN absent; surface disabled.");
        return unauthorized();
    };

    match extract_bearer(&request) {
        Some(bearer) if constant_time_equals(bearer.as_bytes(), expected_token.as_bytes()) => {
            next.run(request).await
        }
        _ => unauthorized(),
    }
}

/// Comparación en tiempo constante (longitudes distintas fallan).
#[must_use]
pub fn constant_time_equals(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut accumulated_difference = 0u8;
    for (left_byte, right_byte) in left.iter().zip(right.iter()) {
        accumulated_difference |= left_byte ^ right_byte;
    }
    accumulated_difference == 0
}
