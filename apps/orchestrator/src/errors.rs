// [apps/orchestrator/src/errors.rs]
/*!
 * =================================================================
 * APARATO: GATEWAY ERROR BOUNDARY (V4.3 - WIRE TAXONOMY)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: MAPEO ÚNICO DOMINIO -> CÓDIGOS DE CABLE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE BOUNDARY: Solo este aparato traduce errores tipados a
 *    HTTP; los estratos internos jamás conocen códigos de estado.
 * 2. ACTIONABLE PAYLOADS: 402 y 429 transportan los datos que el
 *    tenant necesita para reaccionar (balance, cap, retry hint).
 * =================================================================
 */

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use wopr_core_credit::Credit;
use wopr_domain_ledger::LedgerError;
use wopr_infra_db::DbError;
use wopr_infra_providers::ProviderError;

use crate::services::command_bus::CommandBusError;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient credits")]
    InsufficientCredits { balance: Credit, required: Credit },

    #[error("spending cap exceeded")]
    SpendingCapExceeded { scope: String, cap: i64, spent: i64 },

    #[error("rate limited")]
    RateLimited { limit: i64, remaining: i64, reset_epoch: i64 },

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("upstream failed: {0}")]
    UpstreamFailed(String),

    #[error("circuit open")]
    CircuitOpen { retry_after_seconds: i64 },

    #[error("node fault: {0}")]
    NodeFault(#[from] CommandBusError),

    #[error("internal: {0}")]
    Internal(String),
}

impl From<DbError> for GatewayError {
    fn from(fault: DbError) -> Self {
        match fault {
            DbError::NodeNotFound => GatewayError::NotFound("node".into()),
            DbError::BotNotFound => GatewayError::NotFound("bot".into()),
            DbError::RecordNotFound => GatewayError::NotFound("record".into()),
            DbError::TokenUnavailable => GatewayError::Unauthorized,
            DbError::InvalidNodeTransition { from, to } => {
                GatewayError::Conflict(format!("node transition {} -> {}", from, to))
            }
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl From<LedgerError> for GatewayError {
    fn from(fault: LedgerError) -> Self {
        match fault {
            LedgerError::InsufficientBalance { balance, required } => {
                GatewayError::InsufficientCredits { balance, required }
            }
            LedgerError::NegativeAmount => GatewayError::Validation("amount must be non-negative".into()),
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl From<ProviderError> for GatewayError {
    fn from(fault: ProviderError) -> Self {
        match fault {
            ProviderError::NoAdapterForCapability(capability) => {
                GatewayError::NotFound(format!("capability {}", capability))
            }
            other => GatewayError::UpstreamFailed(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "validation", "details": details })),
            )
                .into_response(),

            GatewayError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized" })),
            )
                .into_response(),

            GatewayError::Forbidden(details) => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "forbidden", "details": details })),
            )
                .into_response(),

            GatewayError::NotFound(subject) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "not_found", "subject": subject })),
            )
                .into_response(),

            GatewayError::Conflict(details) => (
                StatusCode::CONFLICT,
                Json(json!({ "error": "conflict", "details": details })),
            )
                .into_response(),

            GatewayError::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({
                    "error": "insufficient_credits",
                    "balance_cents": balance.to_cents_floor(),
                    "required_cents": required.to_cents_rounded(),
                    "top_up_url": "/billing/top-up",
                })),
            )
                .into_response(),

            GatewayError::SpendingCapExceeded { scope, cap, spent } => (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({
                    "error": "spending_cap_exceeded",
                    "scope": scope,
                    "cap": cap,
                    "spent": spent,
                })),
            )
                .into_response(),

            GatewayError::RateLimited { limit, remaining, reset_epoch } => {
                let now_epoch = chrono::Utc::now().timestamp();
                let retry_after = (reset_epoch - now_epoch).max(1);
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": "rate_limited", "retry_after": retry_after })),
                )
                    .into_response();
                let headers = response.headers_mut();
                headers.insert(header::RETRY_AFTER, retry_after.to_string().parse().unwrap());
                headers.insert("X-RateLimit-Limit", limit.to_string().parse().unwrap());
                headers.insert("X-RateLimit-Remaining", remaining.to_string().parse().unwrap());
                headers.insert("X-RateLimit-Reset", reset_epoch.to_string().parse().unwrap());
                response
            }

            GatewayError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "payload_too_large" })),
            )
                .into_response(),

            GatewayError::UpstreamFailed(details) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "upstream_failed", "details": details })),
            )
                .into_response(),

            GatewayError::CircuitOpen { retry_after_seconds } => {
                let mut response = (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "circuit_open" })),
                )
                    .into_response();
                response.headers_mut().insert(
                    header::RETRY_AFTER,
                    retry_after_seconds.max(1).to_string().parse().unwrap(),
                );
                response
            }

            GatewayError::NodeFault(node_fault) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "node_unavailable", "details": node_fault.to_string() })),
            )
                .into_response(),

            GatewayError::Internal(details) => {
                // Violación de invariante interna: siempre trazada, jamás silenciada.
                error!("🔥 [INTERNAL_FAULT]: {}", details);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal" })),
                )
                    .into_response()
            }
        }
    }
}
