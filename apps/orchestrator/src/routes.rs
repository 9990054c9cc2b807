// [apps/orchestrator/src/routes.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN ROUTING MATRIX (V4.6 - FOUR SURFACES)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L3)
 * RESPONSABILIDAD: TOPOLOGÍA DE RUTAS, GUARDIAS Y LÍMITES DE CUERPO
 *
 * VISION HIPER-HOLÍSTICA:
 * La topología sostiene cuatro superficies con auth independiente:
 * 1. /v1/ *        - llaves de servicio de tenant (gateway medido).
 * 2. /internal/ *  - credenciales de nodo (registro + uplink WS).
 * 3. /api/ *       - administración y superficie de instancias.
 * 4. /quota/ *     - token de flota.
 * Los límites de cuerpo por clase de endpoint (LLM 1MB, media 20MB,
 * audio 10MB, webhook 64KB) viven como capas tower por sub-router.
 * =================================================================
 */

use crate::handlers::{admin, gateway, node_socket, nodes, payments, quota, snapshots, telephony};
use crate::middleware::{admin_guard, fleet_token_guard, service_key_guard};
use crate::state::AppState;
use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

/// Límites de cuerpo por clase de endpoint.
const LLM_BODY_LIMIT_BYTES: usize = 1024 * 1024;
const MEDIA_BODY_LIMIT_BYTES: usize = 20 * 1024 * 1024;
const AUDIO_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;
const WEBHOOK_BODY_LIMIT_BYTES: usize = 64 * 1024;

pub fn create_sovereign_router(application_shared_state: AppState) -> Router {
    // Escudo de Red: CORS para el Dashboard y herramientas de Ops.
    let network_security_shield = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    // ESTRATO GATEWAY: clase LLM (1 MB) + fachadas de protocolo.
    let llm_stratum = Router::new()
        .route("/chat/completions", post(gateway::handle_capability_proxy))
        .route("/completions", post(gateway::handle_capability_proxy))
        .route("/embeddings", post(gateway::handle_capability_proxy))
        .route("/openai/*facade_path", post(gateway::handle_capability_proxy))
        .route("/anthropic/*facade_path", post(gateway::handle_capability_proxy))
        .layer(RequestBodyLimitLayer::new(LLM_BODY_LIMIT_BYTES));

    // ESTRATO GATEWAY: clase media (20 MB).
    let media_stratum = Router::new()
        .route("/images/generations", post(gateway::handle_capability_proxy))
        .route("/video/generations", post(gateway::handle_capability_proxy))
        .layer(RequestBodyLimitLayer::new(MEDIA_BODY_LIMIT_BYTES));

    // ESTRATO GATEWAY: clase audio (10 MB).
    let audio_stratum = Router::new()
        .route("/audio/speech", post(gateway::handle_capability_proxy))
        .route("/audio/transcriptions", post(gateway::handle_capability_proxy))
        .layer(RequestBodyLimitLayer::new(AUDIO_BODY_LIMIT_BYTES));

    // ESTRATO GATEWAY: telefonía saliente y mensajería (64 KB).
    let messaging_stratum = Router::new()
        .route("/phone/outbound", post(gateway::handle_capability_proxy))
        .route("/messages/sms", post(gateway::handle_capability_proxy))
        .layer(RequestBodyLimitLayer::new(WEBHOOK_BODY_LIMIT_BYTES));

    // Superficie /v1 completa bajo llave de servicio.
    let tenant_gateway_surface = Router::new()
        .merge(llm_stratum)
        .merge(media_stratum)
        .merge(audio_stratum)
        .merge(messaging_stratum)
        .route("/models", get(gateway::handle_models_catalog))
        .route_layer(middleware::from_fn_with_state(
            application_shared_state.clone(),
            service_key_guard,
        ));

    // Webhooks del proveedor telefónico (firma HMAC propia, 64 KB).
    let telephony_webhook_surface = Router::new()
        .route("/phone/inbound/:tenant_id", post(telephony::handle_phone_inbound))
        .route("/messages/sms/inbound/:tenant_id", post(telephony::handle_sms_inbound))
        .route(
            "/phone/twiml/hangup",
            get(telephony::handle_twiml_hangup).post(telephony::handle_twiml_hangup),
        )
        .layer(RequestBodyLimitLayer::new(WEBHOOK_BODY_LIMIT_BYTES));

    // ESTRATO INTERNO: plano de nodos.
    let node_plane_surface = Router::new()
        .route("/nodes/register", post(nodes::handle_node_registration))
        .route("/nodes/:node_id/ws", get(node_socket::establish_node_uplink));

    // ESTRATO DE ADMINISTRACIÓN (Command Center).
    let admin_surface = Router::new()
        .route("/nodes", get(admin::handle_list_nodes))
        .route("/nodes/:node_id/recover", post(admin::handle_trigger_recovery))
        .route("/nodes/:node_id/drain", post(admin::handle_drain_node))
        .route("/nodes/:node_id/decommission", post(admin::handle_decommission_node))
        .route("/recovery/:event_id/retry", post(admin::handle_retry_waiting))
        .route("/migration/:bot_id", post(admin::handle_migrate_bot))
        .route("/registration-tokens", post(admin::handle_issue_registration_token))
        .route_layer(middleware::from_fn_with_state(
            application_shared_state.clone(),
            admin_guard,
        ));

    // ESTRATO DE INSTANCIAS (bóveda de snapshots, bearer de tenant).
    let instance_surface = Router::new()
        .route(
            "/:instance_id/snapshots",
            post(snapshots::handle_create_snapshot).get(snapshots::handle_list_snapshots),
        )
        .route(
            "/:instance_id/snapshots/:snapshot_id/restore",
            post(snapshots::handle_restore_snapshot),
        )
        .route(
            "/:instance_id/snapshots/:snapshot_id",
            axum::routing::delete(snapshots::handle_delete_snapshot),
        )
        .route_layer(middleware::from_fn_with_state(
            application_shared_state.clone(),
            service_key_guard,
        ));

    // ESTRATO DE CUOTA (token de flota).
    let quota_surface = Router::new()
        .route("/", get(quota::handle_quota_status))
        .route("/check", post(quota::handle_quota_check))
        .route_layer(middleware::from_fn_with_state(
            application_shared_state.clone(),
            fleet_token_guard,
        ));

    // Receptores de pagos (contrato de idempotencia, 64 KB).
    let payment_surface = Router::new()
        .route("/payments/:source", post(payments::handle_payment_webhook))
        .layer(RequestBodyLimitLayer::new(WEBHOOK_BODY_LIMIT_BYTES));

    // COMPOSICIÓN GLOBAL (Root Topology).
    Router::new()
        .route("/health", get(|| async { "STATUS_OK" }))
        .nest("/v1", tenant_gateway_surface.merge(telephony_webhook_surface))
        .nest("/internal", node_plane_surface)
        .nest("/api/admin", admin_surface)
        .nest("/api/instances", instance_surface)
        .nest("/api/webhooks", payment_surface)
        .nest("/quota", quota_surface)
        .layer(network_security_shield)
        .with_state(application_shared_state)
}
