// [apps/orchestrator/src/handlers/node_socket.rs]
/*!
 * =================================================================
 * APARATO: NODE COMMAND SOCKET (V4.7 - FLEET UPLINK)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: CANAL DUPLEX PERSISTENTE POR NODO (RFC 6455)
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. TRIPLE TASK: Downstream (bus -> socket), Upstream (socket ->
 *    correlación/latidos) y Keep-Alive, con limpieza determinista.
 * 2. ZERO ABBREVIATIONS: Erradicación total de 'tx', 'rx' y 'ws' por
 *    descriptores nominales de la física del sistema.
 * 3. SEVERANCE PROTOCOL: El cierre del socket da de baja el enlace en
 *    el bus; todos los comandos en vuelo fallan con NodeDisconnected.
 * =================================================================
 */

use crate::middleware::fingerprint;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, instrument, warn};
use wopr_domain_models::node::NodeLifecycleEvent;
use wopr_domain_models::{NodeEnvelope, NodeStatus};

/// Intervalo de latido físico (Ping) para proxies Capa 7.
const KEEPALIVE_INTERVAL_SECONDS: u64 = 25;

/**
 * Negociación del uplink (GET /internal/nodes/:nodeId/ws).
 * El bearer debe ser el secreto estático o el secreto del nodo.
 */
#[instrument(skip(application_state, websocket_upgrade, request_headers))]
pub async fn establish_node_uplink(
    State(application_state): State<AppState>,
    Path(node_id): Path<String>,
    request_headers: HeaderMap,
    websocket_upgrade: WebSocketUpgrade,
) -> Response {
    let Some(bearer) = request_headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|text| text.strip_prefix("Bearer "))
        .map(str::to_string)
    else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let static_authorized = application_state
        .config
        .node_static_secret
        .as_deref()
        .map(|static_secret| crate::middleware::constant_time_equals(bearer.as_bytes(), static_secret.as_bytes()))
        .unwrap_or(false);

    let per_node_authorized = match application_state
        .credential_repository
        .find_node_by_secret_hash(&fingerprint(&bearer))
        .await
    {
        Ok(Some(owner_node_id)) => owner_node_id == node_id,
        Ok(None) => false,
        Err(lookup_fault) => {
            error!("❌ [UPLINK_AUTH_FAULT]: {}", lookup_fault);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !static_authorized && !per_node_authorized {
        warn!("⛔ [UPLINK_DENIED]: Node [{}] presented an unknown credential.", node_id);
        return StatusCode::UNAUTHORIZED.into_response();
    }

    websocket_upgrade.on_upgrade(move |socket| handle_active_uplink(socket, application_state, node_id))
}

/**
 * Orquestador soberano de la sesión del nodo (Triple Tarea).
 */
async fn handle_active_uplink(socket: WebSocket, application_state: AppState, node_id: String) {
    let (mut socket_sender, mut socket_receiver) = socket.split();
    let mut outbound_command_receiver = application_state.command_bus.register_link(&node_id);

    info!("⚡ [UPLINK_OPEN]: Node [{}] command channel live.", node_id);

    // --- TAREA 1: DOWNSTREAM + KEEP-ALIVE (bus -> socket) ---
    let downstream_node_id = node_id.clone();
    let mut downstream_transmission_task = tokio::spawn(async move {
        let mut keepalive_timer = interval(Duration::from_secs(KEEPALIVE_INTERVAL_SECONDS));

        loop {
            tokio::select! {
                // Brazo 1: Pulso de vida físico (Ping-Pong).
                _ = keepalive_timer.tick() => {
                    if socket_sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                },

                // Brazo 2: Sifón del bus de mando (FIFO por conexión).
                outbound_command = outbound_command_receiver.recv() => {
                    match outbound_command {
                        Some(command) => {
                            let Ok(serialized_command) = serde_json::to_string(&command) else {
                                error!("❌ [UPLINK_SERIALIZE_FAULT]: Command dropped for [{}].", downstream_node_id);
                                continue;
                            };
                            if socket_sender.send(Message::Text(serialized_command)).await.is_err() {
                                warn!("⚠️ [UPLINK_SEVERED]: Node [{}] lost downstream strata.", downstream_node_id);
                                break;
                            }
                        }
                        None => break,
                    }
                },
            }
        }
    });

    // --- TAREA 2: UPSTREAM (socket -> correlación / latidos / eventos) ---
    let upstream_state = application_state.clone();
    let upstream_node_id = node_id.clone();
    let mut upstream_reception_task = tokio::spawn(async move {
        while let Some(inbound_frame) = socket_receiver.next().await {
            match inbound_frame {
                Ok(Message::Text(frame_payload)) => {
                    process_inbound_envelope(&upstream_state, &upstream_node_id, &frame_payload).await;
                }
                Ok(Message::Pong(_)) | Ok(Message::Ping(_)) => {}
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(Message::Binary(_)) => {
                    debug!("🕳️ [UPLINK_BINARY]: Node [{}] sent an unexpected binary frame.", upstream_node_id);
                }
            }
        }
    });

    // --- LIMPIEZA DETERMINISTA ---
    tokio::select! {
        _ = &mut downstream_transmission_task => upstream_reception_task.abort(),
        _ = &mut upstream_reception_task => downstream_transmission_task.abort(),
    }

    application_state.command_bus.deregister_link(&node_id);
    info!("🔌 [UPLINK_CLOSED]: Node [{}] session sealed.", node_id);
}

/// Despacho de un sobre entrante del agente.
async fn process_inbound_envelope(application_state: &AppState, node_id: &str, frame_payload: &str) {
    let envelope: NodeEnvelope = match serde_json::from_str(frame_payload) {
        Ok(envelope) => envelope,
        Err(parse_fault) => {
            warn!("⚠️ [UPLINK_GRAMMAR]: Node [{}] sent an unparseable frame: {}", node_id, parse_fault);
            return;
        }
    };

    match envelope {
        NodeEnvelope::CommandResult(result) => {
            application_state.command_bus.complete(node_id, result);
        }
        NodeEnvelope::Heartbeat(heartbeat) => {
            if let Err(heartbeat_fault) = application_state
                .node_repository
                .record_heartbeat(node_id, heartbeat.used_mb, &heartbeat.agent_version)
                .await
            {
                warn!("⚠️ [HEARTBEAT_FAULT]: Node [{}]: {}", node_id, heartbeat_fault);
                return;
            }

            // Un degradado que vuelve a latir regresa a 'active'.
            if let Ok(Some(node_record)) = application_state.node_repository.find(node_id).await {
                if node_record.status == NodeStatus::Degraded {
                    let _ = application_state
                        .node_repository
                        .transition(node_id, NodeLifecycleEvent::HeartbeatReceived, "heartbeat_received", "uplink")
                        .await;
                }
            }
        }
        NodeEnvelope::Event { payload } => {
            debug!("📨 [UPLINK_EVENT]: Node [{}] -> {}", node_id, payload);
        }
    }
}
