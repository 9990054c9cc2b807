// [tests/mirror/apps/orchestrator/services/command_bus_correlation.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: NODE COMMAND BUS
 * CERTIFICA: correlación por id, rechazo del agente, nodos
 *            inalcanzables, desconexión con pendientes en vuelo,
 *            timeout y descarte de respuestas tardías.
 * =================================================================
 */

use std::sync::Arc;
use uuid::Uuid;
use wopr_domain_models::{CommandResult, NodeCommandKind};
use wopr_orchestrator::services::command_bus::{CommandBusError, CommandChannel, NodeCommandBus};

#[tokio::test]
async fn certify_correlated_round_trip() {
    let bus = Arc::new(NodeCommandBus::new());
    let mut outbound_receiver = bus.register_link("n1");

    // Agente simulado: responde correlacionando por id.
    let responder_bus = Arc::clone(&bus);
    tokio::spawn(async move {
        while let Some(command) = outbound_receiver.recv().await {
            responder_bus.complete(
                "n1",
                CommandResult {
                    id: command.id,
                    success: true,
                    data: Some(serde_json::json!({ "status": "running" })),
                    error: None,
                },
            );
        }
    });

    let result = bus
        .dispatch("n1", NodeCommandKind::BotInspect, serde_json::json!({ "name": "tenant_t" }))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(
        result.data.unwrap().get("status").and_then(|status| status.as_str()),
        Some("running")
    );
}

#[tokio::test]
async fn certify_agent_rejection_surfaces() {
    let bus = Arc::new(NodeCommandBus::new());
    let mut outbound_receiver = bus.register_link("n1");

    let responder_bus = Arc::clone(&bus);
    tokio::spawn(async move {
        while let Some(command) = outbound_receiver.recv().await {
            responder_bus.complete(
                "n1",
                CommandResult {
                    id: command.id,
                    success: false,
                    data: None,
                    error: Some("tar corrupt".to_string()),
                },
            );
        }
    });

    let rejection = bus
        .dispatch("n1", NodeCommandKind::BotImport, serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(rejection, CommandBusError::CommandRejected(reason) if reason.contains("tar corrupt")));
}

#[tokio::test]
async fn certify_unreachable_node() {
    let bus = NodeCommandBus::new();
    let fault = bus
        .dispatch("n-ghost", NodeCommandKind::BotStart, serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(fault, CommandBusError::NodeUnreachable(_)));
}

#[tokio::test]
async fn certify_disconnect_fails_pending() {
    let bus = Arc::new(NodeCommandBus::new());
    let mut outbound_receiver = bus.register_link("n1");

    // El agente recibe el comando y el socket muere sin responder.
    let severing_bus = Arc::clone(&bus);
    tokio::spawn(async move {
        let _inflight = outbound_receiver.recv().await;
        severing_bus.deregister_link("n1");
    });

    let fault = bus
        .dispatch("n1", NodeCommandKind::BotStop, serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(fault, CommandBusError::NodeDisconnected(_)));
    assert!(bus.connected_nodes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn certify_deadline_and_late_response_discard() {
    let bus = Arc::new(NodeCommandBus::new());
    // El receptor queda vivo pero mudo: nadie responde jamás.
    let _silent_receiver = bus.register_link("n1");

    let fault = bus
        .dispatch("n1", NodeCommandKind::BotStop, serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        fault,
        CommandBusError::CommandTimeout { ref node_id, .. } if node_id == "n1"
    ));

    // Una respuesta tardía con id expirado se descarta sin colapso.
    bus.complete(
        "n1",
        CommandResult { id: Uuid::new_v4(), success: true, data: None, error: None },
    );
}
