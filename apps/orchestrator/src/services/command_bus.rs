// [apps/orchestrator/src/services/command_bus.rs]
/*!
 * =================================================================
 * APARATO: NODE COMMAND BUS (V4.5 - CORRELATED DUPLEX)
 * CLASIFICACIÓN: INFRASTRUCTURE SERVICE (ESTRATO L3/L4)
 * RESPONSABILIDAD: PETICIÓN/RESPUESTA SOBRE EL CANAL PERSISTENTE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE WRITER: Un solo canal mpsc alimenta al escritor del socket
 *    de cada nodo; el orden de emisión por conexión es FIFO.
 * 2. CORRELATION MAP: Los futuros pendientes viven indexados por el id
 *    del comando; una respuesta tardía (post-timeout) se descarta.
 * 3. DISCONNECT SEMANTICS: El cierre del socket falla TODOS los
 *    pendientes del nodo con NodeDisconnected; jamás se asume estado
 *    en vuelo tras una reconexión.
 *
 * # Mathematical Proof (Waiter Resolution):
 * Todo oneshot insertado en el mapa se resuelve exactamente una vez:
 * por respuesta correlacionada, por timeout (remoción explícita) o por
 * drop masivo en la desconexión. No existen esperas eternas.
 * =================================================================
 */

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use wopr_domain_models::{CommandResult, NodeCommand, NodeCommandKind};

/// Capacidad del buffer de mando hacia cada nodo.
const OUTBOUND_COMMAND_CAPACITY: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandBusError {
    /// El nodo no mantiene un canal activo con el plano de control.
    #[error("[L4_BUS_FAULT]: NODE_UNREACHABLE -> {0}")]
    NodeUnreachable(String),

    /// El socket se cerró con el comando en vuelo.
    #[error("[L4_BUS_FAULT]: NODE_DISCONNECTED -> {0}")]
    NodeDisconnected(String),

    /// El plazo del comando expiró sin respuesta correlacionada.
    #[error("[L4_BUS_FAULT]: COMMAND_TIMEOUT -> {kind} on {node_id}")]
    CommandTimeout { node_id: String, kind: String },

    /// El agente ejecutó el comando y reportó fallo.
    #[error("[L4_BUS_FAULT]: COMMAND_REJECTED -> {0}")]
    CommandRejected(String),
}

/**
 * Contrato del canal de mando. La orquestación (migración,
 * recuperación, poller) habla este trato y jamás el socket crudo,
 * permitiendo transportes simulados en el Proving Grounds.
 */
pub trait CommandChannel: Send + Sync + 'static {
    fn dispatch(
        &self,
        node_id: &str,
        kind: NodeCommandKind,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<CommandResult, CommandBusError>> + Send;
}

struct NodeLink {
    outbound: mpsc::Sender<NodeCommand>,
    pending: Arc<Mutex<HashMap<Uuid, oneshot::Sender<CommandResult>>>>,
}

/// Bus de mando real sobre los sockets de la flota.
#[derive(Default)]
pub struct NodeCommandBus {
    links: Mutex<HashMap<String, NodeLink>>,
}

impl NodeCommandBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /**
     * Registra el enlace de un nodo recién conectado.
     *
     * Retorna el receptor que el escritor del socket debe drenar. Un
     * enlace previo del mismo nodo es reemplazado y sus pendientes
     * fallan con NodeDisconnected.
     */
    pub fn register_link(&self, node_id: &str) -> mpsc::Receiver<NodeCommand> {
        let (outbound_sender, outbound_receiver) = mpsc::channel(OUTBOUND_COMMAND_CAPACITY);
        let fresh_link = NodeLink {
            outbound: outbound_sender,
            pending: Arc::new(Mutex::new(HashMap::new())),
        };

        let displaced_link = {
            let mut links_guard = self.links.lock().expect("bus links lock poisoned");
            links_guard.insert(node_id.to_string(), fresh_link)
        };

        if let Some(stale_link) = displaced_link {
            Self::fail_all_pending(&stale_link);
            warn!("🔌 [BUS_RELINK]: Node [{}] replaced a stale uplink.", node_id);
        }

        info!("🔌 [BUS_LINKED]: Node [{}] command channel established.", node_id);
        outbound_receiver
    }

    /// Da de baja el enlace; todos los pendientes fallan de inmediato.
    pub fn deregister_link(&self, node_id: &str) {
        let removed_link = {
            let mut links_guard = self.links.lock().expect("bus links lock poisoned");
            links_guard.remove(node_id)
        };

        if let Some(dead_link) = removed_link {
            Self::fail_all_pending(&dead_link);
            info!("🔌 [BUS_SEVERED]: Node [{}] command channel closed.", node_id);
        }
    }

    /// Correlaciona una respuesta entrante; las tardías se descartan.
    pub fn complete(&self, node_id: &str, result: CommandResult) {
        let waiter = {
            let links_guard = self.links.lock().expect("bus links lock poisoned");
            links_guard.get(node_id).and_then(|link| {
                let mut pending_guard = link.pending.lock().expect("pending lock poisoned");
                pending_guard.remove(&result.id)
            })
        };

        match waiter {
            Some(pending_sender) => {
                let _ = pending_sender.send(result);
            }
            None => {
                debug!(
                    "🕳️ [BUS_LATE_RESULT]: Node [{}] answered an expired command [{}]; discarded.",
                    node_id, result.id
                );
            }
        }
    }

    #[must_use]
    pub fn connected_nodes(&self) -> Vec<String> {
        let links_guard = self.links.lock().expect("bus links lock poisoned");
        links_guard.keys().cloned().collect()
    }

    fn fail_all_pending(link: &NodeLink) {
        let mut pending_guard = link.pending.lock().expect("pending lock poisoned");
        // El drop de los senders despierta a los receptores con error
        // de canal, que el despachador traduce a NodeDisconnected.
        pending_guard.clear();
    }
}

impl CommandChannel for NodeCommandBus {
    #[instrument(skip(self, payload), fields(kind = kind.as_str()))]
    async fn dispatch(
        &self,
        node_id: &str,
        kind: NodeCommandKind,
        payload: serde_json::Value,
    ) -> Result<CommandResult, CommandBusError> {
        let command = NodeCommand::forge(kind, payload);
        let command_identifier = command.id;
        let deadline = Duration::from_secs(kind.deadline_seconds());

        // 1. INSCRIPCIÓN DEL FUTURO PENDIENTE.
        let (result_sender, result_receiver) = oneshot::channel();
        let (outbound, pending) = {
            let links_guard = self.links.lock().expect("bus links lock poisoned");
            let link = links_guard
                .get(node_id)
                .ok_or_else(|| CommandBusError::NodeUnreachable(node_id.to_string()))?;
            (link.outbound.clone(), Arc::clone(&link.pending))
        };

        {
            let mut pending_guard = pending.lock().expect("pending lock poisoned");
            pending_guard.insert(command_identifier, result_sender);
        }

        // 2. EMISIÓN FIFO HACIA EL ESCRITOR DEL SOCKET.
        if outbound.send(command).await.is_err() {
            let mut pending_guard = pending.lock().expect("pending lock poisoned");
            pending_guard.remove(&command_identifier);
            return Err(CommandBusError::NodeDisconnected(node_id.to_string()));
        }

        // 3. ESPERA CON PLAZO.
        match tokio::time::timeout(deadline, result_receiver).await {
            Ok(Ok(result)) => {
                if result.success {
                    Ok(result)
                } else {
                    Err(CommandBusError::CommandRejected(
                        result.error.unwrap_or_else(|| "unspecified agent fault".to_string()),
                    ))
                }
            }
            Ok(Err(_channel_severed)) => Err(CommandBusError::NodeDisconnected(node_id.to_string())),
            Err(_deadline_elapsed) => {
                // Liberación del waiter; una respuesta tardía será descartada.
                let mut pending_guard = pending.lock().expect("pending lock poisoned");
                pending_guard.remove(&command_identifier);
                Err(CommandBusError::CommandTimeout {
                    node_id: node_id.to_string(),
                    kind: kind.as_str().to_string(),
                })
            }
        }
    }
}
