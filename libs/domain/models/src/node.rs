// [libs/domain/models/src/node.rs]
/*!
 * =================================================================
 * APARATO: NODE LIFECYCLE MODELS (V4.2 - STATE SOVEREIGN)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: ENTIDAD DE NODO Y MÁQUINA DE ESTADOS DE LA FLOTA
 *
 * # Mathematical Proof (Closed Transition Set):
 * El conjunto de transiciones es una tabla finita y explícita. Toda
 * mutación de estado pasa por 'next_status', garantizando que un nodo
 * en 'draining'/'offline' jamás regrese a 'active' sin pasar por el
 * protocolo de re-registro rechazado (409) o decomisionado.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Estados soberanos del ciclo de vida de un nodo trabajador.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Registering,
    Active,
    Degraded,
    Draining,
    Offline,
    Decommissioned,
}

impl NodeStatus {
    /// Forma textual persistida en el Ledger Táctico.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Registering => "registering",
            NodeStatus::Active => "active",
            NodeStatus::Degraded => "degraded",
            NodeStatus::Draining => "draining",
            NodeStatus::Offline => "offline",
            NodeStatus::Decommissioned => "decommissioned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "registering" => Some(NodeStatus::Registering),
            "active" => Some(NodeStatus::Active),
            "degraded" => Some(NodeStatus::Degraded),
            "draining" => Some(NodeStatus::Draining),
            "offline" => Some(NodeStatus::Offline),
            "decommissioned" => Some(NodeStatus::Decommissioned),
            _ => None,
        }
    }

    /// Un nodo en drenado o apagado jamás recibe colocaciones nuevas.
    #[must_use]
    pub fn accepts_placement(&self) -> bool {
        matches!(self, NodeStatus::Active)
    }

    /// El re-registro está vetado en estos estados (responde 409).
    #[must_use]
    pub fn rejects_registration(&self) -> bool {
        matches!(self, NodeStatus::Draining | NodeStatus::Offline)
    }
}

/// Eventos que disparan transiciones en la máquina de estados.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLifecycleEvent {
    Register,
    HeartbeatMissed,
    HeartbeatReceived,
    DeadTimeout,
    AdminDrain,
    DrainComplete,
    AdminDecommission,
}

impl NodeLifecycleEvent {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLifecycleEvent::Register => "register",
            NodeLifecycleEvent::HeartbeatMissed => "heartbeat_missed",
            NodeLifecycleEvent::HeartbeatReceived => "heartbeat_received",
            NodeLifecycleEvent::DeadTimeout => "dead_timeout",
            NodeLifecycleEvent::AdminDrain => "admin_drain",
            NodeLifecycleEvent::DrainComplete => "drain_complete",
            NodeLifecycleEvent::AdminDecommission => "admin_decommission",
        }
    }
}

/**
 * Tabla soberana de transiciones de la flota.
 *
 * Retorna el estado destino cuando el par (origen, evento) es legal;
 * `None` sella cualquier mutación fuera del conjunto cerrado.
 */
#[must_use]
pub fn next_status(current: NodeStatus, event: NodeLifecycleEvent) -> Option<NodeStatus> {
    use NodeLifecycleEvent as Event;
    use NodeStatus as Status;

    match (current, event) {
        (Status::Registering, Event::Register) => Some(Status::Active),
        (Status::Active, Event::Register) => Some(Status::Active),
        (Status::Degraded, Event::Register) => Some(Status::Active),
        (Status::Active, Event::HeartbeatMissed) => Some(Status::Degraded),
        (Status::Degraded, Event::HeartbeatReceived) => Some(Status::Active),
        (Status::Degraded, Event::DeadTimeout) => Some(Status::Offline),
        (Status::Active, Event::AdminDrain) => Some(Status::Draining),
        (Status::Degraded, Event::AdminDrain) => Some(Status::Draining),
        (Status::Draining, Event::DrainComplete) => Some(Status::Offline),
        (Status::Offline, Event::AdminDecommission) => Some(Status::Decommissioned),
        _ => None,
    }
}

/// Entidad persistida de un nodo trabajador de la flota.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(rename = "node_identifier")]
    pub id: String,

    /// Host físico o DNS del agente.
    pub host: String,

    pub status: NodeStatus,

    /// Capacidad total de colocación en megabytes.
    #[typeshare(serialized_as = "number")]
    pub capacity_mb: i64,

    /// Megabytes ocupados por bots colocados (reportado por latidos).
    #[typeshare(serialized_as = "number")]
    pub used_mb: i64,

    #[serde(rename = "agent_version", skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,

    #[typeshare(serialized_as = "String")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<DateTime<Utc>>,

    #[typeshare(serialized_as = "String")]
    pub registered_at: DateTime<Utc>,

    #[typeshare(serialized_as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl NodeRecord {
    /// Capacidad libre para el scoring de colocación.
    #[must_use]
    pub fn free_capacity_mb(&self) -> i64 {
        (self.capacity_mb - self.used_mb).max(0)
    }
}

/// Fila de auditoría emitida por cada transición de estado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTransition {
    pub node_id: String,
    pub from_status: NodeStatus,
    pub to_status: NodeStatus,
    pub reason: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}
