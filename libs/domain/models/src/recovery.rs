// [libs/domain/models/src/recovery.rs]
/*!
 * =================================================================
 * APARATO: RECOVERY MODELS (V4.1 - SWARM SALVAGE)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: EVENTOS DE RECUPERACIÓN Y SUS ITEMS POR TENANT
 *
 * # Mathematical Proof (Count Conservation):
 * Para todo evento cerrado: recovered + failed + waiting == total.
 * 'completed' exige failed == 0 ∧ waiting == 0; cualquier residuo
 * produce 'partial' y notificación al administrador.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Origen del disparo de la recuperación.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryTrigger {
    Auto,
    Manual,
    Drain,
}

impl RecoveryTrigger {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryTrigger::Auto => "auto",
            RecoveryTrigger::Manual => "manual",
            RecoveryTrigger::Drain => "drain",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(RecoveryTrigger::Auto),
            "manual" => Some(RecoveryTrigger::Manual),
            "drain" => Some(RecoveryTrigger::Drain),
            _ => None,
        }
    }
}

#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryEventStatus {
    InProgress,
    Completed,
    Partial,
}

impl RecoveryEventStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryEventStatus::InProgress => "in_progress",
            RecoveryEventStatus::Completed => "completed",
            RecoveryEventStatus::Partial => "partial",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(RecoveryEventStatus::InProgress),
            "completed" => Some(RecoveryEventStatus::Completed),
            "partial" => Some(RecoveryEventStatus::Partial),
            _ => None,
        }
    }
}

#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryItemStatus {
    Recovered,
    Failed,
    Waiting,
}

impl RecoveryItemStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryItemStatus::Recovered => "recovered",
            RecoveryItemStatus::Failed => "failed",
            RecoveryItemStatus::Waiting => "waiting",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "recovered" => Some(RecoveryItemStatus::Recovered),
            "failed" => Some(RecoveryItemStatus::Failed),
            "waiting" => Some(RecoveryItemStatus::Waiting),
            _ => None,
        }
    }
}

/// Evento de recuperación de un nodo caído o drenado.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryEvent {
    #[serde(rename = "event_identifier")]
    pub id: String,

    #[serde(rename = "node_identifier")]
    pub node_id: String,

    pub trigger: RecoveryTrigger,
    pub status: RecoveryEventStatus,

    #[typeshare(serialized_as = "number")]
    pub tenants_total: i64,
    #[typeshare(serialized_as = "number")]
    pub tenants_recovered: i64,
    #[typeshare(serialized_as = "number")]
    pub tenants_failed: i64,
    #[typeshare(serialized_as = "number")]
    pub tenants_waiting: i64,

    #[typeshare(serialized_as = "String")]
    pub started_at: DateTime<Utc>,

    #[typeshare(serialized_as = "String")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_json: Option<serde_json::Value>,
}

impl RecoveryEvent {
    /// Estado de cierre según la conservación de conteos.
    #[must_use]
    pub fn closing_status(&self) -> RecoveryEventStatus {
        if self.tenants_failed == 0 && self.tenants_waiting == 0 {
            RecoveryEventStatus::Completed
        } else {
            RecoveryEventStatus::Partial
        }
    }
}

/// Item de recuperación: un bot (tenant) re-colocado o en espera.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryItem {
    #[serde(rename = "item_identifier")]
    pub id: String,

    #[serde(rename = "event_identifier")]
    pub event_id: String,

    pub tenant: String,

    #[serde(rename = "bot_identifier")]
    pub bot_id: String,

    pub source_node: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_node: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_key: Option<String>,

    pub status: RecoveryItemStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[typeshare(serialized_as = "String")]
    pub started_at: DateTime<Utc>,

    #[typeshare(serialized_as = "String")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
