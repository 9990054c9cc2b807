// [libs/domain/models/src/snapshot.rs]
/*!
 * =================================================================
 * APARATO: SNAPSHOT MODELS (V4.0 - CONTENT ADDRESSED)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: METADATOS DE SNAPSHOTS TAR DE INSTANCIAS
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Causa de la captura del snapshot.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotTrigger {
    Manual,
    Scheduled,
    PreRestore,
}

impl SnapshotTrigger {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotTrigger::Manual => "manual",
            SnapshotTrigger::Scheduled => "scheduled",
            SnapshotTrigger::PreRestore => "pre_restore",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(SnapshotTrigger::Manual),
            "scheduled" => Some(SnapshotTrigger::Scheduled),
            "pre_restore" => Some(SnapshotTrigger::PreRestore),
            _ => None,
        }
    }
}

/// Fila de metadatos de un snapshot; es dueña del tar en disco.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(rename = "snapshot_identifier")]
    pub id: String,

    #[serde(rename = "instance_identifier")]
    pub instance_id: String,

    #[serde(rename = "user_identifier")]
    pub user_id: String,

    #[typeshare(serialized_as = "String")]
    pub created_at: DateTime<Utc>,

    /// Tamaño del tar redondeado a 0.01 MB.
    pub size_mb: f64,

    pub trigger: SnapshotTrigger,

    /// Plugins instalados al momento de la captura.
    pub plugins: Vec<String>,

    /// SHA-256 de src/config.json ("" si el archivo no existía).
    pub config_hash: String,

    /// Ruta absoluta del artefacto tar.gz.
    pub storage_path: String,
}

/// Patrón de identificador seguro para rutas de snapshot.
///
/// Rechaza cualquier separador o metacarácter antes de tocar el shell.
#[must_use]
pub fn is_safe_instance_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
