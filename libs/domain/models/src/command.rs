// [libs/domain/models/src/command.rs]
/*!
 * =================================================================
 * APARATO: NODE COMMAND ENVELOPES (V4.3 - DUPLEX PROTOCOL)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: GRAMÁTICA JSON DEL CANAL DE MANDO PERSISTENTE
 *
 * # Mathematical Proof (Correlation Determinism):
 * Todo comando porta un identificador; toda respuesta correlaciona por
 * ese identificador. El orden de entrega por conexión es FIFO, por lo
 * que el par (id, orden) determina unívocamente el destino del futuro
 * pendiente en el bus de mando.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Verbos que el plano de control emite hacia el agente del nodo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCommandKind {
    #[serde(rename = "bot.start")]
    BotStart,
    #[serde(rename = "bot.stop")]
    BotStop,
    #[serde(rename = "bot.restart")]
    BotRestart,
    #[serde(rename = "bot.export")]
    BotExport,
    #[serde(rename = "bot.import")]
    BotImport,
    #[serde(rename = "bot.inspect")]
    BotInspect,
    #[serde(rename = "bot.reboot")]
    BotReboot,
    #[serde(rename = "backup.upload")]
    BackupUpload,
    #[serde(rename = "backup.download")]
    BackupDownload,
}

impl NodeCommandKind {
    /**
     * Plazo nominal del comando.
     *
     * Operaciones de control: 30 s. Operaciones largas (export/import y
     * transferencia de backups): 5 min.
     */
    #[must_use]
    pub fn deadline_seconds(&self) -> u64 {
        match self {
            NodeCommandKind::BotExport
            | NodeCommandKind::BotImport
            | NodeCommandKind::BackupUpload
            | NodeCommandKind::BackupDownload => 5 * 60,
            _ => 30,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeCommandKind::BotStart => "bot.start",
            NodeCommandKind::BotStop => "bot.stop",
            NodeCommandKind::BotRestart => "bot.restart",
            NodeCommandKind::BotExport => "bot.export",
            NodeCommandKind::BotImport => "bot.import",
            NodeCommandKind::BotInspect => "bot.inspect",
            NodeCommandKind::BotReboot => "bot.reboot",
            NodeCommandKind::BackupUpload => "backup.upload",
            NodeCommandKind::BackupDownload => "backup.download",
        }
    }
}

/// Sobre de comando plano-de-control -> nodo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCommand {
    pub id: Uuid,

    #[serde(rename = "type")]
    pub kind: NodeCommandKind,

    pub payload: serde_json::Value,
}

impl NodeCommand {
    #[must_use]
    pub fn forge(kind: NodeCommandKind, payload: serde_json::Value) -> Self {
        Self { id: Uuid::new_v4(), kind, payload }
    }
}

/// Resultado correlacionado de un comando ejecutado por el agente.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub id: Uuid,
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Latido periódico del agente con biometría de colocación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHeartbeat {
    pub used_mb: i64,
    pub agent_version: String,
    pub ts: DateTime<Utc>,
}

/// Sobre entrante nodo -> plano-de-control (unión etiquetada por "type").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeEnvelope {
    #[serde(rename = "command_result")]
    CommandResult(CommandResult),
    #[serde(rename = "heartbeat")]
    Heartbeat(NodeHeartbeat),
    #[serde(rename = "event")]
    Event { payload: serde_json::Value },
}
