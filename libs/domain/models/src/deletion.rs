// [libs/domain/models/src/deletion.rs]
/*!
 * =================================================================
 * APARATO: ACCOUNT DELETION MODELS (V4.0 - GRACE WINDOW)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: SOLICITUDES DE BORRADO CON GRACIA DE 30 DÍAS
 * =================================================================
 */

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Ventana de gracia antes del borrado duro del tenant.
pub const DELETION_GRACE_DAYS: i64 = 30;

#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStatus {
    Pending,
    Cancelled,
    Completed,
}

impl DeletionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionStatus::Pending => "pending",
            DeletionStatus::Cancelled => "cancelled",
            DeletionStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DeletionStatus::Pending),
            "cancelled" => Some(DeletionStatus::Cancelled),
            "completed" => Some(DeletionStatus::Completed),
            _ => None,
        }
    }
}

/// Solicitud de borrado de cuenta; `cancel` es no-op fuera de pending.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionRequest {
    #[serde(rename = "request_identifier")]
    pub id: String,

    #[serde(rename = "tenant_identifier")]
    pub tenant_id: String,

    #[serde(rename = "user_identifier")]
    pub user_id: String,

    pub status: DeletionStatus,

    #[typeshare(serialized_as = "String")]
    pub delete_after: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_summary: Option<serde_json::Value>,

    #[typeshare(serialized_as = "String")]
    pub created_at: DateTime<Utc>,
}

impl DeletionRequest {
    /// Instante de expiración de gracia desde el momento de la solicitud.
    #[must_use]
    pub fn grace_deadline_from(moment: DateTime<Utc>) -> DateTime<Utc> {
        moment + Duration::days(DELETION_GRACE_DAYS)
    }
}
