// [libs/domain/models/src/bot.rs]
/*!
 * =================================================================
 * APARATO: BOT INSTANCE MODELS (V4.0 - TENANT SOVEREIGN)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: ENTIDAD DE BOT, ESTADO DE FACTURACIÓN Y POLÍTICA
 *                  DE ACTUALIZACIÓN DE IMAGEN
 * =================================================================
 */

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Estado de facturación de un bot (espejo de la solvencia del tenant).
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingState {
    Active,
    Suspended,
}

impl BillingState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingState::Active => "active",
            BillingState::Suspended => "suspended",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(BillingState::Active),
            "suspended" => Some(BillingState::Suspended),
            _ => None,
        }
    }
}

/// Cadencia de sondeo de imagen por canal de publicación.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseChannel {
    Canary,
    Staging,
    Stable,
    /// Anclado: jamás se agenda un sondeo.
    Pinned,
}

impl ReleaseChannel {
    /// Intervalo de sondeo del registro de imágenes; `None` = nunca.
    #[must_use]
    pub fn probe_interval_seconds(&self) -> Option<u64> {
        match self {
            ReleaseChannel::Canary => Some(5 * 60),
            ReleaseChannel::Staging => Some(15 * 60),
            ReleaseChannel::Stable => Some(30 * 60),
            ReleaseChannel::Pinned => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseChannel::Canary => "canary",
            ReleaseChannel::Staging => "staging",
            ReleaseChannel::Stable => "stable",
            ReleaseChannel::Pinned => "pinned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "canary" => Some(ReleaseChannel::Canary),
            "staging" => Some(ReleaseChannel::Staging),
            "stable" => Some(ReleaseChannel::Stable),
            "pinned" => Some(ReleaseChannel::Pinned),
            _ => None,
        }
    }
}

/// Política que gobierna cuándo un digest nuevo dispara la actualización.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdatePolicy {
    OnPush,
    Nightly,
    Manual,
}

impl UpdatePolicy {
    /**
     * Evalúa si la política permite actualizar en el instante dado.
     *
     * # Logic:
     * - `on-push`: inmediato.
     * - `nightly`: exclusivamente dentro de la ventana 03:00–03:05 UTC.
     * - `manual`: jamás de forma autónoma.
     */
    #[must_use]
    pub fn permits_update_at(&self, moment: DateTime<Utc>) -> bool {
        match self {
            UpdatePolicy::OnPush => true,
            UpdatePolicy::Nightly => moment.hour() == 3 && moment.minute() < 5,
            UpdatePolicy::Manual => false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdatePolicy::OnPush => "on-push",
            UpdatePolicy::Nightly => "nightly",
            UpdatePolicy::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "on-push" => Some(UpdatePolicy::OnPush),
            "nightly" => Some(UpdatePolicy::Nightly),
            "manual" => Some(UpdatePolicy::Manual),
            _ => None,
        }
    }
}

/// Instancia de bot de un tenant, colocada (o no) sobre un nodo.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotInstance {
    #[serde(rename = "bot_identifier")]
    pub id: String,

    #[serde(rename = "tenant_identifier")]
    pub tenant_id: String,

    pub name: String,

    /// Nodo anfitrión actual; `None` = sin colocar o entre migraciones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,

    pub billing_state: BillingState,

    /// Huella estimada de colocación en megabytes.
    #[typeshare(serialized_as = "number")]
    pub estimated_mb: i64,

    /// Indica si el bot arrastra estado en disco (requiere backup/import).
    pub stateful: bool,

    /// Referencia de imagen de contenedor (registro/repositorio:tag).
    pub image_reference: String,

    pub release_channel: ReleaseChannel,

    pub update_policy: UpdatePolicy,

    #[typeshare(serialized_as = "String")]
    pub created_at: DateTime<Utc>,

    #[typeshare(serialized_as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl BotInstance {
    /// Nombre canónico del artefacto de exportación sobre el nodo.
    #[must_use]
    pub fn export_artifact_name(&self) -> String {
        format!("tenant_{}", self.tenant_id)
    }
}
