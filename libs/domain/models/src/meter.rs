// [libs/domain/models/src/meter.rs]
/*!
 * =================================================================
 * APARATO: METER EVENT MODELS (V4.2 - ACCOUNTING ATOM)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: ÁTOMO DE MEDICIÓN Y AGREGADOS DE CONSUMO
 *
 * # Mathematical Proof (Margin Invariant):
 * Para todo MeterEvent E: E.charge ≥ E.cost. El margen multiplicativo
 * es ≥ 1.0 por construcción (ver wopr-core-credit).
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;
use uuid::Uuid;
use wopr_core_credit::Credit;

use crate::capability::Capability;

/// Medida de consumo opcional adjunta a un evento (tokens, segundos, etc.).
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageMeasure {
    #[typeshare(serialized_as = "number")]
    pub units: i64,
    pub unit_type: String,
}

/// Átomo del pipeline contable: una llamada medida al gateway.
///
/// El identificador se genera ANTES de la escritura en el WAL para que
/// la semántica at-least-once del pipeline sea deduplicable por `id`.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterEvent {
    pub id: String,

    pub tenant: String,

    /// Costo del proveedor en unidades crudas.
    #[typeshare(serialized_as = "number")]
    pub cost: Credit,

    /// Cargo al tenant (costo × margen) en unidades crudas.
    #[typeshare(serialized_as = "number")]
    pub charge: Credit,

    pub capability: Capability,

    pub provider: String,

    #[typeshare(serialized_as = "String")]
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Duración de la llamada aguas arriba en milisegundos.
    #[typeshare(serialized_as = "number")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMeasure>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl MeterEvent {
    /// Forja un evento nuevo con identificador UUID pre-WAL.
    #[must_use]
    pub fn forge(
        tenant: impl Into<String>,
        cost: Credit,
        charge: Credit,
        capability: Capability,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant: tenant.into(),
            cost,
            charge,
            capability,
            provider: provider.into(),
            timestamp: Utc::now(),
            session_id: None,
            duration_ms: None,
            usage: None,
            tier: None,
            metadata: None,
        }
    }
}

/// Agregado por ventana de 60 s, upsert idempotente por tupla de grupo.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    pub tenant: String,
    pub capability: Capability,
    pub provider: String,

    #[typeshare(serialized_as = "String")]
    pub window_start: DateTime<Utc>,

    #[typeshare(serialized_as = "number")]
    pub event_count: i64,

    #[typeshare(serialized_as = "number")]
    pub total_cost: Credit,

    #[typeshare(serialized_as = "number")]
    pub total_charge: Credit,

    #[typeshare(serialized_as = "number")]
    pub total_duration_ms: i64,
}

/// Agregado del periodo de facturación activo (mensual).
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingPeriodSummary {
    pub tenant: String,
    pub capability: Capability,
    pub provider: String,

    #[typeshare(serialized_as = "String")]
    pub period_start: DateTime<Utc>,

    #[typeshare(serialized_as = "number")]
    pub event_count: i64,

    #[typeshare(serialized_as = "number")]
    pub total_cost: Credit,

    #[typeshare(serialized_as = "number")]
    pub total_charge: Credit,

    #[typeshare(serialized_as = "number")]
    pub total_duration_ms: i64,
}
