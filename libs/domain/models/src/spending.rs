// [libs/domain/models/src/spending.rs]
/*!
 * =================================================================
 * APARATO: SPENDING LIMIT MODELS (V4.0 - CAP SENTINEL)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: UMBRALES DE GASTO GLOBALES Y POR CAPACIDAD
 * =================================================================
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use typeshare::typeshare;
use wopr_core_credit::Credit;

use crate::capability::Capability;

/// Ámbito que disparó un bloqueo o alerta de gasto.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapScope {
    Daily,
    Monthly,
    Capability,
}

impl CapScope {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CapScope::Daily => "daily",
            CapScope::Monthly => "monthly",
            CapScope::Capability => "capability",
        }
    }
}

/// Par de umbrales de un ámbito: alerta suave y tope duro.
///
/// `alert_at` por defecto es `None`: sin umbral no hay emisión.
#[typeshare]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapThresholds {
    #[typeshare(serialized_as = "number")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_at: Option<Credit>,

    #[typeshare(serialized_as = "number")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hard_cap: Option<Credit>,
}

/// Configuración de gasto de un tenant.
#[typeshare]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpendingLimits {
    pub daily: CapThresholds,
    pub monthly: CapThresholds,

    /// Topes específicos por familia de capacidad (ciclo mensual).
    #[serde(default)]
    pub per_capability: HashMap<Capability, CapThresholds>,
}

impl SpendingLimits {
    /// Tenant sin fila en la tabla: sin topes, sin alertas.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }
}
