// [libs/domain/models/src/ledger.rs]
/*!
 * =================================================================
 * APARATO: LEDGER TRANSACTION MODELS (V4.1 - APPEND ONLY)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: ENTIDAD DE TRANSACCIÓN DE DOBLE ENTRADA
 *
 * # Mathematical Proof (Balance Identity):
 * balance(tenant) == Σ delta para todas las transacciones del tenant.
 * El balance jamás se almacena; toda caché es invalidada bajo el mismo
 * candado que la escritura que la ensucia.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;
use wopr_core_credit::Credit;

/// Clasificación semántica de cada delta del Ledger.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    SignupGrant,
    Promo,
    Purchase,
    AdapterUsage,
    BotRuntime,
    Addon,
    Correction,
}

impl TransactionType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::SignupGrant => "signup_grant",
            TransactionType::Promo => "promo",
            TransactionType::Purchase => "purchase",
            TransactionType::AdapterUsage => "adapter_usage",
            TransactionType::BotRuntime => "bot_runtime",
            TransactionType::Addon => "addon",
            TransactionType::Correction => "correction",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "signup_grant" => Some(TransactionType::SignupGrant),
            "promo" => Some(TransactionType::Promo),
            "purchase" => Some(TransactionType::Purchase),
            "adapter_usage" => Some(TransactionType::AdapterUsage),
            "bot_runtime" => Some(TransactionType::BotRuntime),
            "addon" => Some(TransactionType::Addon),
            "correction" => Some(TransactionType::Correction),
            _ => None,
        }
    }
}

/// Transacción inmutable del Ledger de doble entrada.
///
/// Las filas jamás se actualizan ni se borran; las correcciones son
/// nuevas transacciones de tipo `correction`.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    #[serde(rename = "transaction_identifier")]
    pub id: String,

    #[serde(rename = "tenant_identifier")]
    pub tenant_id: String,

    /// Delta firmado en unidades crudas (positivo = crédito).
    #[typeshare(serialized_as = "number")]
    pub delta: Credit,

    #[serde(rename = "transaction_type")]
    pub transaction_type: TransactionType,

    pub description: String,

    /// Llave de idempotencia globalmente única cuando no es nula.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,

    #[typeshare(serialized_as = "String")]
    pub created_at: DateTime<Utc>,
}
