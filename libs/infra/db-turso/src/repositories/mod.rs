// [libs/infra/db-turso/src/repositories/mod.rs]
/*!
 * =================================================================
 * APARATO: REPOSITORY ACCESS MATRIX (V4.2 - TOPOLOGY MASTER)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ORQUESTACIÓN DE SUBSISTEMAS DE PERSISTENCIA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ACCESS SOVEREIGNTY: Centraliza la visibilidad de los repositorios
 *    tácticos para la inyección de dependencias en el Orquestador.
 * 2. TEMPORAL PARITY: Toda marca temporal se cristaliza en RFC3339
 *    UTC con microsegundos, garantizando comparaciones lexicográficas
 *    estables dentro del motor SQLite.
 * 3. ZERO RESIDUE: Un módulo por tabla-familia, sin acoplamientos.
 * =================================================================
 */

// --- ESTRATO 1: CONTABILIDAD (LEDGER & METER) ---

/// Transacciones append-only del Ledger de créditos.
pub mod ledger;
/// Eventos de medición crudos y agregados por ventana/periodo.
pub mod meter;

// --- ESTRATO 2: FLOTA (NODOS, CREDENCIALES, BOTS) ---

/// Registro y máquina de estados de nodos trabajadores.
pub mod node;
/// Secretos por nodo y tokens de registro one-shot.
pub mod credential;
/// Inventario de instancias de bot por tenant.
pub mod bot;
/// Eventos e items de recuperación de nodos caídos.
pub mod recovery;

// --- ESTRATO 3: GOBERNANZA DEL GATEWAY ---

/// Contadores de rate-limit por ventana persistidos.
pub mod rate_limit;
/// Estado de circuit breakers por instancia.
pub mod breaker;
/// Umbrales de gasto por tenant.
pub mod spending;
/// Ledger de webhooks vistos (dedupe + TTL).
pub mod webhook;
/// Llaves de servicio de tenants (hash en reposo).
pub mod service_key;
/// Overrides temporales de salud de proveedores.
pub mod provider_health;

// --- ESTRATO 4: CICLO DE VIDA Y SISTEMA ---

/// Metadatos de snapshots tar de instancias.
pub mod snapshot;
/// Solicitudes de borrado con gracia de 30 días.
pub mod deletion;
/// Add-ons facturables por tenant.
pub mod addon;
/// Rastro forense best-effort del sistema.
pub mod audit;

// --- RE-EXPORTACIONES SOBERANAS (NOMINAL ACCESS API) ---

pub use addon::AddonRepository;
pub use audit::AuditRepository;
pub use bot::BotInstanceRepository;
pub use breaker::CircuitBreakerRepository;
pub use credential::NodeCredentialRepository;
pub use deletion::DeletionRepository;
pub use ledger::LedgerRepository;
pub use meter::MeterRepository;
pub use node::NodeRepository;
pub use provider_health::ProviderHealthRepository;
pub use rate_limit::RateLimitRepository;
pub use recovery::RecoveryRepository;
pub use service_key::{ServiceKeyIdentity, ServiceKeyRepository};
pub use snapshot::SnapshotRepository;
pub use spending::SpendingLimitRepository;
pub use webhook::WebhookLedgerRepository;

use crate::errors::DbError;
use chrono::{DateTime, SecondsFormat, Utc};

/// Cristaliza una marca temporal en el formato canónico del Ledger.
#[must_use]
pub(crate) fn fmt_ts(moment: DateTime<Utc>) -> String {
    moment.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Rehidrata una marca temporal desde el sustrato (RFC3339 o SQLite nativo).
pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, DbError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|fault| DbError::MappingError(format!("TEMPORAL_PARSE_FAULT [{}]: {}", raw, fault)))
}
