// [libs/infra/providers/src/errors.rs]
/*!
 * =================================================================
 * APARATO: PROVIDER MESH ERROR CATALOG (V4.0)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: TAXONOMÍA DE FALLOS DE LA MALLA AGUAS ARRIBA
 * =================================================================
 */

use thiserror::Error;
use wopr_infra_db::DbError;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// Ningún adaptador registrado cubre la capacidad solicitada.
    #[error("[L3_MESH_FAULT]: NO_ADAPTER_FOR_CAPABILITY -> {0}")]
    NoAdapterForCapability(String),

    /// Todos los adaptadores de la capacidad fallaron en cascada (502).
    #[error("[L3_MESH_FAULT]: ALL_PROVIDERS_EXHAUSTED -> {0}")]
    AllProvidersExhausted(String),

    /// Fallo de transporte hacia el proveedor.
    #[error("[L3_MESH_FAULT]: UPSTREAM_TRANSPORT -> {0}")]
    Transport(#[from] reqwest::Error),

    /// Plazo de la petición aguas arriba agotado.
    #[error("[L3_MESH_FAULT]: UPSTREAM_DEADLINE_EXCEEDED")]
    DeadlineExceeded,

    /// Fallo del sustrato al leer/escribir overrides de salud.
    #[error("[L3_MESH_FAULT]: HEALTH_PERSISTENCE -> {0}")]
    HealthPersistence(#[from] DbError),
}
