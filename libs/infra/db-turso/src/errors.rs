// [libs/infra/db-turso/src/errors.rs]
/*!
 * =================================================================
 * APARATO: DATABASE ERROR CATALOG (V4.1 - FLEET SOVEREIGN)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PANOPTICON COMPLIANCE: Formatea los mensajes con prefijos de
 *    estrato para su renderizado cromático en el Dashboard.
 * 2. STATE MACHINE AWARENESS: Distingue el conflicto de transición de
 *    nodo del simple "no encontrado" para que la capa HTTP mapee 409.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Error de enlace físico o de red con el sustrato de persistencia.
    #[error("[L3_DB_NET_FAULT]: DATABASE_UPLINK_SEVERED -> {0}")]
    ConnectionError(String),

    /// Fallo en la configuración del entorno (variables vacías o malformadas).
    #[error("[L3_DB_CONFIG_FAULT]: STRATEGIC_ENV_VOID -> {0}")]
    ConfigurationError(String),

    /// Error de sintaxis o ejecución devuelto por el motor libSQL.
    #[error("[L3_DB_QUERY_FAULT]: SQL_QUERY_REJECTED -> {0}")]
    QueryError(#[from] libsql::Error),

    /// Fallo en la transformación de tipos entre SQLite y el Dominio Rust.
    #[error("[L3_DB_MAPPING_FAULT]: DATA_MAPPING_VIOLATION -> {0}")]
    MappingError(String),

    /// Error al comprometer cambios en una secuencia multi-tabla.
    #[error("[L3_DB_FAULT]: TRANSACTION_COLLAPSE")]
    TransactionError,

    // --- ESTRATO DE FLOTA (L2/L3) ---

    /// El nodo solicitado no existe en el registro de la flota.
    #[error("[L3_FLEET_FAULT]: NODE_NOT_FOUND")]
    NodeNotFound,

    /// El par (estado, evento) no pertenece a la tabla de transiciones.
    #[error("[L3_FLEET_FAULT]: INVALID_STATE_TRANSITION {from} -> {to}")]
    InvalidNodeTransition { from: String, to: String },

    /// El bot solicitado no existe en el inventario.
    #[error("[L3_FLEET_FAULT]: BOT_NOT_FOUND")]
    BotNotFound,

    // --- ESTRATO DE CREDENCIALES ---

    /// El token one-shot no existe o ya fue consumido por otro ganador.
    #[error("[L3_CREDENTIAL_FAULT]: TOKEN_ALREADY_CONSUMED_OR_UNKNOWN")]
    TokenUnavailable,

    // --- ESTRATO CONTABLE ---

    /// El reference_id ya pertenece a una transacción cristalizada.
    #[error("[L3_LEDGER_FAULT]: REFERENCE_ID_ALREADY_SEALED")]
    DuplicateReference,

    /// El evento/snapshot/solicitud referenciada no existe.
    #[error("[L3_DB_FAULT]: RECORD_NOT_FOUND")]
    RecordNotFound,
}
