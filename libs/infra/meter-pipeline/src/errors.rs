// [libs/infra/meter-pipeline/src/errors.rs]
/*!
 * =================================================================
 * APARATO: METER PIPELINE ERROR CATALOG (V4.0)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: TAXONOMÍA DE FALLOS DEL PIPELINE CONTABLE
 * =================================================================
 */

use thiserror::Error;
use wopr_infra_db::DbError;

#[derive(Error, Debug)]
pub enum MeterPipelineError {
    /// Fallo del sistema de ficheros sobre el WAL o la DLQ.
    #[error("[L3_METER_FAULT]: JOURNAL_IO -> {0}")]
    JournalIo(#[from] std::io::Error),

    /// Línea JSONL corrupta en el WAL (se descarta con warn).
    #[error("[L3_METER_FAULT]: JOURNAL_LINE_CORRUPT -> {0}")]
    JournalCorrupt(#[from] serde_json::Error),

    /// Rechazo del sustrato durante la inserción por lotes.
    #[error("[L3_METER_FAULT]: BATCH_PERSISTENCE -> {0}")]
    Persistence(#[from] DbError),
}
