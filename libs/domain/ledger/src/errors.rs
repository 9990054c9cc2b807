// [libs/domain/ledger/src/errors.rs]
/*!
 * =================================================================
 * APARATO: LEDGER ERROR CATALOG (V4.1 - FINANCIAL FAULTS)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: TAXONOMÍA DE FALLOS DEL DOMINIO FINANCIERO
 * =================================================================
 */

use thiserror::Error;
use wopr_core_credit::{Credit, CreditError};
use wopr_infra_db::DbError;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// El débito excede el balance disponible del tenant.
    #[error("[L2_LEDGER_FAULT]: INSUFFICIENT_BALANCE balance={balance} required={required}")]
    InsufficientBalance { balance: Credit, required: Credit },

    /// Los montos de crédito/débito deben ser no-negativos.
    #[error("[L2_LEDGER_FAULT]: NEGATIVE_AMOUNT_REJECTED")]
    NegativeAmount,

    /// Desbordamiento aritmético del motor monetario.
    #[error("[L2_LEDGER_FAULT]: CREDIT_ARITHMETIC -> {0}")]
    Arithmetic(#[from] CreditError),

    /// Fallo del sustrato de persistencia.
    #[error("[L2_LEDGER_FAULT]: PERSISTENCE -> {0}")]
    Persistence(#[from] DbError),
}
