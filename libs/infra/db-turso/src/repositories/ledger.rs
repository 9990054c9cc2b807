// [libs/infra/db-turso/src/repositories/ledger.rs]
/*!
 * =================================================================
 * APARATO: LEDGER REPOSITORY (V4.3 - APPEND ONLY GUARD)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DE TRANSACCIONES DE DOBLE ENTRADA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. RESILIENCE FIRST: La unicidad de 'reference_id' vive en el índice
 *    UNIQUE del sustrato; la carrera entre réplicas la decide SQLite.
 * 2. APPEND-ONLY: No existe UPDATE ni DELETE en este aparato. Las
 *    correcciones son transacciones nuevas de tipo 'correction'.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 *
 * # Mathematical Proof (Idempotent Replay):
 * El par (INSERT + UNIQUE reference_id) convierte todo replay en un
 * conflicto detectable; el dominio responde retornando la transacción
 * original, dejando Σ delta invariante.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::{fmt_ts, parse_ts};
use crate::TursoClient;
use chrono::Utc;
use libsql::params;
use tracing::{debug, instrument};
use wopr_core_credit::Credit;
use wopr_domain_models::{LedgerTransaction, TransactionType};

/// Filtro de consulta del historial (más reciente primero).
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub transaction_type: Option<TransactionType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub struct LedgerRepository {
    database_client: TursoClient,
}

impl LedgerRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Cristaliza una transacción nueva en el Ledger.
     *
     * # Errors:
     * - `DuplicateReference` si el reference_id ya está sellado.
     * - `QueryError` ante cualquier otro rechazo del motor.
     */
    #[instrument(skip(self, transaction))]
    pub async fn append_transaction(&self, transaction: &LedgerTransaction) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;

        let insertion_result = database_connection
            .execute(
                "INSERT INTO ledger_transactions \
                 (id, tenant_id, delta_raw, transaction_type, description, reference_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    transaction.id.clone(),
                    transaction.tenant_id.clone(),
                    transaction.delta.raw(),
                    transaction.transaction_type.as_str(),
                    transaction.description.clone(),
                    transaction.reference_id.clone(),
                    fmt_ts(transaction.created_at)
                ],
            )
            .await;

        match insertion_result {
            Ok(_) => {
                debug!("💳 [LEDGER_SEAL]: Transaction {} crystallized.", transaction.id);
                Ok(())
            }
            Err(fault) => {
                // La violación del índice UNIQUE es la señal de replay.
                if fault.to_string().to_lowercase().contains("unique") {
                    Err(DbError::DuplicateReference)
                } else {
                    Err(DbError::QueryError(fault))
                }
            }
        }
    }

    /// Localiza la transacción sellada con un reference_id dado.
    pub async fn find_by_reference(&self, reference_id: &str) -> Result<Option<LedgerTransaction>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT id, tenant_id, delta_raw, transaction_type, description, reference_id, created_at \
                 FROM ledger_transactions WHERE reference_id = ?1",
                params![reference_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(Some(map_row_to_transaction(&data_row)?)),
            None => Ok(None),
        }
    }

    /// Σ delta del tenant: la única fuente de verdad del balance.
    #[instrument(skip(self))]
    pub async fn sum_deltas(&self, tenant_id: &str) -> Result<Credit, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT COALESCE(SUM(delta_raw), 0) FROM ledger_transactions WHERE tenant_id = ?1",
                params![tenant_id],
            )
            .await?;

        let balance_raw: i64 = match query_results.next().await? {
            Some(data_row) => data_row.get::<i64>(0)?,
            None => 0,
        };

        Credit::from_raw(balance_raw)
            .map_err(|fault| DbError::MappingError(format!("BALANCE_OVERFLOW: {}", fault)))
    }

    /// Historial del tenant, más reciente primero.
    pub async fn history(&self, tenant_id: &str, filter: &HistoryFilter) -> Result<Vec<LedgerTransaction>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let limit = filter.limit.unwrap_or(100).clamp(1, 1000);
        let offset = filter.offset.unwrap_or(0).max(0);

        let mut query_results = match filter.transaction_type {
            Some(type_filter) => {
                database_connection
                    .query(
                        "SELECT id, tenant_id, delta_raw, transaction_type, description, reference_id, created_at \
                         FROM ledger_transactions WHERE tenant_id = ?1 AND transaction_type = ?2 \
                         ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4",
                        params![tenant_id, type_filter.as_str(), limit, offset],
                    )
                    .await?
            }
            None => {
                database_connection
                    .query(
                        "SELECT id, tenant_id, delta_raw, transaction_type, description, reference_id, created_at \
                         FROM ledger_transactions WHERE tenant_id = ?1 \
                         ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
                        params![tenant_id, limit, offset],
                    )
                    .await?
            }
        };

        let mut transactions = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            transactions.push(map_row_to_transaction(&data_row)?);
        }
        Ok(transactions)
    }

    /// Sonda rápida de idempotencia para receptores de webhooks.
    pub async fn has_reference_id(&self, reference_id: &str) -> Result<bool, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT EXISTS(SELECT 1 FROM ledger_transactions WHERE reference_id = ?1)",
                params![reference_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get::<i64>(0)? != 0),
            None => Ok(false),
        }
    }
}

fn map_row_to_transaction(data_row: &libsql::Row) -> Result<LedgerTransaction, DbError> {
    let transaction_type_raw: String = data_row.get(3)?;
    let created_at_raw: String = data_row.get(6)?;

    Ok(LedgerTransaction {
        id: data_row.get(0)?,
        tenant_id: data_row.get(1)?,
        delta: Credit::from_raw(data_row.get::<i64>(2)?)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?,
        transaction_type: TransactionType::parse(&transaction_type_raw)
            .ok_or_else(|| DbError::MappingError(format!("UNKNOWN_TX_TYPE: {}", transaction_type_raw)))?,
        description: data_row.get(4)?,
        reference_id: data_row.get::<Option<String>>(5)?,
        created_at: parse_ts(&created_at_raw)?,
    })
}

/// Forja auxiliar para los dominios que construyen transacciones.
#[must_use]
pub fn forge_transaction(
    tenant_id: &str,
    delta: Credit,
    transaction_type: TransactionType,
    description: &str,
    reference_id: Option<String>,
) -> LedgerTransaction {
    LedgerTransaction {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        delta,
        transaction_type,
        description: description.to_string(),
        reference_id,
        created_at: Utc::now(),
    }
}
