// [libs/infra/db-turso/src/repositories/webhook.rs]
/*!
 * =================================================================
 * APARATO: WEBHOOK LEDGER REPOSITORY (V4.1 - DEDUPE SHIELD)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: REGISTRO DE EVENTOS VISTOS Y PENALIZACIÓN
 *
 * La llave primaria (event_id, source) es el escudo de idempotencia
 * de los receptores de pagos; la tabla se acota con purga TTL.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::fmt_ts;
use crate::TursoClient;
use chrono::{Duration, Utc};
use libsql::params;
use tracing::instrument;

pub struct WebhookLedgerRepository {
    database_client: TursoClient,
}

impl WebhookLedgerRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Sella el par (event, source); re-sellar es un no-op.
    #[instrument(skip(self))]
    pub async fn mark_seen(&self, event_id: &str, source: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "INSERT OR IGNORE INTO webhook_seen (event_id, source, seen_at) VALUES (?1, ?2, ?3)",
                params![event_id, source, fmt_ts(Utc::now())],
            )
            .await?;
        Ok(())
    }

    pub async fn is_duplicate(&self, event_id: &str, source: &str) -> Result<bool, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT EXISTS(SELECT 1 FROM webhook_seen WHERE event_id = ?1 AND source = ?2)",
                params![event_id, source],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get::<i64>(0)? != 0),
            None => Ok(false),
        }
    }

    /// Purga entradas más viejas que el TTL (horas); TTL negativo vacía todo.
    pub async fn purge_expired(&self, ttl_hours: i64) -> Result<u64, DbError> {
        let threshold = fmt_ts(Utc::now() - Duration::hours(ttl_hours.max(-1)));
        let database_connection = self.database_client.get_connection()?;
        let purged = database_connection
            .execute("DELETE FROM webhook_seen WHERE seen_at < ?1", params![threshold])
            .await?;
        Ok(purged)
    }

    /**
     * Contador de penalización por remitente abusivo (firmas inválidas).
     * Retorna el conteo posterior al incremento.
     */
    pub async fn increment_penalty(&self, sender_key: &str, source: &str) -> Result<i64, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "INSERT INTO webhook_seen (event_id, source, seen_at, penalty_count) \
                 VALUES (?1, ?2, ?3, 1) \
                 ON CONFLICT(event_id, source) DO UPDATE SET penalty_count = penalty_count + 1 \
                 RETURNING penalty_count",
                params![sender_key, source, fmt_ts(Utc::now())],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get(0)?),
            None => Err(DbError::MappingError("PENALTY_RETURNING_VOID".into())),
        }
    }
}
