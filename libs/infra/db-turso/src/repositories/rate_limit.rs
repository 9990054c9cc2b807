// [libs/infra/db-turso/src/repositories/rate_limit.rs]
/*!
 * =================================================================
 * APARATO: RATE LIMIT REPOSITORY (V4.2 - WINDOW COUNTERS)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CONTADORES POR VENTANA QUE SOBREVIVEN REINICIOS
 *
 * # Mathematical Proof (Post-Increment Authority):
 * El upsert con RETURNING entrega el conteo POSTERIOR al incremento
 * en la misma sentencia; la decisión pasa/excede es atómica y no
 * sufre carreras de lectura-luego-escritura.
 * =================================================================
 */

use crate::errors::DbError;
use crate::TursoClient;
use libsql::params;
use tracing::instrument;

pub struct RateLimitRepository {
    database_client: TursoClient,
}

impl RateLimitRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Incrementa el contador de la ventana y retorna el valor posterior.
     *
     * @param scope Ámbito del contador ("gateway:llm").
     * @param counter_key Identificador del tenant.
     * @param window_start Inicio de la ventana en epoch-segundos.
     */
    #[instrument(skip(self))]
    pub async fn increment_and_get(
        &self,
        scope: &str,
        counter_key: &str,
        window_start: i64,
    ) -> Result<i64, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "INSERT INTO rate_limit_counters (scope, counter_key, window_start, count) \
                 VALUES (?1, ?2, ?3, 1) \
                 ON CONFLICT(scope, counter_key, window_start) DO UPDATE SET count = count + 1 \
                 RETURNING count",
                params![scope, counter_key, window_start],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get(0)?),
            None => Err(DbError::MappingError("RATE_COUNTER_RETURNING_VOID".into())),
        }
    }

    /// Conteo actual de la ventana sin incrementar (sondas y cabeceras).
    pub async fn peek(&self, scope: &str, counter_key: &str, window_start: i64) -> Result<i64, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT count FROM rate_limit_counters \
                 WHERE scope = ?1 AND counter_key = ?2 AND window_start = ?3",
                params![scope, counter_key, window_start],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get(0)?),
            None => Ok(0),
        }
    }

    /// Purga ventanas anteriores al umbral (higiene periódica).
    pub async fn purge_windows_before(&self, window_start: i64) -> Result<u64, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let purged = database_connection
            .execute(
                "DELETE FROM rate_limit_counters WHERE window_start < ?1",
                params![window_start],
            )
            .await?;
        Ok(purged)
    }
}
