// [libs/infra/db-turso/src/repositories/breaker.rs]
/*!
 * =================================================================
 * APARATO: CIRCUIT BREAKER REPOSITORY (V4.2 - INSTANCE SHIELD)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: ESTADO PERSISTIDO DE BREAKERS POR INSTANCIA
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::{fmt_ts, parse_ts};
use crate::TursoClient;
use chrono::{DateTime, Utc};
use libsql::params;
use tracing::{instrument, warn};

/// Fotografía del estado del breaker de una instancia.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub instance_id: String,
    pub error_count: i64,
    pub window_start: i64,
    pub tripped_at: Option<DateTime<Utc>>,
}

pub struct CircuitBreakerRepository {
    database_client: TursoClient,
}

impl CircuitBreakerRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    pub async fn load(&self, instance_id: &str) -> Result<Option<BreakerSnapshot>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT instance_id, error_count, window_start, tripped_at \
                 FROM circuit_breaker_states WHERE instance_id = ?1",
                params![instance_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => {
                let tripped_raw: Option<String> = data_row.get(3)?;
                Ok(Some(BreakerSnapshot {
                    instance_id: data_row.get(0)?,
                    error_count: data_row.get(1)?,
                    window_start: data_row.get(2)?,
                    tripped_at: match tripped_raw {
                        Some(raw) => Some(parse_ts(&raw)?),
                        None => None,
                    },
                }))
            }
            None => Ok(None),
        }
    }

    /**
     * Registra un error dentro de la ventana dada y retorna el conteo
     * posterior. Una ventana nueva reinicia el contador a 1.
     */
    #[instrument(skip(self))]
    pub async fn record_error(&self, instance_id: &str, window_start: i64) -> Result<i64, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "INSERT INTO circuit_breaker_states (instance_id, error_count, window_start) \
                 VALUES (?1, 1, ?2) \
                 ON CONFLICT(instance_id) DO UPDATE SET \
                    error_count = CASE WHEN window_start = excluded.window_start \
                                       THEN error_count + 1 ELSE 1 END, \
                    window_start = excluded.window_start \
                 RETURNING error_count",
                params![instance_id, window_start],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get(0)?),
            None => Err(DbError::MappingError("BREAKER_RETURNING_VOID".into())),
        }
    }

    /// Dispara el breaker sellando el instante del trip.
    pub async fn trip(&self, instance_id: &str, tripped_at: DateTime<Utc>) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "UPDATE circuit_breaker_states SET tripped_at = ?1 WHERE instance_id = ?2",
                params![fmt_ts(tripped_at), instance_id],
            )
            .await?;
        warn!("⚡ [BREAKER_TRIPPED]: Instance [{}] circuit opened.", instance_id);
        Ok(())
    }

    /// Reinicio total del estado tras expirar la cuarentena.
    pub async fn reset(&self, instance_id: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "UPDATE circuit_breaker_states SET error_count = 0, tripped_at = NULL WHERE instance_id = ?1",
                params![instance_id],
            )
            .await?;
        Ok(())
    }
}
