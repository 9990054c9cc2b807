// [libs/infra/db-turso/src/repositories/service_key.rs]
/*!
 * =================================================================
 * APARATO: SERVICE KEY REPOSITORY (V4.1 - HASH AT REST)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: RESOLUCIÓN DE LLAVES DE SERVICIO DE TENANTS
 *
 * Las llaves viven como SHA-256 en reposo; el gateway resuelve el
 * bearer hasheándolo y consultando por huella.
 * =================================================================
 */

use crate::errors::DbError;
use crate::TursoClient;
use libsql::params;
use tracing::instrument;
use uuid::Uuid;

/// Identidad resuelta de una llave de servicio válida.
#[derive(Debug, Clone)]
pub struct ServiceKeyIdentity {
    pub tenant_id: String,
    pub service_key_id: String,
}

pub struct ServiceKeyRepository {
    database_client: TursoClient,
}

impl ServiceKeyRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Resuelve la huella de una llave activa; None = 401 en el borde.
    #[instrument(skip(self, hashed_key))]
    pub async fn resolve(&self, hashed_key: &str) -> Result<Option<ServiceKeyIdentity>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT id, tenant_id FROM service_keys WHERE hashed_key = ?1 AND revoked_at IS NULL",
                params![hashed_key],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(Some(ServiceKeyIdentity {
                service_key_id: data_row.get(0)?,
                tenant_id: data_row.get(1)?,
            })),
            None => Ok(None),
        }
    }

    pub async fn issue(&self, tenant_id: &str, hashed_key: &str, label: &str) -> Result<String, DbError> {
        let key_id = Uuid::new_v4().to_string();
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "INSERT INTO service_keys (id, tenant_id, hashed_key, label) VALUES (?1, ?2, ?3, ?4)",
                params![key_id.clone(), tenant_id, hashed_key, label],
            )
            .await?;
        Ok(key_id)
    }

    pub async fn revoke(&self, key_id: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected = database_connection
            .execute(
                "UPDATE service_keys SET revoked_at = CURRENT_TIMESTAMP WHERE id = ?1 AND revoked_at IS NULL",
                params![key_id],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::RecordNotFound);
        }
        Ok(())
    }
}
