// [libs/infra/db-turso/src/repositories/provider_health.rs]
/*!
 * =================================================================
 * APARATO: PROVIDER HEALTH REPOSITORY (V4.1 - TTL OVERRIDES)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: OVERRIDES TEMPORALES DE SALUD DE PROVEEDORES
 *
 * Los overrides expiran solos (TTL); el auto-sanado no requiere
 * intervención del operador.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::fmt_ts;
use crate::TursoClient;
use chrono::{Duration, Utc};
use libsql::params;
use std::collections::HashMap;
use tracing::instrument;

pub struct ProviderHealthRepository {
    database_client: TursoClient,
}

impl ProviderHealthRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Marca un proveedor (in)sano durante el TTL dado.
    #[instrument(skip(self))]
    pub async fn store_override(
        &self,
        provider: &str,
        healthy: bool,
        ttl_seconds: i64,
        reason: &str,
    ) -> Result<(), DbError> {
        let expires_at = fmt_ts(Utc::now() + Duration::seconds(ttl_seconds));
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "INSERT INTO provider_health_overrides (provider, healthy, expires_at, noted_reason, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(provider) DO UPDATE SET \
                    healthy = excluded.healthy, \
                    expires_at = excluded.expires_at, \
                    noted_reason = excluded.noted_reason, \
                    updated_at = excluded.updated_at",
                params![provider, healthy as i64, expires_at, reason, fmt_ts(Utc::now())],
            )
            .await?;
        Ok(())
    }

    /// Overrides vigentes (no expirados): provider -> healthy.
    pub async fn live_overrides(&self) -> Result<HashMap<String, bool>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT provider, healthy FROM provider_health_overrides WHERE expires_at > ?1",
                params![fmt_ts(Utc::now())],
            )
            .await?;

        let mut overrides = HashMap::new();
        while let Some(data_row) = query_results.next().await? {
            let provider: String = data_row.get(0)?;
            let healthy: i64 = data_row.get(1)?;
            overrides.insert(provider, healthy != 0);
        }
        Ok(overrides)
    }
}
