// [libs/infra/db-turso/src/repositories/addon.rs]
/*!
 * =================================================================
 * APARATO: ADDON REPOSITORY (V4.0 - DAILY COST FEED)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: ADD-ONS FACTURABLES POR TENANT
 * =================================================================
 */

use crate::errors::DbError;
use crate::TursoClient;
use libsql::params;
use wopr_core_credit::Credit;

pub struct AddonRepository {
    database_client: TursoClient,
}

impl AddonRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    pub async fn enable(&self, tenant_id: &str, addon: &str, daily_cost: Credit) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "INSERT INTO tenant_addons (tenant_id, addon, daily_cost_raw, enabled) VALUES (?1, ?2, ?3, 1) \
                 ON CONFLICT(tenant_id, addon) DO UPDATE SET daily_cost_raw = excluded.daily_cost_raw, enabled = 1",
                params![tenant_id, addon, daily_cost.raw()],
            )
            .await?;
        Ok(())
    }

    pub async fn disable(&self, tenant_id: &str, addon: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "UPDATE tenant_addons SET enabled = 0 WHERE tenant_id = ?1 AND addon = ?2",
                params![tenant_id, addon],
            )
            .await?;
        Ok(())
    }

    /// Σ costo diario de los add-ons habilitados del tenant.
    pub async fn daily_cost_for(&self, tenant_id: &str) -> Result<Credit, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT COALESCE(SUM(daily_cost_raw), 0) FROM tenant_addons \
                 WHERE tenant_id = ?1 AND enabled = 1",
                params![tenant_id],
            )
            .await?;

        let total_raw: i64 = match query_results.next().await? {
            Some(data_row) => data_row.get(0)?,
            None => 0,
        };
        Credit::from_raw(total_raw).map_err(|fault| DbError::MappingError(fault.to_string()))
    }
}
