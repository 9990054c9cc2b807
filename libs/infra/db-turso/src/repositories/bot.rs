// [libs/infra/db-turso/src/repositories/bot.rs]
/*!
 * =================================================================
 * APARATO: BOT INSTANCE REPOSITORY (V4.3 - PLACEMENT LEDGER)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: INVENTARIO DE BOTS Y RASTRO DE RE-COLOCACIONES
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. OBSERVABLE REASSIGN: Toda re-colocación sella la tupla
 *    (from, to, at) del último cambio de nodo.
 * 2. STABLE ORDER: Los listados por nodo se emiten en orden de id
 *    estable para que recuperaciones y reintentos sean deterministas.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::{fmt_ts, parse_ts};
use crate::TursoClient;
use chrono::Utc;
use libsql::params;
use tracing::{info, instrument};
use wopr_domain_models::{BillingState, BotInstance, ReleaseChannel, UpdatePolicy};

pub struct BotInstanceRepository {
    database_client: TursoClient,
}

impl BotInstanceRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    #[instrument(skip(self, bot))]
    pub async fn create(&self, bot: &BotInstance) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "INSERT INTO bot_instances \
                 (id, tenant_id, name, node_id, billing_state, estimated_mb, stateful, \
                  image_reference, release_channel, update_policy, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    bot.id.clone(),
                    bot.tenant_id.clone(),
                    bot.name.clone(),
                    bot.node_id.clone(),
                    bot.billing_state.as_str(),
                    bot.estimated_mb,
                    bot.stateful as i64,
                    bot.image_reference.clone(),
                    bot.release_channel.as_str(),
                    bot.update_policy.as_str(),
                    fmt_ts(bot.created_at)
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn find(&self, bot_id: &str) -> Result<Option<BotInstance>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(&select_clause("WHERE id = ?1"), params![bot_id])
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(Some(map_row_to_bot(&data_row)?)),
            None => Ok(None),
        }
    }

    /// Bots colocados sobre un nodo, en orden de id estable.
    pub async fn list_on_node(&self, node_id: &str) -> Result<Vec<BotInstance>, DbError> {
        self.collect(&select_clause("WHERE node_id = ?1 ORDER BY id ASC"), params![node_id]).await
    }

    pub async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<BotInstance>, DbError> {
        self.collect(&select_clause("WHERE tenant_id = ?1 ORDER BY id ASC"), params![tenant_id]).await
    }

    /// Bots activos del tenant (insumo del cron de costos de runtime).
    pub async fn count_active_for_tenant(&self, tenant_id: &str) -> Result<i64, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT COUNT(*) FROM bot_instances WHERE tenant_id = ?1 AND billing_state = 'active'",
                params![tenant_id],
            )
            .await?;
        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get(0)?),
            None => Ok(0),
        }
    }

    /// Tenants con al menos un bot activo (barrido del cron diario).
    pub async fn tenants_with_active_bots(&self) -> Result<Vec<String>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT DISTINCT tenant_id FROM bot_instances WHERE billing_state = 'active' ORDER BY tenant_id ASC",
                (),
            )
            .await?;

        let mut tenants = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            tenants.push(data_row.get(0)?);
        }
        Ok(tenants)
    }

    /// Tenants con al menos un bot suspendido (barrido de reactivación).
    pub async fn tenants_with_suspended_bots(&self) -> Result<Vec<String>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT DISTINCT tenant_id FROM bot_instances WHERE billing_state = 'suspended' ORDER BY tenant_id ASC",
                (),
            )
            .await?;

        let mut tenants = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            tenants.push(data_row.get(0)?);
        }
        Ok(tenants)
    }

    pub async fn list_suspended_for_tenant(&self, tenant_id: &str) -> Result<Vec<BotInstance>, DbError> {
        self.collect(
            &select_clause("WHERE tenant_id = ?1 AND billing_state = 'suspended' ORDER BY id ASC"),
            params![tenant_id],
        )
        .await
    }

    /// Bots con canal de publicación sondeables (≠ pinned).
    pub async fn list_tracked(&self) -> Result<Vec<BotInstance>, DbError> {
        self.collect(
            &select_clause("WHERE release_channel != 'pinned' ORDER BY id ASC"),
            (),
        )
        .await
    }

    /**
     * Re-coloca el bot sobre otro nodo sellando la tupla observable
     * (from, to, at) del último cambio.
     */
    #[instrument(skip(self))]
    pub async fn reassign(&self, bot_id: &str, target_node_id: Option<&str>) -> Result<(), DbError> {
        let current = self.find(bot_id).await?.ok_or(DbError::BotNotFound)?;
        let database_connection = self.database_client.get_connection()?;
        let now = fmt_ts(Utc::now());

        database_connection
            .execute(
                "UPDATE bot_instances SET \
                    node_id = ?1, \
                    last_node_change_from = ?2, \
                    last_node_change_to = ?1, \
                    last_node_change_at = ?3, \
                    updated_at = ?3 \
                 WHERE id = ?4",
                params![target_node_id, current.node_id.clone(), now, bot_id],
            )
            .await?;

        info!(
            "📦 [PLACEMENT_LEDGER]: Bot [{}] reassigned {:?} -> {:?}.",
            bot_id, current.node_id, target_node_id
        );
        Ok(())
    }

    pub async fn set_billing_state(&self, bot_id: &str, state: BillingState) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        let now = fmt_ts(Utc::now());
        let suspended_at = match state {
            BillingState::Suspended => Some(now.clone()),
            BillingState::Active => None,
        };

        let affected = database_connection
            .execute(
                "UPDATE bot_instances SET billing_state = ?1, suspended_at = ?2, updated_at = ?3 WHERE id = ?4",
                params![state.as_str(), suspended_at, now, bot_id],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::BotNotFound);
        }
        Ok(())
    }

    /// Digest de imagen reportado por la última inspección del agente.
    pub async fn record_running_digest(&self, bot_id: &str, digest: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "UPDATE bot_instances SET running_digest = ?1, updated_at = ?2 WHERE id = ?3",
                params![digest, fmt_ts(Utc::now()), bot_id],
            )
            .await?;
        Ok(())
    }

    async fn collect(
        &self,
        sql: &str,
        query_params: impl libsql::params::IntoParams,
    ) -> Result<Vec<BotInstance>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection.query(sql, query_params).await?;

        let mut instances = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            instances.push(map_row_to_bot(&data_row)?);
        }
        Ok(instances)
    }
}

fn select_clause(suffix: &str) -> String {
    format!(
        "SELECT id, tenant_id, name, node_id, billing_state, estimated_mb, stateful, \
                image_reference, release_channel, update_policy, created_at, updated_at \
         FROM bot_instances {}",
        suffix
    )
}

fn map_row_to_bot(data_row: &libsql::Row) -> Result<BotInstance, DbError> {
    let billing_state_raw: String = data_row.get(4)?;
    let release_channel_raw: String = data_row.get(8)?;
    let update_policy_raw: String = data_row.get(9)?;
    let created_at_raw: String = data_row.get(10)?;
    let updated_at_raw: String = data_row.get(11)?;

    Ok(BotInstance {
        id: data_row.get(0)?,
        tenant_id: data_row.get(1)?,
        name: data_row.get(2)?,
        node_id: data_row.get::<Option<String>>(3)?,
        billing_state: BillingState::parse(&billing_state_raw)
            .ok_or_else(|| DbError::MappingError(format!("UNKNOWN_BILLING_STATE: {}", billing_state_raw)))?,
        estimated_mb: data_row.get(5)?,
        stateful: data_row.get::<i64>(6)? != 0,
        image_reference: data_row.get(7)?,
        release_channel: ReleaseChannel::parse(&release_channel_raw)
            .ok_or_else(|| DbError::MappingError(format!("UNKNOWN_CHANNEL: {}", release_channel_raw)))?,
        update_policy: UpdatePolicy::parse(&update_policy_raw)
            .ok_or_else(|| DbError::MappingError(format!("UNKNOWN_POLICY: {}", update_policy_raw)))?,
        created_at: parse_ts(&created_at_raw)?,
        updated_at: parse_ts(&updated_at_raw)?,
    })
}
