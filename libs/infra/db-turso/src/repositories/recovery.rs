// [libs/infra/db-turso/src/repositories/recovery.rs]
/*!
 * =================================================================
 * APARATO: RECOVERY REPOSITORY (V4.3 - SALVAGE LEDGER)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: EVENTOS DE RECUPERACIÓN Y SUS ITEMS (CASCADE)
 *
 * # Mathematical Proof (Count Conservation):
 * Los contadores del evento se recalculan siempre desde sus items
 * (COUNT por status), jamás por incrementos ciegos; la suma de los
 * tres estados reproduce tenants_total en todo cierre.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::{fmt_ts, parse_ts};
use crate::TursoClient;
use chrono::Utc;
use libsql::params;
use tracing::{info, instrument};
use uuid::Uuid;
use wopr_domain_models::{
    RecoveryEvent, RecoveryEventStatus, RecoveryItem, RecoveryItemStatus, RecoveryTrigger,
};

pub struct RecoveryRepository {
    database_client: TursoClient,
}

impl RecoveryRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Abre un evento nuevo en estado in_progress.
    #[instrument(skip(self))]
    pub async fn open_event(
        &self,
        node_id: &str,
        trigger: RecoveryTrigger,
        tenants_total: i64,
    ) -> Result<RecoveryEvent, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let event_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        database_connection
            .execute(
                "INSERT INTO recovery_events (id, node_id, trigger_kind, status, tenants_total, started_at) \
                 VALUES (?1, ?2, ?3, 'in_progress', ?4, ?5)",
                params![event_id.clone(), node_id, trigger.as_str(), tenants_total, fmt_ts(now)],
            )
            .await?;

        info!("🩺 [RECOVERY_OPEN]: Event [{}] for node [{}] ({} tenants).", event_id, node_id, tenants_total);

        Ok(RecoveryEvent {
            id: event_id,
            node_id: node_id.to_string(),
            trigger,
            status: RecoveryEventStatus::InProgress,
            tenants_total,
            tenants_recovered: 0,
            tenants_failed: 0,
            tenants_waiting: 0,
            started_at: now,
            completed_at: None,
            report_json: None,
        })
    }

    pub async fn append_item(&self, item: &RecoveryItem) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "INSERT INTO recovery_items \
                 (id, event_id, tenant_id, bot_id, source_node, target_node, backup_key, status, reason, started_at, completed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    item.id.clone(),
                    item.event_id.clone(),
                    item.tenant.clone(),
                    item.bot_id.clone(),
                    item.source_node.clone(),
                    item.target_node.clone(),
                    item.backup_key.clone(),
                    item.status.as_str(),
                    item.reason.clone(),
                    fmt_ts(item.started_at),
                    item.completed_at.map(fmt_ts)
                ],
            )
            .await?;
        Ok(())
    }

    /// Promoción de un item (waiting -> recovered/failed en reintentos).
    pub async fn update_item(
        &self,
        item_id: &str,
        status: RecoveryItemStatus,
        target_node: Option<&str>,
        backup_key: Option<&str>,
        reason: Option<&str>,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected = database_connection
            .execute(
                "UPDATE recovery_items SET status = ?1, target_node = ?2, backup_key = ?3, reason = ?4, completed_at = ?5 \
                 WHERE id = ?6",
                params![status.as_str(), target_node, backup_key, reason, fmt_ts(Utc::now()), item_id],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::RecordNotFound);
        }
        Ok(())
    }

    /**
     * Recalcula los contadores desde los items y sella el estado de
     * cierre (completed/partial) con la marca temporal.
     */
    #[instrument(skip(self))]
    pub async fn close_event(&self, event_id: &str) -> Result<RecoveryEvent, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let close_transaction = database_connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        let mut counters_query = close_transaction
            .query(
                "SELECT \
                    COALESCE(SUM(CASE WHEN status = 'recovered' THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(CASE WHEN status = 'waiting' THEN 1 ELSE 0 END), 0) \
                 FROM recovery_items WHERE event_id = ?1",
                params![event_id],
            )
            .await?;

        let counters_row = counters_query.next().await?.ok_or(DbError::RecordNotFound)?;
        let recovered: i64 = counters_row.get(0)?;
        let failed: i64 = counters_row.get(1)?;
        let waiting: i64 = counters_row.get(2)?;

        let closing_status = if failed == 0 && waiting == 0 {
            RecoveryEventStatus::Completed
        } else {
            RecoveryEventStatus::Partial
        };

        close_transaction
            .execute(
                "UPDATE recovery_events SET \
                    status = ?1, tenants_recovered = ?2, tenants_failed = ?3, tenants_waiting = ?4, completed_at = ?5 \
                 WHERE id = ?6",
                params![closing_status.as_str(), recovered, failed, waiting, fmt_ts(Utc::now()), event_id],
            )
            .await?;

        close_transaction.commit().await.map_err(|_| DbError::TransactionError)?;

        info!(
            "🩺 [RECOVERY_CLOSE]: Event [{}] sealed as {} (r={} f={} w={}).",
            event_id,
            closing_status.as_str(),
            recovered,
            failed,
            waiting
        );

        self.find_event(event_id).await?.ok_or(DbError::RecordNotFound)
    }

    pub async fn find_event(&self, event_id: &str) -> Result<Option<RecoveryEvent>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT id, node_id, trigger_kind, status, tenants_total, tenants_recovered, \
                        tenants_failed, tenants_waiting, started_at, completed_at, report_json \
                 FROM recovery_events WHERE id = ?1",
                params![event_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(Some(map_row_to_event(&data_row)?)),
            None => Ok(None),
        }
    }

    /// Items en espera de capacidad, orden de id estable.
    pub async fn waiting_items(&self, event_id: &str) -> Result<Vec<RecoveryItem>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT id, event_id, tenant_id, bot_id, source_node, target_node, backup_key, status, reason, started_at, completed_at \
                 FROM recovery_items WHERE event_id = ?1 AND status = 'waiting' ORDER BY id ASC",
                params![event_id],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            items.push(map_row_to_item(&data_row)?);
        }
        Ok(items)
    }

    pub async fn items_for_event(&self, event_id: &str) -> Result<Vec<RecoveryItem>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT id, event_id, tenant_id, bot_id, source_node, target_node, backup_key, status, reason, started_at, completed_at \
                 FROM recovery_items WHERE event_id = ?1 ORDER BY id ASC",
                params![event_id],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            items.push(map_row_to_item(&data_row)?);
        }
        Ok(items)
    }
}

fn map_row_to_event(data_row: &libsql::Row) -> Result<RecoveryEvent, DbError> {
    let trigger_raw: String = data_row.get(2)?;
    let status_raw: String = data_row.get(3)?;
    let started_raw: String = data_row.get(8)?;
    let completed_raw: Option<String> = data_row.get(9)?;
    let report_raw: Option<String> = data_row.get(10)?;

    Ok(RecoveryEvent {
        id: data_row.get(0)?,
        node_id: data_row.get(1)?,
        trigger: RecoveryTrigger::parse(&trigger_raw)
            .ok_or_else(|| DbError::MappingError(format!("UNKNOWN_TRIGGER: {}", trigger_raw)))?,
        status: RecoveryEventStatus::parse(&status_raw)
            .ok_or_else(|| DbError::MappingError(format!("UNKNOWN_EVENT_STATUS: {}", status_raw)))?,
        tenants_total: data_row.get(4)?,
        tenants_recovered: data_row.get(5)?,
        tenants_failed: data_row.get(6)?,
        tenants_waiting: data_row.get(7)?,
        started_at: parse_ts(&started_raw)?,
        completed_at: match completed_raw {
            Some(raw) => Some(parse_ts(&raw)?),
            None => None,
        },
        report_json: report_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
    })
}

fn map_row_to_item(data_row: &libsql::Row) -> Result<RecoveryItem, DbError> {
    let status_raw: String = data_row.get(7)?;
    let started_raw: String = data_row.get(9)?;
    let completed_raw: Option<String> = data_row.get(10)?;

    Ok(RecoveryItem {
        id: data_row.get(0)?,
        event_id: data_row.get(1)?,
        tenant: data_row.get(2)?,
        bot_id: data_row.get(3)?,
        source_node: data_row.get(4)?,
        target_node: data_row.get::<Option<String>>(5)?,
        backup_key: data_row.get::<Option<String>>(6)?,
        status: RecoveryItemStatus::parse(&status_raw)
            .ok_or_else(|| DbError::MappingError(format!("UNKNOWN_ITEM_STATUS: {}", status_raw)))?,
        reason: data_row.get::<Option<String>>(8)?,
        started_at: parse_ts(&started_raw)?,
        completed_at: match completed_raw {
            Some(raw) => Some(parse_ts(&raw)?),
            None => None,
        },
    })
}
