// [libs/infra/db-turso/src/repositories/snapshot.rs]
/*!
 * =================================================================
 * APARATO: SNAPSHOT REPOSITORY (V4.1 - TAR METADATA VAULT)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: METADATOS DE SNAPSHOTS; EL TAR VIVE EN DISCO
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::{fmt_ts, parse_ts};
use crate::TursoClient;
use libsql::params;
use tracing::instrument;
use wopr_domain_models::{SnapshotRecord, SnapshotTrigger};

pub struct SnapshotRepository {
    database_client: TursoClient,
}

impl SnapshotRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    #[instrument(skip(self, record))]
    pub async fn insert(&self, record: &SnapshotRecord) -> Result<(), DbError> {
        let plugins_json = serde_json::to_string(&record.plugins)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;

        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "INSERT INTO snapshot_records \
                 (id, instance_id, user_id, created_at, size_mb, trigger_kind, plugins_json, config_hash, storage_path) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id.clone(),
                    record.instance_id.clone(),
                    record.user_id.clone(),
                    fmt_ts(record.created_at),
                    record.size_mb,
                    record.trigger.as_str(),
                    plugins_json,
                    record.config_hash.clone(),
                    record.storage_path.clone()
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn find(&self, snapshot_id: &str) -> Result<Option<SnapshotRecord>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(&select_clause("WHERE id = ?1"), params![snapshot_id])
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(Some(map_row_to_snapshot(&data_row)?)),
            None => Ok(None),
        }
    }

    pub async fn list(&self, instance_id: &str) -> Result<Vec<SnapshotRecord>, DbError> {
        self.collect(
            &select_clause("WHERE instance_id = ?1 ORDER BY created_at DESC"),
            params![instance_id],
        )
        .await
    }

    pub async fn delete(&self, snapshot_id: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected = database_connection
            .execute("DELETE FROM snapshot_records WHERE id = ?1", params![snapshot_id])
            .await?;
        if affected == 0 {
            return Err(DbError::RecordNotFound);
        }
        Ok(())
    }

    pub async fn count(&self, instance_id: &str) -> Result<i64, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT COUNT(*) FROM snapshot_records WHERE instance_id = ?1",
                params![instance_id],
            )
            .await?;
        match query_results.next().await? {
            Some(data_row) => Ok(data_row.get(0)?),
            None => Ok(0),
        }
    }

    /// Los N snapshots más antiguos (insumo de la rotación de retención).
    pub async fn oldest(&self, instance_id: &str, n: i64) -> Result<Vec<SnapshotRecord>, DbError> {
        self.collect(
            &select_clause("WHERE instance_id = ?1 ORDER BY created_at ASC LIMIT ?2"),
            params![instance_id, n],
        )
        .await
    }

    async fn collect(
        &self,
        sql: &str,
        query_params: impl libsql::params::IntoParams,
    ) -> Result<Vec<SnapshotRecord>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection.query(sql, query_params).await?;

        let mut records = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            records.push(map_row_to_snapshot(&data_row)?);
        }
        Ok(records)
    }
}

fn select_clause(suffix: &str) -> String {
    format!(
        "SELECT id, instance_id, user_id, created_at, size_mb, trigger_kind, plugins_json, config_hash, storage_path \
         FROM snapshot_records {}",
        suffix
    )
}

fn map_row_to_snapshot(data_row: &libsql::Row) -> Result<SnapshotRecord, DbError> {
    let created_at_raw: String = data_row.get(3)?;
    let trigger_raw: String = data_row.get(5)?;
    let plugins_raw: String = data_row.get(6)?;

    Ok(SnapshotRecord {
        id: data_row.get(0)?,
        instance_id: data_row.get(1)?,
        user_id: data_row.get(2)?,
        created_at: parse_ts(&created_at_raw)?,
        size_mb: data_row.get(4)?,
        trigger: SnapshotTrigger::parse(&trigger_raw)
            .ok_or_else(|| DbError::MappingError(format!("UNKNOWN_TRIGGER: {}", trigger_raw)))?,
        plugins: serde_json::from_str(&plugins_raw).unwrap_or_default(),
        config_hash: data_row.get(7)?,
        storage_path: data_row.get(8)?,
    })
}
