// [libs/infra/db-turso/src/repositories/deletion.rs]
/*!
 * =================================================================
 * APARATO: DELETION REQUEST REPOSITORY (V4.1 - GRACE KEEPER)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: SOLICITUDES DE BORRADO CON GRACIA DE 30 DÍAS
 *
 * 'cancel' y 'mark_completed' condicionan sobre status = 'pending':
 * fuera de pending son no-ops observables (affected == 0).
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::{fmt_ts, parse_ts};
use crate::TursoClient;
use chrono::Utc;
use libsql::params;
use tracing::{info, instrument};
use uuid::Uuid;
use wopr_domain_models::{DeletionRequest, DeletionStatus};

pub struct DeletionRepository {
    database_client: TursoClient,
}

impl DeletionRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Abre una solicitud pending con gracia de 30 días.
    #[instrument(skip(self))]
    pub async fn create(&self, tenant_id: &str, user_id: &str) -> Result<DeletionRequest, DbError> {
        let now = Utc::now();
        let request = DeletionRequest {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            status: DeletionStatus::Pending,
            delete_after: DeletionRequest::grace_deadline_from(now),
            cancel_reason: None,
            completion_summary: None,
            created_at: now,
        };

        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "INSERT INTO deletion_requests (id, tenant_id, user_id, status, delete_after, created_at) \
                 VALUES (?1, ?2, ?3, 'pending', ?4, ?5)",
                params![
                    request.id.clone(),
                    tenant_id,
                    user_id,
                    fmt_ts(request.delete_after),
                    fmt_ts(now)
                ],
            )
            .await?;

        info!("🗑️ [DELETION_OPEN]: Tenant [{}] scheduled for hard delete after grace.", tenant_id);
        Ok(request)
    }

    /// Cancela si (y solo si) la solicitud sigue pending. Retorna si mutó.
    pub async fn cancel(&self, request_id: &str, reason: &str) -> Result<bool, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected = database_connection
            .execute(
                "UPDATE deletion_requests SET status = 'cancelled', cancel_reason = ?1 \
                 WHERE id = ?2 AND status = 'pending'",
                params![reason, request_id],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Sella la solicitud como completed con el resumen del borrado.
    pub async fn mark_completed(&self, request_id: &str, summary: &serde_json::Value) -> Result<bool, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected = database_connection
            .execute(
                "UPDATE deletion_requests SET status = 'completed', completion_summary_json = ?1 \
                 WHERE id = ?2 AND status = 'pending'",
                params![summary.to_string(), request_id],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Solicitudes pending cuya gracia expiró (insumo del cron).
    pub async fn find_expired(&self) -> Result<Vec<DeletionRequest>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT id, tenant_id, user_id, status, delete_after, cancel_reason, completion_summary_json, created_at \
                 FROM deletion_requests WHERE status = 'pending' AND delete_after < ?1 ORDER BY id ASC",
                params![fmt_ts(Utc::now())],
            )
            .await?;

        let mut requests = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            requests.push(map_row_to_request(&data_row)?);
        }
        Ok(requests)
    }

    /// Rastro de reintentos fallidos del ejecutor externo.
    pub async fn increment_failed(&self, request_id: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "UPDATE deletion_requests SET failed_attempts = failed_attempts + 1 WHERE id = ?1",
                params![request_id],
            )
            .await?;
        Ok(())
    }

    pub async fn find(&self, request_id: &str) -> Result<Option<DeletionRequest>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT id, tenant_id, user_id, status, delete_after, cancel_reason, completion_summary_json, created_at \
                 FROM deletion_requests WHERE id = ?1",
                params![request_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(Some(map_row_to_request(&data_row)?)),
            None => Ok(None),
        }
    }
}

fn map_row_to_request(data_row: &libsql::Row) -> Result<DeletionRequest, DbError> {
    let status_raw: String = data_row.get(3)?;
    let delete_after_raw: String = data_row.get(4)?;
    let summary_raw: Option<String> = data_row.get(6)?;
    let created_at_raw: String = data_row.get(7)?;

    Ok(DeletionRequest {
        id: data_row.get(0)?,
        tenant_id: data_row.get(1)?,
        user_id: data_row.get(2)?,
        status: DeletionStatus::parse(&status_raw)
            .ok_or_else(|| DbError::MappingError(format!("UNKNOWN_DELETION_STATUS: {}", status_raw)))?,
        delete_after: parse_ts(&delete_after_raw)?,
        cancel_reason: data_row.get::<Option<String>>(5)?,
        completion_summary: summary_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at: parse_ts(&created_at_raw)?,
    })
}
