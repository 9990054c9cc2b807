// [libs/infra/db-turso/src/repositories/node.rs]
/*!
 * =================================================================
 * APARATO: NODE REPOSITORY (V4.4 - STATE MACHINE GUARD)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: REGISTRO DE NODOS Y TRANSICIONES AUDITADAS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. TRANSACTIONAL TRANSITIONS: El cambio de estado y su fila de
 *    auditoría se sellan en la misma transacción; no existe estado
 *    sin rastro.
 * 2. TABLE SOVEREIGNTY: La legalidad del par (from, to) la decide la
 *    tabla cerrada del dominio, jamás el SQL.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::{fmt_ts, parse_ts};
use crate::TursoClient;
use chrono::{DateTime, Duration, Utc};
use libsql::params;
use tracing::{info, instrument, warn};
use wopr_domain_models::node::{next_status, NodeLifecycleEvent};
use wopr_domain_models::{NodeRecord, NodeStatus};

pub struct NodeRepository {
    database_client: TursoClient,
}

impl NodeRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Registra (o refresca) un nodo tras un handshake exitoso.
     *
     * # Logic:
     * Siempre actualiza latido, versión del agente y capacidad. El
     * estado salta a 'active' salvo que el nodo esté en un estado que
     * veta el re-registro (la capa HTTP responde 409 antes de llegar
     * aquí).
     */
    #[instrument(skip(self))]
    pub async fn register_or_refresh(
        &self,
        node_id: &str,
        host: &str,
        capacity_mb: i64,
        agent_version: &str,
    ) -> Result<NodeRecord, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let now = fmt_ts(Utc::now());

        database_connection
            .execute(
                "INSERT INTO nodes (id, host, status, capacity_mb, used_mb, agent_version, last_heartbeat_at, registered_at, updated_at) \
                 VALUES (?1, ?2, 'active', ?3, 0, ?4, ?5, ?5, ?5) \
                 ON CONFLICT(id) DO UPDATE SET \
                    host = excluded.host, \
                    status = 'active', \
                    capacity_mb = excluded.capacity_mb, \
                    agent_version = excluded.agent_version, \
                    last_heartbeat_at = excluded.last_heartbeat_at, \
                    updated_at = excluded.updated_at",
                params![node_id, host, capacity_mb, agent_version, now],
            )
            .await?;

        info!("🛰️ [FLEET_REGISTER]: Node [{}] active with {} MB.", node_id, capacity_mb);
        self.find(node_id).await?.ok_or(DbError::NodeNotFound)
    }

    pub async fn find(&self, node_id: &str) -> Result<Option<NodeRecord>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT id, host, status, capacity_mb, used_mb, agent_version, last_heartbeat_at, registered_at, updated_at \
                 FROM nodes WHERE id = ?1",
                params![node_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(Some(map_row_to_node(&data_row)?)),
            None => Ok(None),
        }
    }

    pub async fn list(&self) -> Result<Vec<NodeRecord>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT id, host, status, capacity_mb, used_mb, agent_version, last_heartbeat_at, registered_at, updated_at \
                 FROM nodes ORDER BY id ASC",
                (),
            )
            .await?;

        let mut nodes = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            nodes.push(map_row_to_node(&data_row)?);
        }
        Ok(nodes)
    }

    /// Nodos elegibles para colocación (status = active), orden alfabético.
    pub async fn list_active(&self) -> Result<Vec<NodeRecord>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT id, host, status, capacity_mb, used_mb, agent_version, last_heartbeat_at, registered_at, updated_at \
                 FROM nodes WHERE status = 'active' ORDER BY id ASC",
                (),
            )
            .await?;

        let mut nodes = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            nodes.push(map_row_to_node(&data_row)?);
        }
        Ok(nodes)
    }

    /**
     * Transición de la máquina de estados con auditoría atómica.
     *
     * # Errors:
     * - `NodeNotFound` si el nodo no existe.
     * - `InvalidNodeTransition` si el par no pertenece a la tabla.
     */
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        node_id: &str,
        event: NodeLifecycleEvent,
        reason: &str,
        actor: &str,
    ) -> Result<NodeStatus, DbError> {
        let current = self.find(node_id).await?.ok_or(DbError::NodeNotFound)?;

        let destination = next_status(current.status, event).ok_or_else(|| {
            warn!(
                "⛔ [FLEET_TRANSITION_VETO]: Node [{}] {} --{}--> rejected.",
                node_id,
                current.status.as_str(),
                event.as_str()
            );
            DbError::InvalidNodeTransition {
                from: current.status.as_str().to_string(),
                to: event.as_str().to_string(),
            }
        })?;

        let database_connection = self.database_client.get_connection()?;
        let state_transaction = database_connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        let now = fmt_ts(Utc::now());

        state_transaction
            .execute(
                "UPDATE nodes SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![destination.as_str(), now.clone(), node_id],
            )
            .await?;

        state_transaction
            .execute(
                "INSERT INTO node_transitions (node_id, from_status, to_status, reason, actor, occurred_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![node_id, current.status.as_str(), destination.as_str(), reason, actor, now],
            )
            .await?;

        state_transaction.commit().await.map_err(|_| DbError::TransactionError)?;

        info!(
            "🔀 [FLEET_TRANSITION]: Node [{}] {} -> {} ({})",
            node_id,
            current.status.as_str(),
            destination.as_str(),
            reason
        );
        Ok(destination)
    }

    /// Latido entrante: biometría de colocación y sello temporal.
    pub async fn record_heartbeat(&self, node_id: &str, used_mb: i64, agent_version: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected = database_connection
            .execute(
                "UPDATE nodes SET used_mb = ?1, agent_version = ?2, last_heartbeat_at = ?3, updated_at = ?3 \
                 WHERE id = ?4",
                params![used_mb, agent_version, fmt_ts(Utc::now()), node_id],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::NodeNotFound);
        }
        Ok(())
    }

    /// Nodos en un estado dado cuyo último latido es anterior al umbral.
    pub async fn stale_nodes(
        &self,
        status: NodeStatus,
        older_than: Duration,
    ) -> Result<Vec<NodeRecord>, DbError> {
        let threshold = fmt_ts(Utc::now() - older_than);
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT id, host, status, capacity_mb, used_mb, agent_version, last_heartbeat_at, registered_at, updated_at \
                 FROM nodes \
                 WHERE status = ?1 AND (last_heartbeat_at IS NULL OR last_heartbeat_at < ?2) \
                 ORDER BY id ASC",
                params![status.as_str(), threshold],
            )
            .await?;

        let mut nodes = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            nodes.push(map_row_to_node(&data_row)?);
        }
        Ok(nodes)
    }
}

fn map_row_to_node(data_row: &libsql::Row) -> Result<NodeRecord, DbError> {
    let status_raw: String = data_row.get(2)?;
    let last_heartbeat_raw: Option<String> = data_row.get(6)?;
    let registered_at_raw: String = data_row.get(7)?;
    let updated_at_raw: String = data_row.get(8)?;

    Ok(NodeRecord {
        id: data_row.get(0)?,
        host: data_row.get(1)?,
        status: NodeStatus::parse(&status_raw)
            .ok_or_else(|| DbError::MappingError(format!("UNKNOWN_NODE_STATUS: {}", status_raw)))?,
        capacity_mb: data_row.get(3)?,
        used_mb: data_row.get(4)?,
        agent_version: data_row.get(5)?,
        last_heartbeat_at: match last_heartbeat_raw {
            Some(raw) => Some(parse_ts(&raw)?),
            None => None,
        },
        registered_at: parse_ts(&registered_at_raw)?,
        updated_at: parse_ts(&updated_at_raw)?,
    })
}
