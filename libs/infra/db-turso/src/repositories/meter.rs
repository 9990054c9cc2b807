// [libs/infra/db-turso/src/repositories/meter.rs]
/*!
 * =================================================================
 * APARATO: METER REPOSITORY (V4.3 - BATCH INGESTION)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: INGESTA POR LOTES DE EVENTOS Y AGREGADOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ATOMIC BATCH: El lote completo entra en una sola transacción; el
 *    WAL del emisor solo se compacta tras el COMMIT.
 * 2. AT-LEAST-ONCE: 'INSERT OR IGNORE' por id pre-generado convierte
 *    los replays del WAL en no-ops silenciosos.
 * 3. WATERMARK DISCIPLINE: El agregador solo procesa filas estrictamente
 *    posteriores a su marca de agua.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::{fmt_ts, parse_ts};
use crate::TursoClient;
use chrono::{DateTime, Utc};
use libsql::params;
use tracing::{debug, instrument};
use wopr_core_credit::Credit;
use wopr_domain_models::{Capability, MeterEvent, UsageMeasure};

/// Grupo agregado devuelto por el barrido del agregador.
#[derive(Debug, Clone)]
pub struct AggregationGroup {
    pub tenant_id: String,
    pub capability: Capability,
    pub provider: String,
    pub event_count: i64,
    pub total_cost_raw: i64,
    pub total_charge_raw: i64,
    pub total_duration_ms: i64,
    pub max_timestamp: DateTime<Utc>,
}

pub struct MeterRepository {
    database_client: TursoClient,
}

impl MeterRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Ingesta atómica de un lote de eventos.
     *
     * # Logic:
     * 'INSERT OR IGNORE' deduplica por id pre-WAL: un replay tras un
     * crash posterior al COMMIT no duplica filas.
     */
    #[instrument(skip(self, events), fields(batch = events.len()))]
    pub async fn insert_batch(&self, events: &[MeterEvent]) -> Result<(), DbError> {
        if events.is_empty() {
            return Ok(());
        }

        let database_connection = self.database_client.get_connection()?;
        let batch_transaction = database_connection
            .transaction()
            .await
            .map_err(|_| DbError::TransactionError)?;

        for event in events {
            let (usage_units, usage_unit_type) = match &event.usage {
                Some(measure) => (Some(measure.units), Some(measure.unit_type.clone())),
                None => (None, None),
            };

            batch_transaction
                .execute(
                    "INSERT OR IGNORE INTO meter_events \
                     (id, tenant_id, cost_raw, charge_raw, capability, provider, event_timestamp, \
                      session_id, duration_ms, usage_units, usage_unit_type, tier, metadata_json) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        event.id.clone(),
                        event.tenant.clone(),
                        event.cost.raw(),
                        event.charge.raw(),
                        event.capability.as_str(),
                        event.provider.clone(),
                        fmt_ts(event.timestamp),
                        event.session_id.clone(),
                        event.duration_ms,
                        usage_units,
                        usage_unit_type,
                        event.tier.clone(),
                        event.metadata.as_ref().map(|meta| meta.to_string())
                    ],
                )
                .await?;
        }

        batch_transaction.commit().await.map_err(|_| DbError::TransactionError)?;
        debug!("📊 [METER_BATCH]: {} events crystallized.", events.len());
        Ok(())
    }

    /// Barrido del agregador: grupos estrictamente posteriores a la marca.
    #[instrument(skip(self))]
    pub async fn aggregate_groups_after(
        &self,
        watermark: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<AggregationGroup>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT tenant_id, capability, provider, COUNT(*), \
                        COALESCE(SUM(cost_raw), 0), COALESCE(SUM(charge_raw), 0), \
                        COALESCE(SUM(duration_ms), 0), MAX(event_timestamp) \
                 FROM meter_events \
                 WHERE event_timestamp > ?1 AND event_timestamp <= ?2 \
                 GROUP BY tenant_id, capability, provider",
                params![fmt_ts(watermark), fmt_ts(until)],
            )
            .await?;

        let mut groups = Vec::new();
        while let Some(data_row) = query_results.next().await? {
            let capability_raw: String = data_row.get(1)?;
            let max_ts_raw: String = data_row.get(7)?;
            groups.push(AggregationGroup {
                tenant_id: data_row.get(0)?,
                capability: Capability::parse(&capability_raw)
                    .ok_or_else(|| DbError::MappingError(format!("UNKNOWN_CAPABILITY: {}", capability_raw)))?,
                provider: data_row.get(2)?,
                event_count: data_row.get(3)?,
                total_cost_raw: data_row.get(4)?,
                total_charge_raw: data_row.get(5)?,
                total_duration_ms: data_row.get(6)?,
                max_timestamp: parse_ts(&max_ts_raw)?,
            });
        }
        Ok(groups)
    }

    /// Upsert idempotente del agregado por ventana de 60 s.
    pub async fn upsert_usage_summary(
        &self,
        group: &AggregationGroup,
        window_start: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "INSERT INTO usage_summaries \
                 (tenant_id, capability, provider, window_start, event_count, total_cost_raw, total_charge_raw, total_duration_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(tenant_id, capability, provider, window_start) DO UPDATE SET \
                    event_count = event_count + excluded.event_count, \
                    total_cost_raw = total_cost_raw + excluded.total_cost_raw, \
                    total_charge_raw = total_charge_raw + excluded.total_charge_raw, \
                    total_duration_ms = total_duration_ms + excluded.total_duration_ms",
                params![
                    group.tenant_id.clone(),
                    group.capability.as_str(),
                    group.provider.clone(),
                    fmt_ts(window_start),
                    group.event_count,
                    group.total_cost_raw,
                    group.total_charge_raw,
                    group.total_duration_ms
                ],
            )
            .await?;
        Ok(())
    }

    /// Pliegue del grupo dentro del periodo de facturación activo (mensual).
    pub async fn upsert_billing_period_summary(
        &self,
        group: &AggregationGroup,
        period_start: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "INSERT INTO billing_period_summaries \
                 (tenant_id, capability, provider, period_start, event_count, total_cost_raw, total_charge_raw, total_duration_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(tenant_id, capability, provider, period_start) DO UPDATE SET \
                    event_count = event_count + excluded.event_count, \
                    total_cost_raw = total_cost_raw + excluded.total_cost_raw, \
                    total_charge_raw = total_charge_raw + excluded.total_charge_raw, \
                    total_duration_ms = total_duration_ms + excluded.total_duration_ms",
                params![
                    group.tenant_id.clone(),
                    group.capability.as_str(),
                    group.provider.clone(),
                    fmt_ts(period_start),
                    group.event_count,
                    group.total_cost_raw,
                    group.total_charge_raw,
                    group.total_duration_ms
                ],
            )
            .await?;
        Ok(())
    }

    /**
     * Gasto (charge) del tenant en una ventana temporal.
     *
     * Alimenta al centinela de topes de gasto junto con el buffer vivo
     * del emisor (eventos aún no cristalizados).
     */
    pub async fn spent_between(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        capability: Option<Capability>,
    ) -> Result<Credit, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = match capability {
            Some(capability_filter) => {
                database_connection
                    .query(
                        "SELECT COALESCE(SUM(charge_raw), 0) FROM meter_events \
                         WHERE tenant_id = ?1 AND capability = ?2 \
                           AND event_timestamp >= ?3 AND event_timestamp < ?4",
                        params![tenant_id, capability_filter.as_str(), fmt_ts(from), fmt_ts(until)],
                    )
                    .await?
            }
            None => {
                database_connection
                    .query(
                        "SELECT COALESCE(SUM(charge_raw), 0) FROM meter_events \
                         WHERE tenant_id = ?1 AND event_timestamp >= ?2 AND event_timestamp < ?3",
                        params![tenant_id, fmt_ts(from), fmt_ts(until)],
                    )
                    .await?
            }
        };

        let spent_raw: i64 = match query_results.next().await? {
            Some(data_row) => data_row.get(0)?,
            None => 0,
        };
        Credit::from_raw(spent_raw).map_err(|fault| DbError::MappingError(fault.to_string()))
    }

    /// Marca de agua del agregador (época si jamás corrió).
    pub async fn load_watermark(&self, aggregator_id: &str) -> Result<Option<DateTime<Utc>>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT high_watermark FROM aggregation_watermarks WHERE aggregator_id = ?1",
                params![aggregator_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => {
                let raw: String = data_row.get(0)?;
                Ok(Some(parse_ts(&raw)?))
            }
            None => Ok(None),
        }
    }

    pub async fn store_watermark(&self, aggregator_id: &str, watermark: DateTime<Utc>) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "INSERT INTO aggregation_watermarks (aggregator_id, high_watermark) VALUES (?1, ?2) \
                 ON CONFLICT(aggregator_id) DO UPDATE SET high_watermark = excluded.high_watermark",
                params![aggregator_id, fmt_ts(watermark)],
            )
            .await?;
        Ok(())
    }

    /// Recupera un evento por id (herramienta de reconciliación DLQ).
    pub async fn find_event(&self, event_id: &str) -> Result<Option<MeterEvent>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT id, tenant_id, cost_raw, charge_raw, capability, provider, event_timestamp, \
                        session_id, duration_ms, usage_units, usage_unit_type, tier, metadata_json \
                 FROM meter_events WHERE id = ?1",
                params![event_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => {
                let capability_raw: String = data_row.get(4)?;
                let timestamp_raw: String = data_row.get(6)?;
                let usage_units: Option<i64> = data_row.get(9)?;
                let usage_unit_type: Option<String> = data_row.get(10)?;
                let metadata_raw: Option<String> = data_row.get(12)?;

                Ok(Some(MeterEvent {
                    id: data_row.get(0)?,
                    tenant: data_row.get(1)?,
                    cost: Credit::from_raw(data_row.get::<i64>(2)?)
                        .map_err(|fault| DbError::MappingError(fault.to_string()))?,
                    charge: Credit::from_raw(data_row.get::<i64>(3)?)
                        .map_err(|fault| DbError::MappingError(fault.to_string()))?,
                    capability: Capability::parse(&capability_raw)
                        .ok_or_else(|| DbError::MappingError(format!("UNKNOWN_CAPABILITY: {}", capability_raw)))?,
                    provider: data_row.get(5)?,
                    timestamp: parse_ts(&timestamp_raw)?,
                    session_id: data_row.get(7)?,
                    duration_ms: data_row.get(8)?,
                    usage: match (usage_units, usage_unit_type) {
                        (Some(units), Some(unit_type)) => Some(UsageMeasure { units, unit_type }),
                        _ => None,
                    },
                    tier: data_row.get(11)?,
                    metadata: metadata_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
                }))
            }
            None => Ok(None),
        }
    }
}
