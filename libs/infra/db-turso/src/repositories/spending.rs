// [libs/infra/db-turso/src/repositories/spending.rs]
/*!
 * =================================================================
 * APARATO: SPENDING LIMIT REPOSITORY (V4.1 - CAP VAULT)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: UMBRALES DE GASTO (COLUMNAS + BLOB JSON)
 *
 * El mapa por capacidad viaja como blob JSON; los umbrales globales
 * viven en columnas estructuradas para consultas directas.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::fmt_ts;
use crate::TursoClient;
use chrono::Utc;
use libsql::params;
use std::collections::HashMap;
use tracing::instrument;
use wopr_core_credit::Credit;
use wopr_domain_models::{CapThresholds, Capability, SpendingLimits};

pub struct SpendingLimitRepository {
    database_client: TursoClient,
}

impl SpendingLimitRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Tenant sin fila: sin topes ni alertas (unrestricted).
    #[instrument(skip(self))]
    pub async fn load(&self, tenant_id: &str) -> Result<SpendingLimits, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT daily_alert_at_raw, daily_hard_cap_raw, monthly_alert_at_raw, monthly_hard_cap_raw, per_capability_json \
                 FROM spending_limits WHERE tenant_id = ?1",
                params![tenant_id],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => {
                let per_capability_raw: String = data_row.get(4)?;
                let per_capability_map: HashMap<String, CapThresholds> =
                    serde_json::from_str(&per_capability_raw).unwrap_or_default();

                let mut per_capability = HashMap::new();
                for (capability_name, thresholds) in per_capability_map {
                    if let Some(capability) = Capability::parse(&capability_name) {
                        per_capability.insert(capability, thresholds);
                    }
                }

                Ok(SpendingLimits {
                    daily: CapThresholds {
                        alert_at: credit_from_column(data_row.get::<Option<i64>>(0)?)?,
                        hard_cap: credit_from_column(data_row.get::<Option<i64>>(1)?)?,
                    },
                    monthly: CapThresholds {
                        alert_at: credit_from_column(data_row.get::<Option<i64>>(2)?)?,
                        hard_cap: credit_from_column(data_row.get::<Option<i64>>(3)?)?,
                    },
                    per_capability,
                })
            }
            None => Ok(SpendingLimits::unrestricted()),
        }
    }

    #[instrument(skip(self, limits))]
    pub async fn store(&self, tenant_id: &str, limits: &SpendingLimits) -> Result<(), DbError> {
        let per_capability_map: HashMap<&'static str, CapThresholds> = limits
            .per_capability
            .iter()
            .map(|(capability, thresholds)| (capability.as_str(), *thresholds))
            .collect();
        let per_capability_json = serde_json::to_string(&per_capability_map)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;

        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "INSERT INTO spending_limits \
                 (tenant_id, daily_alert_at_raw, daily_hard_cap_raw, monthly_alert_at_raw, monthly_hard_cap_raw, per_capability_json, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(tenant_id) DO UPDATE SET \
                    daily_alert_at_raw = excluded.daily_alert_at_raw, \
                    daily_hard_cap_raw = excluded.daily_hard_cap_raw, \
                    monthly_alert_at_raw = excluded.monthly_alert_at_raw, \
                    monthly_hard_cap_raw = excluded.monthly_hard_cap_raw, \
                    per_capability_json = excluded.per_capability_json, \
                    updated_at = excluded.updated_at",
                params![
                    tenant_id,
                    limits.daily.alert_at.map(|credit| credit.raw()),
                    limits.daily.hard_cap.map(|credit| credit.raw()),
                    limits.monthly.alert_at.map(|credit| credit.raw()),
                    limits.monthly.hard_cap.map(|credit| credit.raw()),
                    per_capability_json,
                    fmt_ts(Utc::now())
                ],
            )
            .await?;
        Ok(())
    }
}

fn credit_from_column(raw_column: Option<i64>) -> Result<Option<Credit>, DbError> {
    match raw_column {
        Some(raw) => Credit::from_raw(raw)
            .map(Some)
            .map_err(|fault| DbError::MappingError(fault.to_string())),
        None => Ok(None),
    }
}
