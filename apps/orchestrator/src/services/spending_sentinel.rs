// [apps/orchestrator/src/services/spending_sentinel.rs]
/*!
 * =================================================================
 * APARATO: SPENDING SENTINEL (V4.4 - CAP ENFORCEMENT)
 * CLASIFICACIÓN: GATEWAY GOVERNANCE (ESTRATO L4)
 * RESPONSABILIDAD: TOPES DUROS Y ALERTAS DE GASTO POR TENANT
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. LIVE SPEND: El gasto observado suma las filas cristalizadas del
 *    Meter MÁS el buffer vivo del emisor (eventos aún en vuelo).
 * 2. PROBE COST: El tope bloquea cuando gasto + sonda mínima lo
 *    excedería; la sonda evita el goteo fino sobre el límite.
 * 3. ALERT CADENCE: Cada umbral de alerta emite a lo sumo una señal
 *    por día UTC (seen-set en RAM).
 * =================================================================
 */

use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use wopr_core_credit::Credit;
use wopr_domain_models::{CapScope, CapThresholds, Capability};
use wopr_infra_db::repositories::{AuditRepository, MeterRepository, SpendingLimitRepository};
use wopr_infra_db::DbError;
use wopr_infra_meter::MeterEmitter;

/// Costo de sonda mínimo proyectado sobre el tope (1 centavo).
pub const PROBE_COST_RAW: i64 = 10_000_000;

/// Bloqueo emitido cuando un tope duro sería excedido.
#[derive(Debug, Clone)]
pub struct CapBlock {
    pub scope: CapScope,
    pub cap_raw: i64,
    pub spent_raw: i64,
}

pub struct SpendingSentinel {
    spending_repository: Arc<SpendingLimitRepository>,
    meter_repository: Arc<MeterRepository>,
    meter_emitter: Arc<MeterEmitter>,
    audit_repository: Arc<AuditRepository>,
    /// Llaves "tenant:scope:fecha" de alertas ya emitidas hoy.
    emitted_alerts: Mutex<HashSet<String>>,
}

impl SpendingSentinel {
    #[must_use]
    pub fn new(
        spending_repository: Arc<SpendingLimitRepository>,
        meter_repository: Arc<MeterRepository>,
        meter_emitter: Arc<MeterEmitter>,
        audit_repository: Arc<AuditRepository>,
    ) -> Self {
        Self {
            spending_repository,
            meter_repository,
            meter_emitter,
            audit_repository,
            emitted_alerts: Mutex::new(HashSet::new()),
        }
    }

    /**
     * Evalúa los tres ámbitos (diario, mensual, capacidad) del tenant.
     *
     * Retorna `Some(CapBlock)` cuando un tope duro sería excedido por
     * al menos el costo de sonda; las alertas suaves solo emiten señal.
     */
    #[instrument(skip(self), fields(capability = capability.as_str()))]
    pub async fn check(
        &self,
        tenant_id: &str,
        capability: Capability,
        now: DateTime<Utc>,
    ) -> Result<Option<CapBlock>, DbError> {
        let limits = self.spending_repository.load(tenant_id).await?;

        let day_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .single()
            .unwrap_or(now);
        let month_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now);

        let buffered = self.meter_emitter.buffered_charge(tenant_id).await;

        // --- ÁMBITO DIARIO ---
        let spent_today = self
            .meter_repository
            .spent_between(tenant_id, day_start, now, None)
            .await?
            .checked_add(buffered)
            .unwrap_or_else(|_| Credit::zero());
        if let Some(block) = self
            .evaluate_scope(tenant_id, CapScope::Daily, &limits.daily, spent_today, now)
            .await
        {
            return Ok(Some(block));
        }

        // --- ÁMBITO MENSUAL ---
        let spent_month = self
            .meter_repository
            .spent_between(tenant_id, month_start, now, None)
            .await?
            .checked_add(buffered)
            .unwrap_or_else(|_| Credit::zero());
        if let Some(block) = self
            .evaluate_scope(tenant_id, CapScope::Monthly, &limits.monthly, spent_month, now)
            .await
        {
            return Ok(Some(block));
        }

        // --- ÁMBITO POR CAPACIDAD (ciclo mensual) ---
        if let Some(capability_thresholds) = limits.per_capability.get(&capability) {
            let spent_capability = self
                .meter_repository
                .spent_between(tenant_id, month_start, now, Some(capability))
                .await?;
            if let Some(block) = self
                .evaluate_scope(tenant_id, CapScope::Capability, capability_thresholds, spent_capability, now)
                .await
            {
                return Ok(Some(block));
            }
        }

        Ok(None)
    }

    async fn evaluate_scope(
        &self,
        tenant_id: &str,
        scope: CapScope,
        thresholds: &CapThresholds,
        spent: Credit,
        now: DateTime<Utc>,
    ) -> Option<CapBlock> {
        if let Some(hard_cap) = thresholds.hard_cap {
            if spent.raw() + PROBE_COST_RAW > hard_cap.raw() {
                warn!(
                    "🚧 [CAP_BLOCK]: Tenant [{}] {} cap reached (spent {} / cap {}).",
                    tenant_id,
                    scope.as_str(),
                    spent,
                    hard_cap
                );
                return Some(CapBlock {
                    scope,
                    cap_raw: hard_cap.raw(),
                    spent_raw: spent.raw(),
                });
            }
        }

        if let Some(alert_threshold) = thresholds.alert_at {
            if spent.raw() >= alert_threshold.raw() {
                self.emit_alert_once(tenant_id, scope, spent, alert_threshold, now).await;
            }
        }
        None
    }

    /// A lo sumo una alerta por (tenant, ámbito) por día UTC.
    async fn emit_alert_once(
        &self,
        tenant_id: &str,
        scope: CapScope,
        spent: Credit,
        threshold: Credit,
        now: DateTime<Utc>,
    ) {
        let dedupe_key = format!("{}:{}:{}", tenant_id, scope.as_str(), now.format("%Y-%m-%d"));
        {
            let mut emitted_guard = self.emitted_alerts.lock().await;
            if !emitted_guard.insert(dedupe_key) {
                return;
            }
        }

        self.audit_repository
            .append(
                "spending-sentinel",
                "spend.alert",
                tenant_id,
                Some(serde_json::json!({
                    "scope": scope.as_str(),
                    "spent_raw": spent.raw(),
                    "threshold_raw": threshold.raw(),
                })),
            )
            .await;
    }
}
