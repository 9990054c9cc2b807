// [libs/domain/ledger/src/runtime_cron.rs]
/*!
 * =================================================================
 * APARATO: RUNTIME COST CRON (V4.3 - DAILY DEDUCTION)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: DEDUCCIÓN DIARIA POR BOT ACTIVO + ADD-ONS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. DETERMINISTIC REFERENCE: El reference_id 'runtime:<tenant>:<día>'
 *    hace que cualquier re-ejecución del barrido sea un no-op.
 * 2. CLAMP & FREEZE: Ante insolvencia se debita lo disponible
 *    (acotado a cero) y se dispara el hook de suspensión inyectado.
 * 3. SWEEP RESILIENCE: Un tenant defectuoso jamás detiene el barrido.
 * =================================================================
 */

use crate::errors::LedgerError;
use crate::ledger::CreditLedger;
use chrono::NaiveDate;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use wopr_core_credit::Credit;
use wopr_domain_models::TransactionType;
use wopr_infra_db::repositories::{AddonRepository, BotInstanceRepository};

/// Tarifa diaria nominal por bot activo (17 centavos).
pub const PER_BOT_DAILY_CENTS: u64 = 17;

/// Hook asíncrono invocado cuando un tenant queda insolvente.
pub type SuspensionHook =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Resultado agregado de un barrido diario.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSweepResult {
    pub processed: usize,
    pub debited: Vec<String>,
    pub suspended: Vec<String>,
}

pub struct RuntimeCostCron {
    ledger: Arc<CreditLedger>,
    bot_repository: Arc<BotInstanceRepository>,
    addon_repository: Arc<AddonRepository>,
    on_suspend: SuspensionHook,
}

impl RuntimeCostCron {
    #[must_use]
    pub fn new(
        ledger: Arc<CreditLedger>,
        bot_repository: Arc<BotInstanceRepository>,
        addon_repository: Arc<AddonRepository>,
        on_suspend: SuspensionHook,
    ) -> Self {
        Self { ledger, bot_repository, addon_repository, on_suspend }
    }

    /**
     * Ejecuta el barrido del día calendario dado.
     *
     * Re-ejecutar el mismo día es inocuo: el reference_id determinista
     * convierte el débito en replay.
     */
    #[instrument(skip(self))]
    pub async fn run_daily_sweep(&self, sweep_date: NaiveDate) -> RuntimeSweepResult {
        let mut sweep_result = RuntimeSweepResult::default();

        let solvent_tenants = match self.bot_repository.tenants_with_active_bots().await {
            Ok(tenants) => tenants,
            Err(scan_fault) => {
                error!("❌ [RUNTIME_CRON]: Tenant scan collapsed: {}", scan_fault);
                return sweep_result;
            }
        };

        info!(
            "⏱️ [RUNTIME_CRON]: Daily sweep {} over {} tenants.",
            sweep_date,
            solvent_tenants.len()
        );

        for tenant_id in solvent_tenants {
            sweep_result.processed += 1;
            // Un tenant defectuoso no detiene el barrido.
            if let Err(tenant_fault) = self.process_tenant(&tenant_id, sweep_date, &mut sweep_result).await {
                error!("❌ [RUNTIME_CRON]: Tenant [{}] sweep fault: {}", tenant_id, tenant_fault);
            }
        }

        info!(
            "⏱️ [RUNTIME_CRON]: Sweep sealed. processed={} debited={} suspended={}",
            sweep_result.processed,
            sweep_result.debited.len(),
            sweep_result.suspended.len()
        );
        sweep_result
    }

    async fn process_tenant(
        &self,
        tenant_id: &str,
        sweep_date: NaiveDate,
        sweep_result: &mut RuntimeSweepResult,
    ) -> Result<(), LedgerError> {
        let active_bot_count = self.bot_repository.count_active_for_tenant(tenant_id).await?;
        if active_bot_count == 0 {
            return Ok(());
        }

        let per_bot_daily = Credit::from_cents(PER_BOT_DAILY_CENTS)?;
        let bots_cost = Credit::from_raw(per_bot_daily.raw() * active_bot_count)?;
        let addons_cost = self.addon_repository.daily_cost_for(tenant_id).await?;
        let daily_cost = bots_cost.checked_add(addons_cost)?;

        let reference_id = format!("runtime:{}:{}", tenant_id, sweep_date.format("%Y-%m-%d"));
        let description = format!(
            "runtime day {}: {} bots + addons {}",
            sweep_date, active_bot_count, addons_cost
        );

        match self
            .ledger
            .debit(tenant_id, daily_cost, TransactionType::BotRuntime, &description, Some(&reference_id))
            .await
        {
            Ok(_) => {
                sweep_result.debited.push(tenant_id.to_string());
                Ok(())
            }
            Err(LedgerError::InsufficientBalance { balance, .. }) => {
                // Debita lo disponible (acotado a cero) bajo el MISMO
                // reference_id y congela al tenant.
                let clamped = if balance.is_positive() { balance } else { Credit::zero() };
                if let Err(clamp_fault) = self
                    .ledger
                    .debit(
                        tenant_id,
                        clamped,
                        TransactionType::BotRuntime,
                        &format!("{} (clamped)", description),
                        Some(&reference_id),
                    )
                    .await
                {
                    warn!("⚠️ [RUNTIME_CRON]: Clamped debit rejected for [{}]: {}", tenant_id, clamp_fault);
                }

                (self.on_suspend)(tenant_id.to_string()).await;
                sweep_result.suspended.push(tenant_id.to_string());
                Ok(())
            }
            Err(other_fault) => Err(other_fault),
        }
    }
}
