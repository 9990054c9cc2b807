// [libs/domain/ledger/src/billing.rs]
/*!
 * =================================================================
 * APARATO: BOT BILLING DIRECTORY (V4.2 - SOLVENCY MIRROR)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: ESPEJO DE SOLVENCIA (botId -> tenant -> estado)
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CYCLE BREAK: Este aparato NO referencia al cron ni el cron a él
 *    de forma mutua; la sinapsis viaja por callbacks inyectados.
 * 2. AUDIT TRAIL: Cada reactivación emite su entrada 'bot.reactivated'
 *    best-effort.
 * =================================================================
 */

use crate::errors::LedgerError;
use crate::ledger::CreditLedger;
use std::sync::Arc;
use tracing::{info, instrument};
use wopr_domain_models::{BillingState, BotInstance};
use wopr_infra_db::repositories::{AuditRepository, BotInstanceRepository};

pub struct BotBillingDirectory {
    bot_repository: Arc<BotInstanceRepository>,
    audit_repository: Arc<AuditRepository>,
}

impl BotBillingDirectory {
    #[must_use]
    pub fn new(bot_repository: Arc<BotInstanceRepository>, audit_repository: Arc<AuditRepository>) -> Self {
        Self { bot_repository, audit_repository }
    }

    /// Alta de un bot: nace 'active' en el inventario.
    #[instrument(skip(self, bot))]
    pub async fn register_bot(&self, bot: &BotInstance) -> Result<(), LedgerError> {
        self.bot_repository.create(bot).await?;
        self.audit_repository
            .append(
                "billing",
                "bot.registered",
                &bot.id,
                Some(serde_json::json!({ "tenant": bot.tenant_id })),
            )
            .await;
        Ok(())
    }

    /// Suspende todos los bots del tenant (balance agotado).
    #[instrument(skip(self))]
    pub async fn suspend_all_for_tenant(&self, tenant_id: &str) -> Result<Vec<String>, LedgerError> {
        let tenant_bots = self.bot_repository.list_for_tenant(tenant_id).await?;
        let mut suspended_identifiers = Vec::new();

        for bot in tenant_bots {
            if bot.billing_state == BillingState::Active {
                self.bot_repository.set_billing_state(&bot.id, BillingState::Suspended).await?;
                self.audit_repository
                    .append(
                        "billing",
                        "bot.suspended",
                        &bot.id,
                        Some(serde_json::json!({ "tenant": tenant_id })),
                    )
                    .await;
                suspended_identifiers.push(bot.id);
            }
        }

        if !suspended_identifiers.is_empty() {
            info!(
                "🧊 [BILLING_FREEZE]: Tenant [{}] -> {} bots suspended.",
                tenant_id,
                suspended_identifiers.len()
            );
        }
        Ok(suspended_identifiers)
    }

    /**
     * Barrido de reactivación: si el balance del tenant volvió a ser
     * positivo, los bots suspendidos regresan a 'active'.
     *
     * Retorna los identificadores reactivados (vacío si la solvencia
     * sigue agotada).
     */
    #[instrument(skip(self, ledger))]
    pub async fn check_reactivation(
        &self,
        tenant_id: &str,
        ledger: &CreditLedger,
    ) -> Result<Vec<String>, LedgerError> {
        let suspended_bots = self.bot_repository.list_suspended_for_tenant(tenant_id).await?;
        if suspended_bots.is_empty() {
            return Ok(Vec::new());
        }

        let balance = ledger.balance(tenant_id).await?;
        if !balance.is_positive() {
            return Ok(Vec::new());
        }

        let mut reactivated_identifiers = Vec::new();
        for bot in suspended_bots {
            self.bot_repository.set_billing_state(&bot.id, BillingState::Active).await?;
            self.audit_repository
                .append(
                    "billing",
                    "bot.reactivated",
                    &bot.id,
                    Some(serde_json::json!({ "tenant": tenant_id, "balance_raw": balance.raw() })),
                )
                .await;
            reactivated_identifiers.push(bot.id);
        }

        info!(
            "🔥 [BILLING_THAW]: Tenant [{}] solvent again -> {} bots reactivated.",
            tenant_id,
            reactivated_identifiers.len()
        );
        Ok(reactivated_identifiers)
    }
}
