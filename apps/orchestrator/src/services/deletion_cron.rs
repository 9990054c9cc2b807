// [apps/orchestrator/src/services/deletion_cron.rs]
/*!
 * =================================================================
 * APARATO: ACCOUNT DELETION CRON (V4.2 - GRACE EXECUTOR)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: EJECUCIÓN DE BORRADOS CON GRACIA EXPIRADA
 *
 * El ejecutor real del borrado (tenant-wide hard delete) es un
 * colaborador externo inyectado; el fallo deja la fila 'pending' y
 * el ciclo siguiente reintenta.
 * =================================================================
 */

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};
use wopr_infra_db::repositories::DeletionRepository;

/// Ejecutor externo del borrado duro; retorna el resumen JSON.
pub type DeletionExecutor = Arc<
    dyn Fn(String) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, String>> + Send>>
        + Send
        + Sync,
>;

/// Resultado de un ciclo del cron.
#[derive(Debug, Clone, Default)]
pub struct DeletionCycleResult {
    pub completed: usize,
    pub failed: usize,
}

pub struct DeletionCron {
    deletion_repository: Arc<DeletionRepository>,
    execute_deletion: DeletionExecutor,
}

impl DeletionCron {
    #[must_use]
    pub fn new(deletion_repository: Arc<DeletionRepository>, execute_deletion: DeletionExecutor) -> Self {
        Self { deletion_repository, execute_deletion }
    }

    /**
     * Un ciclo: busca solicitudes expiradas y ejecuta el borrado.
     */
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> DeletionCycleResult {
        let mut cycle_result = DeletionCycleResult::default();

        let expired_requests = match self.deletion_repository.find_expired().await {
            Ok(requests) => requests,
            Err(scan_fault) => {
                error!("❌ [DELETION_CRON]: Expiry scan collapsed: {}", scan_fault);
                return cycle_result;
            }
        };

        for request in expired_requests {
            match (self.execute_deletion)(request.tenant_id.clone()).await {
                Ok(summary) => {
                    match self.deletion_repository.mark_completed(&request.id, &summary).await {
                        Ok(true) => {
                            info!("🗑️ [DELETION_SEALED]: Tenant [{}] hard-deleted.", request.tenant_id);
                            cycle_result.completed += 1;
                        }
                        Ok(false) => {
                            // La solicitud dejó de estar pending en el interín.
                            warn!("🗑️ [DELETION_RACE]: Request [{}] no longer pending.", request.id);
                        }
                        Err(seal_fault) => {
                            error!("❌ [DELETION_CRON]: Seal fault for [{}]: {}", request.id, seal_fault);
                            cycle_result.failed += 1;
                        }
                    }
                }
                Err(execution_fault) => {
                    // La fila permanece pending; el ciclo siguiente reintenta.
                    warn!(
                        "⚠️ [DELETION_RETRY]: Tenant [{}] deletion failed: {}",
                        request.tenant_id, execution_fault
                    );
                    let _ = self.deletion_repository.increment_failed(&request.id).await;
                    cycle_result.failed += 1;
                }
            }
        }

        cycle_result
    }

    /// Lanza el daemon diario del flujo de borrado.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut deletion_ticker = interval(Duration::from_secs(24 * 3600));
            deletion_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("🗑️ [DELETION_CRON]: Grace executor daemon active (daily).");

            loop {
                deletion_ticker.tick().await;
                let cycle = self.run_cycle().await;
                if cycle.completed + cycle.failed > 0 {
                    info!(
                        "🗑️ [DELETION_CRON]: Cycle sealed. completed={} failed={}",
                        cycle.completed, cycle.failed
                    );
                }
            }
        })
    }
}
