// [apps/orchestrator/src/services/runtime_driver.rs]
/*!
 * =================================================================
 * APARATO: RUNTIME CRON DRIVER (V4.3 - DAILY PACEMAKER)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: DISPARO DEL BARRIDO DIARIO Y DE LA REACTIVACIÓN
 *
 * El reference_id determinista del cron hace inocuo el sobre-disparo:
 * el driver corre cada hora y el dominio colapsa los replays.
 * =================================================================
 */

use crate::state::AppState;
use chrono::Utc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Cadencia del pacemaker; la idempotencia diaria vive en el dominio.
const DRIVER_INTERVAL_SECONDS: u64 = 3600;

/// Lanza el daemon de costos de runtime + barrido de reactivación.
pub fn spawn_runtime_driver(application_state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut pacemaker_ticker = interval(Duration::from_secs(DRIVER_INTERVAL_SECONDS));
        pacemaker_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("⏱️ [RUNTIME_DRIVER]: Daily cost pacemaker active (hourly probe).");

        loop {
            pacemaker_ticker.tick().await;
            let today = Utc::now().date_naive();

            // 1. BARRIDO DE COSTOS (idempotente por reference_id diario).
            let runtime_cron = application_state.runtime_cron();
            let sweep_result = runtime_cron.run_daily_sweep(today).await;
            if !sweep_result.suspended.is_empty() {
                info!(
                    "🧊 [RUNTIME_DRIVER]: {} tenants frozen by insolvency.",
                    sweep_result.suspended.len()
                );
            }

            // 2. BARRIDO DE REACTIVACIÓN (balance positivo -> deshielo).
            match application_state.bot_repository.tenants_with_suspended_bots().await {
                Ok(frozen_tenants) => {
                    for tenant_id in frozen_tenants {
                        match application_state
                            .billing_directory
                            .check_reactivation(&tenant_id, &application_state.ledger)
                            .await
                        {
                            Ok(reactivated) if !reactivated.is_empty() => {
                                info!(
                                    "🔥 [RUNTIME_DRIVER]: Tenant [{}] thawed {} bots.",
                                    tenant_id,
                                    reactivated.len()
                                );
                            }
                            Ok(_) => {}
                            Err(reactivation_fault) => {
                                error!(
                                    "❌ [RUNTIME_DRIVER]: Reactivation sweep fault for [{}]: {}",
                                    tenant_id, reactivation_fault
                                );
                            }
                        }
                    }
                }
                Err(scan_fault) => {
                    error!("❌ [RUNTIME_DRIVER]: Suspended tenant scan collapsed: {}", scan_fault);
                }
            }
        }
    })
}
