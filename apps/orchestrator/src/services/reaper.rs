// [apps/orchestrator/src/services/reaper.rs]
/*!
 * =================================================================
 * APARATO: FLEET REAPER SERVICE (V4.4 - HEARTBEAT SENTENCING)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: DEGRADACIÓN Y SENTENCIA DE NODOS SIN LATIDO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. TWO-STAGE SENTENCING: active --(gracia 90s)--> degraded
 *    --(timeout de muerte)--> offline. Jamás se salta un estado.
 * 2. AUTO SALVAGE: La sentencia a offline dispara la recuperación
 *    automática de los bots varados del nodo.
 * 3. SWEEP RESILIENCE: Un nodo defectuoso no detiene el barrido.
 * =================================================================
 */

use crate::state::AppState;
use chrono::Duration as ChronoDuration;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use wopr_domain_models::node::NodeLifecycleEvent;
use wopr_domain_models::{NodeStatus, RecoveryTrigger};

/// Gracia de latido antes de degradar (90 s).
pub const HEARTBEAT_GRACE_MS: i64 = 90_000;
/// Silencio total antes de sentenciar a offline (5 min).
pub const DEAD_TIMEOUT_MS: i64 = 300_000;
/// Cadencia del barrido de vigilancia.
const SURVEILLANCE_INTERVAL_SECONDS: u64 = 30;

/// Lanza el daemon de vigilancia de latidos en el reactor de Tokio.
pub fn spawn_reaper(application_state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut surveillance_ticker = interval(Duration::from_secs(SURVEILLANCE_INTERVAL_SECONDS));
        surveillance_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("💀 [REAPER_ACTIVE]: Heartbeat sentencing daemon initiated.");

        loop {
            surveillance_ticker.tick().await;

            // 1. DEGRADACIÓN: activos sin latido dentro de la gracia.
            match application_state
                .node_repository
                .stale_nodes(NodeStatus::Active, ChronoDuration::milliseconds(HEARTBEAT_GRACE_MS))
                .await
            {
                Ok(silent_nodes) => {
                    for silent_node in silent_nodes {
                        warn!("💀 [REAPER_DEGRADE]: Node [{}] missed its heartbeat window.", silent_node.id);
                        if let Err(transition_fault) = application_state
                            .node_repository
                            .transition(&silent_node.id, NodeLifecycleEvent::HeartbeatMissed, "heartbeat_missed", "reaper")
                            .await
                        {
                            error!("❌ [REAPER_FAULT]: Degrade rejected for [{}]: {}", silent_node.id, transition_fault);
                        }
                    }
                }
                Err(scan_fault) => error!("❌ [REAPER_FAULT]: Active scan collapsed: {}", scan_fault),
            }

            // 2. SENTENCIA: degradados en silencio terminal -> offline + salvage.
            match application_state
                .node_repository
                .stale_nodes(NodeStatus::Degraded, ChronoDuration::milliseconds(DEAD_TIMEOUT_MS))
                .await
            {
                Ok(dead_nodes) => {
                    for dead_node in dead_nodes {
                        warn!("💀 [REAPER_SENTENCE]: Node [{}] declared dead.", dead_node.id);
                        if let Err(transition_fault) = application_state
                            .node_repository
                            .transition(&dead_node.id, NodeLifecycleEvent::DeadTimeout, "dead_timeout", "reaper")
                            .await
                        {
                            error!("❌ [REAPER_FAULT]: Sentence rejected for [{}]: {}", dead_node.id, transition_fault);
                            continue;
                        }

                        // Recuperación automática de los bots varados.
                        let recovery_service = application_state.recovery_service();
                        if let Err(recovery_fault) =
                            recovery_service.trigger_recovery(&dead_node.id, RecoveryTrigger::Auto).await
                        {
                            error!(
                                "❌ [REAPER_SALVAGE_FAULT]: Recovery for [{}] collapsed: {}",
                                dead_node.id, recovery_fault
                            );
                        }
                    }
                }
                Err(scan_fault) => error!("❌ [REAPER_FAULT]: Degraded scan collapsed: {}", scan_fault),
            }
        }
    })
}
