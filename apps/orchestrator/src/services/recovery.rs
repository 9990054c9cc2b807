// [apps/orchestrator/src/services/recovery.rs]
/*!
 * =================================================================
 * APARATO: FLEET RECOVERY SERVICE (V4.5 - SWARM SALVAGE)
 * CLASIFICACIÓN: ORCHESTRATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: RE-COLOCACIÓN DE BOTS DE UN NODO CAÍDO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. STABLE ORDER: Los bots se procesan en orden de id estable para
 *    que los reintentos sean deterministas.
 * 2. WAITING DISCIPLINE: Sin capacidad disponible el item queda
 *    'waiting' (no_capacity) y el bot conserva su node_id hasta
 *    retry_waiting.
 * 3. COUNT CONSERVATION: recovered + failed + waiting == total en todo
 *    cierre; el residuo (failed+waiting > 0) señala al operador.
 * =================================================================
 */

use crate::services::command_bus::{CommandBusError, CommandChannel};
use crate::services::notifier::AdminNotifier;
use crate::services::placement::PlacementEngine;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use wopr_domain_models::{
    BotInstance, NodeCommandKind, RecoveryEvent, RecoveryItem, RecoveryItemStatus, RecoveryTrigger,
};
use wopr_infra_db::repositories::{BotInstanceRepository, RecoveryRepository};
use wopr_infra_db::DbError;

/// Desenlace de la re-colocación de un solo bot.
struct SalvageVerdict {
    status: RecoveryItemStatus,
    target_node: Option<String>,
    backup_key: Option<String>,
    reason: Option<String>,
}

pub struct FleetRecoveryService<C: CommandChannel, N: AdminNotifier> {
    command_channel: Arc<C>,
    bot_repository: Arc<BotInstanceRepository>,
    recovery_repository: Arc<RecoveryRepository>,
    placement_engine: Arc<PlacementEngine>,
    notifier: Arc<N>,
}

impl<C: CommandChannel, N: AdminNotifier> FleetRecoveryService<C, N> {
    #[must_use]
    pub fn new(
        command_channel: Arc<C>,
        bot_repository: Arc<BotInstanceRepository>,
        recovery_repository: Arc<RecoveryRepository>,
        placement_engine: Arc<PlacementEngine>,
        notifier: Arc<N>,
    ) -> Self {
        Self { command_channel, bot_repository, recovery_repository, placement_engine, notifier }
    }

    /**
     * Recupera todos los bots de un nodo perdido o drenado.
     */
    #[instrument(skip(self))]
    pub async fn trigger_recovery(
        &self,
        node_id: &str,
        trigger: RecoveryTrigger,
    ) -> Result<RecoveryEvent, DbError> {
        let stranded_bots = self.bot_repository.list_on_node(node_id).await?;
        let event = self
            .recovery_repository
            .open_event(node_id, trigger, stranded_bots.len() as i64)
            .await?;

        for bot in &stranded_bots {
            let verdict = self.salvage_single_bot(node_id, bot).await;
            let item = RecoveryItem {
                id: Uuid::new_v4().to_string(),
                event_id: event.id.clone(),
                tenant: bot.tenant_id.clone(),
                bot_id: bot.id.clone(),
                source_node: node_id.to_string(),
                target_node: verdict.target_node.clone(),
                backup_key: verdict.backup_key.clone(),
                status: verdict.status,
                reason: verdict.reason.clone(),
                started_at: Utc::now(),
                completed_at: match verdict.status {
                    RecoveryItemStatus::Waiting => None,
                    _ => Some(Utc::now()),
                },
            };
            self.recovery_repository.append_item(&item).await?;
        }

        let sealed_event = self.recovery_repository.close_event(&event.id).await?;

        if sealed_event.tenants_failed + sealed_event.tenants_waiting > 0 {
            self.notifier.notify(
                "fleet_recovery_partial",
                &format!(
                    "recovery {} for node {}: failed={} waiting={} total={}",
                    sealed_event.id,
                    node_id,
                    sealed_event.tenants_failed,
                    sealed_event.tenants_waiting,
                    sealed_event.tenants_total
                ),
            );
        }

        Ok(sealed_event)
    }

    /**
     * Reintenta exclusivamente los items 'waiting' de un evento.
     *
     * Los items ya 'recovered' o 'failed' jamás se reprocesan.
     */
    #[instrument(skip(self))]
    pub async fn retry_waiting(&self, event_id: &str) -> Result<RecoveryEvent, DbError> {
        let stranded_items = self.recovery_repository.waiting_items(event_id).await?;
        info!("🔁 [RECOVERY_RETRY]: Event [{}] has {} waiting items.", event_id, stranded_items.len());

        for item in stranded_items {
            let bot = match self.bot_repository.find(&item.bot_id).await? {
                Some(bot) => bot,
                None => {
                    self.recovery_repository
                        .update_item(&item.id, RecoveryItemStatus::Failed, None, None, Some("bot_vanished"))
                        .await?;
                    continue;
                }
            };

            let verdict = self.salvage_single_bot(&item.source_node, &bot).await;
            // Un reintento sin capacidad mantiene el item en 'waiting'.
            self.recovery_repository
                .update_item(
                    &item.id,
                    verdict.status,
                    verdict.target_node.as_deref(),
                    verdict.backup_key.as_deref(),
                    verdict.reason.as_deref(),
                )
                .await?;
        }

        self.recovery_repository.close_event(event_id).await
    }

    /**
     * Re-coloca un único bot: candidato por scoring, restauración del
     * backup (stateful) o arranque limpio (stateless).
     */
    async fn salvage_single_bot(&self, source_node: &str, bot: &BotInstance) -> SalvageVerdict {
        let candidate = match self
            .placement_engine
            .find_best_target(Some(source_node), bot.estimated_mb)
            .await
        {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                return SalvageVerdict {
                    status: RecoveryItemStatus::Waiting,
                    target_node: None,
                    backup_key: None,
                    reason: Some("no_capacity".to_string()),
                }
            }
            Err(placement_fault) => {
                return SalvageVerdict {
                    status: RecoveryItemStatus::Failed,
                    target_node: None,
                    backup_key: None,
                    reason: Some(placement_fault.to_string()),
                }
            }
        };

        let replacement_result = if bot.stateful {
            self.import_from_backup(&candidate.id, bot).await
        } else {
            self.command_channel
                .dispatch(
                    &candidate.id,
                    NodeCommandKind::BotStart,
                    json!({ "name": bot.export_artifact_name() }),
                )
                .await
                .map(|_| None)
        };

        match replacement_result {
            Ok(backup_key) => {
                if let Err(reassign_fault) = self.bot_repository.reassign(&bot.id, Some(&candidate.id)).await {
                    warn!("⚠️ [SALVAGE_LEDGER_FAULT]: Reassign rejected: {}", reassign_fault);
                    return SalvageVerdict {
                        status: RecoveryItemStatus::Failed,
                        target_node: Some(candidate.id),
                        backup_key,
                        reason: Some(reassign_fault.to_string()),
                    };
                }
                SalvageVerdict {
                    status: RecoveryItemStatus::Recovered,
                    target_node: Some(candidate.id),
                    backup_key,
                    reason: None,
                }
            }
            Err(salvage_fault) => SalvageVerdict {
                status: RecoveryItemStatus::Failed,
                target_node: Some(candidate.id),
                backup_key: None,
                reason: Some(salvage_fault.to_string()),
            },
        }
    }

    /// Restauración desde el backup compartido: download + import.
    async fn import_from_backup(
        &self,
        candidate_node: &str,
        bot: &BotInstance,
    ) -> Result<Option<String>, CommandBusError> {
        let artifact_name = bot.export_artifact_name();
        let artifact_filename = format!("{}.tar.gz", artifact_name);

        self.command_channel
            .dispatch(
                candidate_node,
                NodeCommandKind::BackupDownload,
                json!({ "filename": artifact_filename }),
            )
            .await?;

        self.command_channel
            .dispatch(
                candidate_node,
                NodeCommandKind::BotImport,
                json!({ "name": artifact_name, "filename": artifact_filename }),
            )
            .await?;

        Ok(Some(artifact_filename))
    }
}
