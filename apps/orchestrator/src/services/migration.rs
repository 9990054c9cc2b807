// [apps/orchestrator/src/services/migration.rs]
/*!
 * =================================================================
 * APARATO: MIGRATION ORCHESTRATOR & DRAINER (V4.6 - ORDERED MOVE)
 * CLASIFICACIÓN: ORCHESTRATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: MOVIMIENTO ORDENADO DE BOTS ENTRE NODOS Y DRENADO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SIX-STEP PROTOCOL: export@src -> upload@src -> download@dst ->
 *    stop@src -> import@dst -> inspect@dst. La ventana de downtime
 *    abre en stop y cierra en inspect.
 * 2. ROLLBACK SHIELD: Un fallo en import/inspect dispara bot.start en
 *    el origen (best-effort) y el inventario queda intacto.
 * 3. DRAIN SEMANTICS: El nodo pasa a 'draining' ANTES de mover bots
 *    (veta colocaciones nuevas); solo un drenado total lo lleva a
 *    'offline'; el parcial notifica al operador y permanece.
 * =================================================================
 */

use crate::services::command_bus::CommandChannel;
use crate::services::notifier::AdminNotifier;
use crate::services::placement::PlacementEngine;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use wopr_domain_models::node::NodeLifecycleEvent;
use wopr_domain_models::{BotInstance, NodeCommandKind};
use wopr_infra_db::repositories::{BotInstanceRepository, NodeRepository};

/// Resultado de una migración individual.
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub success: bool,
    pub source_node_id: String,
    pub target_node_id: Option<String>,
    pub downtime_ms: Option<i64>,
    pub error: Option<String>,
}

impl MigrationOutcome {
    fn failure(source: &str, target: Option<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            source_node_id: source.to_string(),
            target_node_id: target,
            downtime_ms: None,
            error: Some(error.into()),
        }
    }
}

/// Reporte agregado de un drenado de nodo.
#[derive(Debug, Clone)]
pub struct DrainReport {
    pub node_id: String,
    pub migrated: Vec<String>,
    pub failed: Vec<String>,
}

pub struct MigrationOrchestrator<C: CommandChannel, N: AdminNotifier> {
    command_channel: Arc<C>,
    bot_repository: Arc<BotInstanceRepository>,
    node_repository: Arc<NodeRepository>,
    placement_engine: Arc<PlacementEngine>,
    notifier: Arc<N>,
}

impl<C: CommandChannel, N: AdminNotifier> MigrationOrchestrator<C, N> {
    #[must_use]
    pub fn new(
        command_channel: Arc<C>,
        bot_repository: Arc<BotInstanceRepository>,
        node_repository: Arc<NodeRepository>,
        placement_engine: Arc<PlacementEngine>,
        notifier: Arc<N>,
    ) -> Self {
        Self { command_channel, bot_repository, node_repository, placement_engine, notifier }
    }

    /**
     * Mueve un bot en vivo entre dos nodos.
     *
     * Precondiciones: el bot existe y está colocado; origen ≠ destino.
     * Sin destino explícito, el motor de colocación elige (excluyendo
     * al origen); sin candidato retorna el fallo nominal.
     */
    #[instrument(skip(self))]
    pub async fn migrate(
        &self,
        bot_id: &str,
        target_node_id: Option<&str>,
        estimated_mb: Option<i64>,
    ) -> MigrationOutcome {
        // --- FASE 0: PRECONDICIONES DEL INVENTARIO ---
        let bot = match self.bot_repository.find(bot_id).await {
            Ok(Some(bot)) => bot,
            Ok(None) => return MigrationOutcome::failure("", None, "bot_not_found"),
            Err(lookup_fault) => return MigrationOutcome::failure("", None, lookup_fault.to_string()),
        };

        let source_node_id = match &bot.node_id {
            Some(node_id) => node_id.clone(),
            None => return MigrationOutcome::failure("", None, "bot_unplaced"),
        };

        let required_mb = estimated_mb.unwrap_or(bot.estimated_mb);
        let destination = match target_node_id {
            Some(explicit_target) => {
                if explicit_target == source_node_id {
                    return MigrationOutcome::failure(&source_node_id, None, "source_equals_target");
                }
                explicit_target.to_string()
            }
            None => {
                match self.placement_engine.find_best_target(Some(&source_node_id), required_mb).await {
                    Ok(Some(candidate)) => candidate.id,
                    Ok(None) => {
                        return MigrationOutcome::failure(
                            &source_node_id,
                            None,
                            "no_node_with_sufficient_capacity",
                        )
                    }
                    Err(placement_fault) => {
                        return MigrationOutcome::failure(&source_node_id, None, placement_fault.to_string())
                    }
                }
            }
        };

        info!("🚚 [MIGRATION]: Bot [{}] {} -> {}.", bot_id, source_node_id, destination);

        let artifact_name = bot.export_artifact_name();
        let artifact_filename = format!("{}.tar.gz", artifact_name);

        // --- FASE 1-3: PREPARACIÓN SIN DOWNTIME ---
        if let Err(step_fault) = self
            .command_channel
            .dispatch(&source_node_id, NodeCommandKind::BotExport, json!({ "name": artifact_name }))
            .await
        {
            return MigrationOutcome::failure(&source_node_id, Some(destination), format!("export: {}", step_fault));
        }

        if let Err(step_fault) = self
            .command_channel
            .dispatch(&source_node_id, NodeCommandKind::BackupUpload, json!({ "filename": artifact_filename }))
            .await
        {
            return MigrationOutcome::failure(&source_node_id, Some(destination), format!("upload: {}", step_fault));
        }

        if let Err(step_fault) = self
            .command_channel
            .dispatch(&destination, NodeCommandKind::BackupDownload, json!({ "filename": artifact_filename }))
            .await
        {
            return MigrationOutcome::failure(&source_node_id, Some(destination), format!("download: {}", step_fault));
        }

        // --- FASE 4: APERTURA DE LA VENTANA DE DOWNTIME ---
        let downtime_started = Instant::now();
        if let Err(step_fault) = self
            .command_channel
            .dispatch(&source_node_id, NodeCommandKind::BotStop, json!({ "name": artifact_name }))
            .await
        {
            return MigrationOutcome::failure(&source_node_id, Some(destination), format!("stop: {}", step_fault));
        }

        // --- FASE 5-6: ARRANQUE EN DESTINO E INSPECCIÓN ---
        let import_result = self
            .command_channel
            .dispatch(
                &destination,
                NodeCommandKind::BotImport,
                json!({ "name": artifact_name, "filename": artifact_filename }),
            )
            .await;

        let inspect_result = match import_result {
            Ok(_) => {
                self.command_channel
                    .dispatch(&destination, NodeCommandKind::BotInspect, json!({ "name": artifact_name }))
                    .await
                    .and_then(|inspection| {
                        let container_status = inspection
                            .data
                            .as_ref()
                            .and_then(|data| data.get("status"))
                            .and_then(|status| status.as_str())
                            .unwrap_or("unknown");
                        if container_status == "running" {
                            Ok(inspection)
                        } else {
                            Err(crate::services::command_bus::CommandBusError::CommandRejected(
                                format!("container status {}", container_status),
                            ))
                        }
                    })
            }
            Err(import_fault) => Err(import_fault),
        };

        match inspect_result {
            Ok(_) => {
                let downtime_ms = downtime_started.elapsed().as_millis() as i64;
                if let Err(reassign_fault) = self.bot_repository.reassign(bot_id, Some(&destination)).await {
                    error!("❌ [MIGRATION_LEDGER_FAULT]: Reassign rejected: {}", reassign_fault);
                    return MigrationOutcome::failure(
                        &source_node_id,
                        Some(destination),
                        reassign_fault.to_string(),
                    );
                }

                info!(
                    "✅ [MIGRATION_SEALED]: Bot [{}] now on [{}] (downtime {} ms).",
                    bot_id, destination, downtime_ms
                );
                MigrationOutcome {
                    success: true,
                    source_node_id,
                    target_node_id: Some(destination),
                    downtime_ms: Some(downtime_ms),
                    error: None,
                }
            }
            Err(activation_fault) => {
                // ROLLBACK BEST-EFFORT: revivir en el origen.
                warn!(
                    "↩️ [MIGRATION_ROLLBACK]: Bot [{}] activation failed on [{}]: {}. Reviving at source.",
                    bot_id, destination, activation_fault
                );
                if let Err(rollback_fault) = self
                    .command_channel
                    .dispatch(&source_node_id, NodeCommandKind::BotStart, json!({ "name": artifact_name }))
                    .await
                {
                    error!("❌ [ROLLBACK_FAULT]: Source revival rejected: {}", rollback_fault);
                }
                MigrationOutcome::failure(&source_node_id, Some(destination), activation_fault.to_string())
            }
        }
    }

    /**
     * Drena un nodo: migra todos sus bots y lo apaga.
     *
     * Drenado parcial: el nodo permanece en 'draining' y el operador
     * recibe la señal con los conteos.
     */
    #[instrument(skip(self))]
    pub async fn drain(&self, node_id: &str) -> Result<DrainReport, wopr_infra_db::DbError> {
        // 1. VETO DE COLOCACIONES NUEVAS.
        self.node_repository
            .transition(node_id, NodeLifecycleEvent::AdminDrain, "node_drain", "orchestrator")
            .await?;

        // 2. INVENTARIO A MOVER (orden estable).
        let resident_bots: Vec<BotInstance> = self.bot_repository.list_on_node(node_id).await?;
        let total_bots = resident_bots.len();

        let mut report = DrainReport {
            node_id: node_id.to_string(),
            migrated: Vec::new(),
            failed: Vec::new(),
        };

        // 3. MIGRACIÓN UNO A UNO SIN DESTINO EXPLÍCITO.
        for bot in resident_bots {
            let outcome = self.migrate(&bot.id, None, None).await;
            if outcome.success {
                report.migrated.push(bot.id);
            } else {
                warn!(
                    "⚠️ [DRAIN_RESIDUE]: Bot [{}] stayed on [{}]: {:?}",
                    bot.id, node_id, outcome.error
                );
                report.failed.push(bot.id);
            }
        }

        // 4. CIERRE: TOTAL -> offline; PARCIAL -> señal y permanencia.
        if report.failed.is_empty() {
            self.node_repository
                .transition(node_id, NodeLifecycleEvent::DrainComplete, "drain_complete", "orchestrator")
                .await?;
            info!("🏁 [DRAIN_SEALED]: Node [{}] fully drained ({} bots).", node_id, report.migrated.len());
        } else {
            self.notifier.notify(
                "node_drain_partial",
                &format!(
                    "node {} drain incomplete: failed={} total={}",
                    node_id,
                    report.failed.len(),
                    total_bots
                ),
            );
        }

        Ok(report)
    }
}
