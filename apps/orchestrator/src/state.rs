// [apps/orchestrator/src/state.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN STATE ORCHESTRATOR (V4.6 - SINGULARITY)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: GRAFO DE DEPENDENCIAS CONSTRUIDO UNA SOLA VEZ
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. COMPOSITION ROOT: Cero singletons perezosos; cada repositorio,
 *    dominio y servicio nace aquí y viaja por inyección.
 * 2. CYCLE BREAK: El ciclo Ledger <-> Billing <-> Cron se rompe con
 *    hooks inyectados (on_suspend), jamás con referencias mutuas.
 * 3. NOMINAL PURITY: Erradicación total de abreviaciones. 'Arc<T>'
 *    para inmutabilidad compartida.
 * =================================================================
 */

use crate::config::PlatformConfig;
use crate::services::{
    CircuitBreakerShield, FleetRecoveryService, GatewayRateLimiter, ImagePoller,
    MigrationOrchestrator, NodeCommandBus, PlacementEngine, SnapshotVault, SpendingSentinel,
    TracingNotifier,
};
use std::sync::Arc;
use tracing::{error, info};
use wopr_domain_ledger::{BotBillingDirectory, CreditLedger, RuntimeCostCron, SuspensionHook};
use wopr_domain_models::NodeCommandKind;
use wopr_infra_db::repositories::{
    AddonRepository, AuditRepository, BotInstanceRepository, CircuitBreakerRepository,
    DeletionRepository, LedgerRepository, MeterRepository, NodeCredentialRepository,
    NodeRepository, ProviderHealthRepository, RateLimitRepository, RecoveryRepository,
    ServiceKeyRepository, SnapshotRepository, SpendingLimitRepository, WebhookLedgerRepository,
};
use wopr_infra_db::TursoClient;
use wopr_infra_meter::{MeterEmitter, MeterPipelineConfig, UsageAggregator};
use wopr_infra_providers::{ProviderRegistry, UpstreamForwarder};

/**
 * Contenedor de estado compartido (Thread-Safe) para el Orquestador.
 * Actúa como la placa base donde se conectan todos los estratos.
 */
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PlatformConfig>,
    /// Cliente táctico del sustrato de persistencia.
    pub database_client: TursoClient,

    // --- ESTRATO L3: REPOSITORIOS TIPADOS ---
    pub ledger_repository: Arc<LedgerRepository>,
    pub meter_repository: Arc<MeterRepository>,
    pub node_repository: Arc<NodeRepository>,
    pub credential_repository: Arc<NodeCredentialRepository>,
    pub bot_repository: Arc<BotInstanceRepository>,
    pub recovery_repository: Arc<RecoveryRepository>,
    pub spending_repository: Arc<SpendingLimitRepository>,
    pub webhook_repository: Arc<WebhookLedgerRepository>,
    pub snapshot_repository: Arc<SnapshotRepository>,
    pub deletion_repository: Arc<DeletionRepository>,
    pub service_key_repository: Arc<ServiceKeyRepository>,
    pub addon_repository: Arc<AddonRepository>,
    pub audit_repository: Arc<AuditRepository>,

    // --- ESTRATO L2: DOMINIO FINANCIERO ---
    pub ledger: Arc<CreditLedger>,
    pub billing_directory: Arc<BotBillingDirectory>,

    // --- ESTRATO L3/L4: PIPELINE, MALLA Y FLOTA ---
    pub meter_emitter: Arc<MeterEmitter>,
    pub usage_aggregator: Arc<UsageAggregator>,
    pub provider_registry: Arc<ProviderRegistry>,
    pub upstream_forwarder: Arc<UpstreamForwarder>,
    pub command_bus: Arc<NodeCommandBus>,
    pub placement_engine: Arc<PlacementEngine>,
    pub rate_limiter: Arc<GatewayRateLimiter>,
    pub breaker_shield: Arc<CircuitBreakerShield>,
    pub spending_sentinel: Arc<SpendingSentinel>,
    pub notifier: Arc<TracingNotifier>,
    pub image_poller: Arc<ImagePoller<NodeCommandBus>>,
    pub snapshot_vault: Arc<SnapshotVault>,
}

impl AppState {
    /**
     * Forja el Estado Maestro inyectando todas las dependencias.
     */
    pub fn new(database_client: TursoClient, config: PlatformConfig) -> Self {
        let config = Arc::new(config);

        // --- REPOSITORIOS (L3) ---
        let ledger_repository = Arc::new(LedgerRepository::new(database_client.clone()));
        let meter_repository = Arc::new(MeterRepository::new(database_client.clone()));
        let node_repository = Arc::new(NodeRepository::new(database_client.clone()));
        let credential_repository = Arc::new(NodeCredentialRepository::new(database_client.clone()));
        let bot_repository = Arc::new(BotInstanceRepository::new(database_client.clone()));
        let recovery_repository = Arc::new(RecoveryRepository::new(database_client.clone()));
        let rate_repository = Arc::new(RateLimitRepository::new(database_client.clone()));
        let breaker_repository = Arc::new(CircuitBreakerRepository::new(database_client.clone()));
        let spending_repository = Arc::new(SpendingLimitRepository::new(database_client.clone()));
        let webhook_repository = Arc::new(WebhookLedgerRepository::new(database_client.clone()));
        let snapshot_repository = Arc::new(SnapshotRepository::new(database_client.clone()));
        let deletion_repository = Arc::new(DeletionRepository::new(database_client.clone()));
        let service_key_repository = Arc::new(ServiceKeyRepository::new(database_client.clone()));
        let addon_repository = Arc::new(AddonRepository::new(database_client.clone()));
        let provider_health_repository = Arc::new(ProviderHealthRepository::new(database_client.clone()));
        let audit_repository = Arc::new(AuditRepository::new(database_client.clone()));

        // --- DOMINIO FINANCIERO (L2) ---
        let ledger = Arc::new(CreditLedger::new(Arc::clone(&ledger_repository)));
        let billing_directory = Arc::new(BotBillingDirectory::new(
            Arc::clone(&bot_repository),
            Arc::clone(&audit_repository),
        ));

        // --- PIPELINE CONTABLE (L3/L4) ---
        let meter_emitter = Arc::new(MeterEmitter::new(
            Arc::clone(&meter_repository),
            MeterPipelineConfig::with_data_dir(&config.fleet_data_dir),
        ));
        let usage_aggregator = Arc::new(UsageAggregator::new(Arc::clone(&meter_repository)));

        // --- MALLA DE PROVEEDORES ---
        let provider_registry = Arc::new(ProviderRegistry::with_default_mesh(provider_health_repository));
        let upstream_forwarder = Arc::new(UpstreamForwarder::new());

        // --- PLANO DE NODOS ---
        let command_bus = Arc::new(NodeCommandBus::new());
        let placement_engine = Arc::new(PlacementEngine::new(Arc::clone(&node_repository)));
        let notifier = Arc::new(TracingNotifier);

        // --- GOBERNANZA DEL GATEWAY ---
        let rate_limiter = Arc::new(GatewayRateLimiter::new(rate_repository));
        let breaker_shield = Arc::new(CircuitBreakerShield::new(breaker_repository));
        let spending_sentinel = Arc::new(SpendingSentinel::new(
            Arc::clone(&spending_repository),
            Arc::clone(&meter_repository),
            Arc::clone(&meter_emitter),
            Arc::clone(&audit_repository),
        ));

        // --- POLLER DE IMÁGENES (hook de actualización -> bus de mando) ---
        let poller_bus = Arc::clone(&command_bus);
        let poller_bot_repository = Arc::clone(&bot_repository);
        let update_hook: crate::services::image_poller::UpdateHook =
            Arc::new(move |bot_id: String, new_digest: String| {
                let command_bus = Arc::clone(&poller_bus);
                let bot_repository = Arc::clone(&poller_bot_repository);
                Box::pin(async move {
                    let Ok(Some(bot)) = bot_repository.find(&bot_id).await else {
                        return;
                    };
                    let Some(node_id) = bot.node_id.clone() else {
                        return;
                    };
                    info!("🆕 [UPDATE_HOOK]: Restarting bot [{}] with digest {}.", bot_id, new_digest);
                    if let Err(restart_fault) = crate::services::command_bus::CommandChannel::dispatch(
                        command_bus.as_ref(),
                        &node_id,
                        NodeCommandKind::BotRestart,
                        serde_json::json!({
                            "name": bot.export_artifact_name(),
                            "image": bot.image_reference,
                            "digest": new_digest,
                        }),
                    )
                    .await
                    {
                        error!("❌ [UPDATE_HOOK_FAULT]: Restart rejected for [{}]: {}", bot_id, restart_fault);
                    }
                })
            });
        let image_poller = Arc::new(ImagePoller::new(
            Arc::clone(&command_bus),
            Arc::clone(&bot_repository),
            update_hook,
        ));

        // --- BÓVEDA DE SNAPSHOTS ---
        let snapshot_vault = Arc::new(SnapshotVault::new(
            Arc::clone(&snapshot_repository),
            config.snapshot_dir.clone(),
        ));

        Self {
            config,
            database_client,
            ledger_repository,
            meter_repository,
            node_repository,
            credential_repository,
            bot_repository,
            recovery_repository,
            spending_repository,
            webhook_repository,
            snapshot_repository,
            deletion_repository,
            service_key_repository,
            addon_repository,
            audit_repository,
            ledger,
            billing_directory,
            meter_emitter,
            usage_aggregator,
            provider_registry,
            upstream_forwarder,
            command_bus,
            placement_engine,
            rate_limiter,
            breaker_shield,
            spending_sentinel,
            notifier,
            image_poller,
            snapshot_vault,
        }
    }

    /// Orquestador de migraciones sobre el bus real.
    #[must_use]
    pub fn migration_orchestrator(&self) -> MigrationOrchestrator<NodeCommandBus, TracingNotifier> {
        MigrationOrchestrator::new(
            Arc::clone(&self.command_bus),
            Arc::clone(&self.bot_repository),
            Arc::clone(&self.node_repository),
            Arc::clone(&self.placement_engine),
            Arc::clone(&self.notifier),
        )
    }

    /// Servicio de recuperación sobre el bus real.
    #[must_use]
    pub fn recovery_service(&self) -> FleetRecoveryService<NodeCommandBus, TracingNotifier> {
        FleetRecoveryService::new(
            Arc::clone(&self.command_bus),
            Arc::clone(&self.bot_repository),
            Arc::clone(&self.recovery_repository),
            Arc::clone(&self.placement_engine),
            Arc::clone(&self.notifier),
        )
    }

    /// Cron de costos con el hook de suspensión inyectado.
    #[must_use]
    pub fn runtime_cron(&self) -> RuntimeCostCron {
        let billing_directory = Arc::clone(&self.billing_directory);
        let on_suspend: SuspensionHook = Arc::new(move |tenant_id: String| {
            let billing_directory = Arc::clone(&billing_directory);
            Box::pin(async move {
                if let Err(suspension_fault) = billing_directory.suspend_all_for_tenant(&tenant_id).await {
                    error!("❌ [SUSPENSION_HOOK_FAULT]: Tenant [{}]: {}", tenant_id, suspension_fault);
                }
            })
        });

        RuntimeCostCron::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.bot_repository),
            Arc::clone(&self.addon_repository),
            on_suspend,
        )
    }
}
