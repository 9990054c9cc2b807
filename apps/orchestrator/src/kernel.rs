// [apps/orchestrator/src/kernel.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR SOVEREIGN KERNEL (V4.7 - DAEMON IGNITION)
 * CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * VISION HIPER-HOLÍSTICA:
 * Actúa como la placa base donde se conectan todos los servicios: el
 * replay del WAL ocurre ANTES de abrir el socket TCP, garantizando
 * que ningún evento contable quede huérfano tras un reinicio.
 * =================================================================
 */

use crate::config::PlatformConfig;
use crate::routes::create_sovereign_router;
use crate::services::deletion_cron::{DeletionCron, DeletionExecutor};
use crate::services::{spawn_reaper, spawn_runtime_driver};
use crate::state::AppState;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use wopr_infra_db::TursoClient;

pub struct OrchestratorKernel {
    pub server_network_port: u16,
    pub application_shared_state: AppState,
}

impl OrchestratorKernel {
    /**
     * Realiza la ignición del cliente táctico y el estado neural.
     * Establece la conexión al sustrato antes de levantar servicios.
     */
    #[instrument(skip(config))]
    pub async fn ignite(config: PlatformConfig) -> Self {
        let database_client = TursoClient::connect(&config.database_path, None)
            .await
            .expect("FATAL: Database link collapse. Ignition aborted.");

        let listening_port = config.listening_port;
        Self {
            server_network_port: listening_port,
            application_shared_state: AppState::new(database_client, config),
        }
    }

    /**
     * Lanza todas las operaciones autónomas del plano de control y el
     * servidor HTTP principal.
     */
    pub async fn launch_sovereign_operations(self) {
        let shared_application_state = self.application_shared_state.clone();

        // --- 1. REPARACIÓN DEL PIPELINE CONTABLE (WAL REPLAY) ---
        match shared_application_state.meter_emitter.replay_wal().await {
            Ok(replayed_count) if replayed_count > 0 => {
                info!("♻️ [KERNEL]: {} meter events rehydrated from journal.", replayed_count);
            }
            Ok(_) => {}
            Err(replay_fault) => error!("❌ [KERNEL]: Journal replay fault: {}", replay_fault),
        }
        let _flusher_handle = shared_application_state.meter_emitter.spawn_flusher();

        // --- 2. AGREGADOR DE CONSUMO (ventana 60 s) ---
        let _aggregator_handle = Arc::clone(&shared_application_state.usage_aggregator).spawn_sweeper();

        // --- 3. VIGILANCIA DE LA FLOTA (Reaper) ---
        let _reaper_handle = spawn_reaper(shared_application_state.clone());

        // --- 4. CRON DE COSTOS + REACTIVACIÓN ---
        let _runtime_handle = spawn_runtime_driver(shared_application_state.clone());

        // --- 5. FLUJO DE BORRADO CON GRACIA ---
        // El borrado duro real es un colaborador externo; el ejecutor
        // nominal audita el barrido y entrega el resumen.
        let deletion_state = shared_application_state.clone();
        let deletion_executor: DeletionExecutor = Arc::new(move |tenant_id: String| {
            let audit_repository = Arc::clone(&deletion_state.audit_repository);
            let bot_repository = Arc::clone(&deletion_state.bot_repository);
            Box::pin(async move {
                let tenant_bots = bot_repository
                    .list_for_tenant(&tenant_id)
                    .await
                    .map_err(|fault| fault.to_string())?;
                audit_repository
                    .append(
                        "deletion-cron",
                        "tenant.hard_delete",
                        &tenant_id,
                        Some(serde_json::json!({ "bots": tenant_bots.len() })),
                    )
                    .await;
                Ok(serde_json::json!({ "tenant": tenant_id, "bots_removed": tenant_bots.len() }))
            })
        });
        let deletion_cron = Arc::new(DeletionCron::new(
            Arc::clone(&shared_application_state.deletion_repository),
            deletion_executor,
        ));
        let _deletion_handle = deletion_cron.spawn();

        // --- 6. POLLER DE IMÁGENES (bootstrap del inventario) ---
        shared_application_state.image_poller.bootstrap_tracking().await;

        // --- 7. HIGIENE PERIÓDICA (webhooks TTL + ventanas de cupo) ---
        let hygiene_state = shared_application_state.clone();
        tokio::spawn(async move {
            let mut hygiene_ticker = tokio::time::interval(Duration::from_secs(3600));
            hygiene_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                hygiene_ticker.tick().await;
                if let Err(purge_fault) = hygiene_state.webhook_repository.purge_expired(72).await {
                    warn!("⚠️ [HYGIENE]: Webhook purge fault: {}", purge_fault);
                }
                if let Err(purge_fault) = hygiene_state
                    .rate_limiter
                    .purge_stale_windows(chrono::Utc::now())
                    .await
                {
                    warn!("⚠️ [HYGIENE]: Rate window purge fault: {}", purge_fault);
                }
            }
        });

        // --- 8. IGNICIÓN DEL SERVIDOR HTTP/WS ---
        let router = create_sovereign_router(shared_application_state.clone());
        let listening_address = SocketAddr::new(IpAddr::from([0, 0, 0, 0]), self.server_network_port);

        info!("🛰️ [KERNEL]: Control plane listening on {}.", listening_address);

        let tcp_listener = tokio::net::TcpListener::bind(listening_address)
            .await
            .expect("FATAL: TCP socket binding collapse.");

        if let Err(server_fault) = axum::serve(tcp_listener, router).await {
            error!("🔥 [KERNEL_COLLAPSE]: HTTP server terminated: {}", server_fault);
        }

        // Apagado ordenado: una descarga contable final.
        shared_application_state.meter_emitter.close().await;
    }
}
