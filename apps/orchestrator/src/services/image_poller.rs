// [apps/orchestrator/src/services/image_poller.rs]
/*!
 * =================================================================
 * APARATO: CONTAINER IMAGE POLLER (V4.5 - CHANNEL CADENCE)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: SONDEO DE DIGESTS Y DISPARO DE ACTUALIZACIONES
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CHANNEL CADENCE: canary 5m / staging 15m / stable 30m; 'pinned'
 *    jamás se agenda.
 * 2. POLICY GATE: on-push inmediato; nightly solo en la ventana
 *    03:00–03:05 UTC; manual jamás de forma autónoma.
 * 3. ATOMIC RETRACK: Re-rastrear un bot reemplaza su timer de forma
 *    atómica; 'untrack_bot' lo cancela.
 * 4. ERROR TOLERANCE: Los fallos de sondeo se trazan y el timer
 *    sobrevive.
 * =================================================================
 */

use crate::services::command_bus::CommandChannel;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use wopr_domain_models::{BotInstance, NodeCommandKind};
use wopr_infra_db::repositories::BotInstanceRepository;

/// Callback inyectado cuando un digest nuevo pasa la puerta de política.
pub type UpdateHook =
    Arc<dyn Fn(String, String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct ImagePoller<C: CommandChannel> {
    command_channel: Arc<C>,
    bot_repository: Arc<BotInstanceRepository>,
    http_client: reqwest::Client,
    on_update_available: UpdateHook,
    /// Timers vivos por bot; el reemplazo aborta al anterior.
    active_probes: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl<C: CommandChannel> ImagePoller<C> {
    #[must_use]
    pub fn new(
        command_channel: Arc<C>,
        bot_repository: Arc<BotInstanceRepository>,
        on_update_available: UpdateHook,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("wopr-image-poller/4.5")
            .build()
            .unwrap_or_default();

        Self {
            command_channel,
            bot_repository,
            http_client,
            on_update_available,
            active_probes: Mutex::new(HashMap::new()),
        }
    }

    /**
     * Agenda (o re-agenda) el sondeo recurrente de un bot.
     *
     * Un canal 'pinned' cancela cualquier timer previo y no agenda.
     */
    #[instrument(skip(self, bot), fields(bot_id = %bot.id, channel = bot.release_channel.as_str()))]
    pub fn track_bot(self: &Arc<Self>, bot: &BotInstance) {
        let Some(probe_interval_seconds) = bot.release_channel.probe_interval_seconds() else {
            self.untrack_bot(&bot.id);
            debug!("📌 [POLLER_PINNED]: Bot [{}] never probes.", bot.id);
            return;
        };

        let poller = Arc::clone(self);
        let tracked_bot = bot.clone();
        let probe_task = tokio::spawn(async move {
            let mut probe_ticker = tokio::time::interval(Duration::from_secs(probe_interval_seconds));
            probe_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // El primer tick es inmediato; lo consumimos para sondear en cadencia.
            probe_ticker.tick().await;

            loop {
                probe_ticker.tick().await;
                if let Err(probe_fault) = poller.execute_probe(&tracked_bot).await {
                    // El timer sobrevive a cualquier fallo de sondeo.
                    warn!("🛰️ [POLLER_FAULT]: Bot [{}] probe failed: {}", tracked_bot.id, probe_fault);
                }
            }
        });

        let displaced_probe = {
            let mut probes_guard = self.active_probes.lock().expect("poller probes lock poisoned");
            probes_guard.insert(bot.id.clone(), probe_task)
        };
        if let Some(stale_probe) = displaced_probe {
            stale_probe.abort();
        }

        info!(
            "🛰️ [POLLER_TRACK]: Bot [{}] probing every {}s ({}).",
            bot.id,
            probe_interval_seconds,
            bot.release_channel.as_str()
        );
    }

    /// Sonda de observabilidad: ¿el bot tiene timer vivo?
    #[must_use]
    pub fn is_tracking(&self, bot_id: &str) -> bool {
        let probes_guard = self.active_probes.lock().expect("poller probes lock poisoned");
        probes_guard.contains_key(bot_id)
    }

    /// Cancela el timer del bot (si existía).
    pub fn untrack_bot(&self, bot_id: &str) {
        let removed_probe = {
            let mut probes_guard = self.active_probes.lock().expect("poller probes lock poisoned");
            probes_guard.remove(bot_id)
        };
        if let Some(cancelled_probe) = removed_probe {
            cancelled_probe.abort();
            info!("🛰️ [POLLER_UNTRACK]: Bot [{}] probe cancelled.", bot_id);
        }
    }

    /// Agenda todos los bots rastreables del inventario (arranque).
    pub async fn bootstrap_tracking(self: &Arc<Self>) {
        match self.bot_repository.list_tracked().await {
            Ok(tracked_bots) => {
                let tracked_count = tracked_bots.len();
                for bot in &tracked_bots {
                    self.track_bot(bot);
                }
                info!("🛰️ [POLLER_BOOTSTRAP]: {} bots under digest surveillance.", tracked_count);
            }
            Err(bootstrap_fault) => {
                warn!("🛰️ [POLLER_BOOTSTRAP_FAULT]: Inventory scan failed: {}", bootstrap_fault);
            }
        }
    }

    /**
     * Un ciclo de sondeo: token -> HEAD manifiesto -> digest actual
     * del agente -> puerta de política -> hook de actualización.
     */
    async fn execute_probe(&self, bot: &BotInstance) -> Result<(), String> {
        let Some(remote_digest) = self.fetch_remote_digest(&bot.image_reference).await? else {
            return Err("registry returned no digest header".to_string());
        };

        let running_digest = self.inspect_running_digest(bot).await?;

        if running_digest.as_deref() == Some(remote_digest.as_str()) {
            return Ok(());
        }

        if !bot.update_policy.permits_update_at(Utc::now()) {
            debug!(
                "⏳ [POLLER_HELD]: Bot [{}] has digest drift but policy [{}] vetoes now.",
                bot.id,
                bot.update_policy.as_str()
            );
            return Ok(());
        }

        info!("🆕 [POLLER_UPDATE]: Bot [{}] digest drift -> {}.", bot.id, remote_digest);
        (self.on_update_available)(bot.id.clone(), remote_digest).await;
        Ok(())
    }

    /// Token anónimo de pull + HEAD del manifiesto.
    async fn fetch_remote_digest(&self, image_reference: &str) -> Result<Option<String>, String> {
        let (registry_host, repository, tag) = parse_image_reference(image_reference);

        let token_url = format!(
            "https://{}/token?service={}&scope=repository:{}:pull",
            registry_auth_host(&registry_host),
            registry_host,
            repository
        );
        let pull_token = self
            .http_client
            .get(&token_url)
            .send()
            .await
            .map_err(|fault| fault.to_string())?
            .json::<serde_json::Value>()
            .await
            .map_err(|fault| fault.to_string())?
            .get("token")
            .and_then(|token| token.as_str())
            .map(str::to_string);

        let manifest_url = format!("https://{}/v2/{}/manifests/{}", registry_host, repository, tag);
        let mut manifest_request = self
            .http_client
            .head(&manifest_url)
            .header(
                reqwest::header::ACCEPT,
                "application/vnd.docker.distribution.manifest.v2+json, application/vnd.oci.image.index.v1+json",
            );
        if let Some(token) = pull_token {
            manifest_request = manifest_request.bearer_auth(token);
        }

        let manifest_response = manifest_request.send().await.map_err(|fault| fault.to_string())?;
        Ok(manifest_response
            .headers()
            .get("docker-content-digest")
            .and_then(|digest| digest.to_str().ok())
            .map(str::to_string))
    }

    /// Pregunta al agente por el digest corriendo (via bus de mando).
    async fn inspect_running_digest(&self, bot: &BotInstance) -> Result<Option<String>, String> {
        let Some(node_id) = &bot.node_id else {
            return Err("bot unplaced".to_string());
        };

        let inspection = self
            .command_channel
            .dispatch(node_id, NodeCommandKind::BotInspect, json!({ "name": bot.export_artifact_name() }))
            .await
            .map_err(|fault| fault.to_string())?;

        let running_digest = inspection
            .data
            .as_ref()
            .and_then(|data| data.get("image_digest"))
            .and_then(|digest| digest.as_str())
            .map(str::to_string);

        // Rastro observable del último digest conocido.
        if let Some(digest) = &running_digest {
            let _ = self.bot_repository.record_running_digest(&bot.id, digest).await;
        }
        Ok(running_digest)
    }
}

/// Descompone "registry/repo:tag" con los defaults del ecosistema Docker.
#[must_use]
pub fn parse_image_reference(image_reference: &str) -> (String, String, String) {
    let (without_tag, tag) = match image_reference.rsplit_once(':') {
        Some((prefix, candidate_tag)) if !candidate_tag.contains('/') => {
            (prefix.to_string(), candidate_tag.to_string())
        }
        _ => (image_reference.to_string(), "latest".to_string()),
    };

    match without_tag.split_once('/') {
        Some((host_candidate, remainder)) if host_candidate.contains('.') || host_candidate.contains(':') => {
            (host_candidate.to_string(), remainder.to_string(), tag)
        }
        Some(_) => ("registry-1.docker.io".to_string(), without_tag, tag),
        None => ("registry-1.docker.io".to_string(), format!("library/{}", without_tag), tag),
    }
}

fn registry_auth_host(registry_host: &str) -> String {
    if registry_host == "registry-1.docker.io" {
        "auth.docker.io".to_string()
    } else {
        registry_host.to_string()
    }
}
