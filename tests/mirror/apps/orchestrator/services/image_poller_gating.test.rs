// [tests/mirror/apps/orchestrator/services/image_poller_gating.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: IMAGE POLLER GATING
 * CERTIFICA: 'pinned' jamás se agenda, el re-rastreo reemplaza el
 *            timer de forma atómica, 'untrack' cancela y las puertas
 *            de política/cadencia son las nominales.
 * =================================================================
 */

use chrono::TimeZone;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use wopr_domain_models::{
    BillingState, BotInstance, CommandResult, NodeCommandKind, ReleaseChannel, UpdatePolicy,
};
use wopr_infra_db::repositories::BotInstanceRepository;
use wopr_infra_db::TursoClient;
use wopr_orchestrator::services::command_bus::{CommandBusError, CommandChannel};
use wopr_orchestrator::services::image_poller::{parse_image_reference, UpdateHook};
use wopr_orchestrator::services::ImagePoller;

#[derive(Default)]
struct InertChannel;

impl CommandChannel for InertChannel {
    async fn dispatch(
        &self,
        _node_id: &str,
        _kind: NodeCommandKind,
        _payload: serde_json::Value,
    ) -> Result<CommandResult, CommandBusError> {
        Ok(CommandResult { id: Uuid::new_v4(), success: true, data: None, error: None })
    }
}

fn forge_bot(bot_id: &str, channel: ReleaseChannel, policy: UpdatePolicy) -> BotInstance {
    BotInstance {
        id: bot_id.to_string(),
        tenant_id: "tenant-x".to_string(),
        name: bot_id.to_string(),
        node_id: Some("n1".to_string()),
        billing_state: BillingState::Active,
        estimated_mb: 512,
        stateful: true,
        image_reference: "ghcr.io/wopr/bot-agent:stable".to_string(),
        release_channel: channel,
        update_policy: policy,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

async fn build_poller() -> Arc<ImagePoller<InertChannel>> {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    let idle_hook: UpdateHook = Arc::new(|_bot_id, _digest| Box::pin(async {}));
    Arc::new(ImagePoller::new(
        Arc::new(InertChannel),
        Arc::new(BotInstanceRepository::new(client)),
        idle_hook,
    ))
}

#[tokio::test]
async fn certify_pinned_never_scheduled() {
    let poller = build_poller().await;

    poller.track_bot(&forge_bot("bot-pinned", ReleaseChannel::Pinned, UpdatePolicy::Manual));
    assert!(!poller.is_tracking("bot-pinned"));

    poller.track_bot(&forge_bot("bot-canary", ReleaseChannel::Canary, UpdatePolicy::OnPush));
    assert!(poller.is_tracking("bot-canary"));

    // Re-rastrear el canario como pinned cancela su timer.
    poller.track_bot(&forge_bot("bot-canary", ReleaseChannel::Pinned, UpdatePolicy::OnPush));
    assert!(!poller.is_tracking("bot-canary"));
}

#[tokio::test]
async fn certify_retrack_and_untrack() {
    let poller = build_poller().await;

    poller.track_bot(&forge_bot("bot-a", ReleaseChannel::Stable, UpdatePolicy::Nightly));
    assert!(poller.is_tracking("bot-a"));

    // Re-rastreo atómico: sigue con exactamente un timer vivo.
    poller.track_bot(&forge_bot("bot-a", ReleaseChannel::Canary, UpdatePolicy::OnPush));
    assert!(poller.is_tracking("bot-a"));

    poller.untrack_bot("bot-a");
    assert!(!poller.is_tracking("bot-a"));

    // Untrack sobre un desconocido es inocuo.
    poller.untrack_bot("bot-ghost");
}

#[test]
fn certify_channel_cadence_table() {
    assert_eq!(ReleaseChannel::Canary.probe_interval_seconds(), Some(5 * 60));
    assert_eq!(ReleaseChannel::Staging.probe_interval_seconds(), Some(15 * 60));
    assert_eq!(ReleaseChannel::Stable.probe_interval_seconds(), Some(30 * 60));
    assert_eq!(ReleaseChannel::Pinned.probe_interval_seconds(), None);
}

#[test]
fn certify_update_policy_gates() {
    let inside_window = Utc.with_ymd_and_hms(2026, 8, 1, 3, 2, 0).unwrap();
    let outside_window = Utc.with_ymd_and_hms(2026, 8, 1, 3, 6, 0).unwrap();

    assert!(UpdatePolicy::OnPush.permits_update_at(outside_window));
    assert!(UpdatePolicy::Nightly.permits_update_at(inside_window));
    assert!(!UpdatePolicy::Nightly.permits_update_at(outside_window));
    assert!(!UpdatePolicy::Manual.permits_update_at(inside_window));
}

#[test]
fn certify_reference_decomposition() {
    assert_eq!(
        parse_image_reference("ghcr.io/wopr/bot-agent:v3"),
        ("ghcr.io".to_string(), "wopr/bot-agent".to_string(), "v3".to_string())
    );
    assert_eq!(
        parse_image_reference("redis"),
        ("registry-1.docker.io".to_string(), "library/redis".to_string(), "latest".to_string())
    );
}
