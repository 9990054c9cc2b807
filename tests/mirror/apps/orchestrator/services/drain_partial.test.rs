// [tests/mirror/apps/orchestrator/services/drain_partial.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: NODE DRAINER
 * CERTIFICA: drenado total -> offline; drenado parcial -> el nodo
 *            permanece 'draining' y el operador recibe los conteos.
 * =================================================================
 */

use chrono::Utc;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use wopr_domain_models::{
    BillingState, BotInstance, CommandResult, NodeCommandKind, NodeStatus, ReleaseChannel,
    UpdatePolicy,
};
use wopr_infra_db::repositories::{BotInstanceRepository, NodeRepository};
use wopr_infra_db::TursoClient;
use wopr_orchestrator::services::command_bus::{CommandBusError, CommandChannel};
use wopr_orchestrator::services::notifier::AdminNotifier;
use wopr_orchestrator::services::{MigrationOrchestrator, PlacementEngine};

/// Canal siempre-exitoso: el drenado parcial lo decide la capacidad.
#[derive(Default)]
struct ObedientChannel;

impl CommandChannel for ObedientChannel {
    async fn dispatch(
        &self,
        _node_id: &str,
        _kind: NodeCommandKind,
        _payload: serde_json::Value,
    ) -> Result<CommandResult, CommandBusError> {
        Ok(CommandResult {
            id: Uuid::new_v4(),
            success: true,
            data: Some(serde_json::json!({ "status": "running" })),
            error: None,
        })
    }
}

#[derive(Default)]
struct CountingNotifier {
    signals: Mutex<Vec<String>>,
}

impl AdminNotifier for CountingNotifier {
    fn notify(&self, subject: &str, body: &str) {
        self.signals.lock().unwrap().push(format!("{} :: {}", subject, body));
    }
}

fn forge_bot(bot_id: &str, node_id: &str, estimated_mb: i64) -> BotInstance {
    BotInstance {
        id: bot_id.to_string(),
        tenant_id: format!("tenant-{}", bot_id),
        name: bot_id.to_string(),
        node_id: Some(node_id.to_string()),
        billing_state: BillingState::Active,
        estimated_mb,
        stateful: true,
        image_reference: "wopr/bot-agent:stable".to_string(),
        release_channel: ReleaseChannel::Pinned,
        update_policy: UpdatePolicy::Manual,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

struct DrainFixture {
    node_repository: Arc<NodeRepository>,
    notifier: Arc<CountingNotifier>,
    orchestrator: MigrationOrchestrator<ObedientChannel, CountingNotifier>,
}

async fn build_fixture(target_capacity_mb: i64, bot_sizes: &[(&str, i64)]) -> DrainFixture {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    let node_repository = Arc::new(NodeRepository::new(client.clone()));
    let bot_repository = Arc::new(BotInstanceRepository::new(client.clone()));
    let notifier = Arc::new(CountingNotifier::default());

    node_repository.register_or_refresh("n1", "n1.fleet", 8192, "agent-1").await.unwrap();
    node_repository
        .register_or_refresh("n2", "n2.fleet", target_capacity_mb, "agent-1")
        .await
        .unwrap();
    for (bot_id, estimated_mb) in bot_sizes {
        bot_repository.create(&forge_bot(bot_id, "n1", *estimated_mb)).await.unwrap();
    }

    let orchestrator = MigrationOrchestrator::new(
        Arc::new(ObedientChannel),
        bot_repository,
        Arc::clone(&node_repository),
        Arc::new(PlacementEngine::new(Arc::clone(&node_repository))),
        Arc::clone(&notifier),
    );

    DrainFixture { node_repository, notifier, orchestrator }
}

#[tokio::test]
async fn certify_full_drain_reaches_offline() {
    let fixture = build_fixture(8192, &[("bot-a", 400), ("bot-b", 600)]).await;

    let report = fixture.orchestrator.drain("n1").await.unwrap();
    assert_eq!(report.migrated.len(), 2);
    assert!(report.failed.is_empty());

    let drained_node = fixture.node_repository.find("n1").await.unwrap().unwrap();
    assert_eq!(drained_node.status, NodeStatus::Offline);
    assert!(fixture.notifier.signals.lock().unwrap().is_empty());
}

#[tokio::test]
async fn certify_partial_drain_stays_draining_and_signals() {
    // n2 solo tiene capacidad para el bot pequeño.
    let fixture = build_fixture(1024, &[("bot-a", 400), ("bot-b", 4000)]).await;

    let report = fixture.orchestrator.drain("n1").await.unwrap();
    assert_eq!(report.migrated, vec!["bot-a".to_string()]);
    assert_eq!(report.failed, vec!["bot-b".to_string()]);

    // El nodo permanece en draining (sigue vetando colocaciones).
    let stuck_node = fixture.node_repository.find("n1").await.unwrap().unwrap();
    assert_eq!(stuck_node.status, NodeStatus::Draining);

    // El operador recibe los conteos del residuo.
    let signals = fixture.notifier.signals.lock().unwrap();
    assert_eq!(signals.len(), 1);
    assert!(signals[0].contains("node n1"));
    assert!(signals[0].contains("failed=1"));
    assert!(signals[0].contains("total=2"));
}
