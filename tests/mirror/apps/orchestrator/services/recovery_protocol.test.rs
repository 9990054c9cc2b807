// [tests/mirror/apps/orchestrator/services/recovery_protocol.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: FLEET RECOVERY SERVICE
 * CERTIFICA: re-colocación con backup para bots stateful, arranque
 *            limpio para stateless, items 'waiting' sin capacidad y
 *            la promoción exclusiva de 'waiting' en el reintento.
 * =================================================================
 */

use chrono::Utc;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use wopr_domain_models::{
    BillingState, BotInstance, CommandResult, NodeCommandKind, RecoveryEventStatus,
    RecoveryItemStatus, RecoveryTrigger, ReleaseChannel, UpdatePolicy,
};
use wopr_infra_db::repositories::{BotInstanceRepository, NodeRepository, RecoveryRepository};
use wopr_infra_db::TursoClient;
use wopr_orchestrator::services::command_bus::{CommandBusError, CommandChannel};
use wopr_orchestrator::services::notifier::AdminNotifier;
use wopr_orchestrator::services::{FleetRecoveryService, PlacementEngine};

#[derive(Default)]
struct JournalingChannel {
    journal: Mutex<Vec<(String, NodeCommandKind)>>,
}

impl CommandChannel for JournalingChannel {
    async fn dispatch(
        &self,
        node_id: &str,
        kind: NodeCommandKind,
        _payload: serde_json::Value,
    ) -> Result<CommandResult, CommandBusError> {
        self.journal.lock().unwrap().push((node_id.to_string(), kind));
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

fn forge_bot(bot_id: &str, node_id: &str, stateful: bool, estimated_mb: i64) -> BotInstance {
    BotInstance {
        id: bot_id.to_string(),
        tenant_id: format!("tenant-{}", bot_id),
        name: bot_id.to_string(),
        node_id: Some(node_id.to_string()),
        billing_state: BillingState::Active,
        estimated_mb,
        stateful,
        image_reference: "wopr/bot-agent:stable".to_string(),
        release_channel: ReleaseChannel::Pinned,
        update_policy: UpdatePolicy::Manual,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

struct RecoveryFixture {
    channel: Arc<JournalingChannel>,
    node_repository: Arc<NodeRepository>,
    bot_repository: Arc<BotInstanceRepository>,
    recovery_repository: Arc<RecoveryRepository>,
    notifier: Arc<CountingNotifier>,
    service: FleetRecoveryService<JournalingChannel, CountingNotifier>,
}

async fn build_fixture() -> RecoveryFixture {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    let node_repository = Arc::new(NodeRepository::new(client.clone()));
    let bot_repository = Arc::new(BotInstanceRepository::new(client.clone()));
    let recovery_repository = Arc::new(RecoveryRepository::new(client.clone()));
    let channel = Arc::new(JournalingChannel::default());
    let notifier = Arc::new(CountingNotifier::default());

    let service = FleetRecoveryService::new(
        Arc::clone(&channel),
        Arc::clone(&bot_repository),
        Arc::clone(&recovery_repository),
        Arc::new(PlacementEngine::new(Arc::clone(&node_repository))),
        Arc::clone(&notifier),
    );

    RecoveryFixture { channel, node_repository, bot_repository, recovery_repository, notifier, service }
}

#[tokio::test]
async fn certify_stateful_and_stateless_salvage() {
    let fixture = build_fixture().await;
    fixture.node_repository.register_or_refresh("n-lost", "lost.fleet", 8192, "agent-1").await.unwrap();
    fixture.node_repository.register_or_refresh("n-haven", "haven.fleet", 8192, "agent-1").await.unwrap();

    fixture.bot_repository.create(&forge_bot("bot-disk", "n-lost", true, 512)).await.unwrap();
    fixture.bot_repository.create(&forge_bot("bot-ram", "n-lost", false, 256)).await.unwrap();

    let sealed = fixture.service.trigger_recovery("n-lost", RecoveryTrigger::Auto).await.unwrap();
    assert_eq!(sealed.status, RecoveryEventStatus::Completed);
    assert_eq!(sealed.tenants_recovered, 2);
    assert_eq!(sealed.tenants_total, 2);

    // El stateful restaura desde backup; el stateless arranca limpio.
    let journal = fixture.channel.journal.lock().unwrap().clone();
    assert_eq!(
        journal,
        vec![
            ("n-haven".to_string(), NodeCommandKind::BackupDownload),
            ("n-haven".to_string(), NodeCommandKind::BotImport),
            ("n-haven".to_string(), NodeCommandKind::BotStart),
        ]
    );

    // El inventario refleja las re-colocaciones.
    for bot_id in ["bot-disk", "bot-ram"] {
        let salvaged = fixture.bot_repository.find(bot_id).await.unwrap().unwrap();
        assert_eq!(salvaged.node_id.as_deref(), Some("n-haven"));
    }

    // Recuperación total: sin señal al operador.
    assert!(fixture.notifier.signals.lock().unwrap().is_empty());
}

#[tokio::test]
async fn certify_waiting_on_no_capacity_then_retry() {
    let fixture = build_fixture().await;
    fixture.node_repository.register_or_refresh("n-lost", "lost.fleet", 8192, "agent-1").await.unwrap();
    fixture.bot_repository.create(&forge_bot("bot-stranded", "n-lost", true, 512)).await.unwrap();

    // Sin candidatos (el origen está excluido): item en espera.
    let sealed = fixture.service.trigger_recovery("n-lost", RecoveryTrigger::Manual).await.unwrap();
    assert_eq!(sealed.status, RecoveryEventStatus::Partial);
    assert_eq!(sealed.tenants_waiting, 1);

    let waiting = fixture.recovery_repository.waiting_items(&sealed.id).await.unwrap();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].reason.as_deref(), Some("no_capacity"));

    // El bot conserva su node_id hasta el reintento.
    let stranded = fixture.bot_repository.find("bot-stranded").await.unwrap().unwrap();
    assert_eq!(stranded.node_id.as_deref(), Some("n-lost"));

    // La señal de residuo llegó al operador.
    assert_eq!(fixture.notifier.signals.lock().unwrap().len(), 1);

    // Capacidad nueva: el reintento promueve el item a 'recovered'.
    fixture.node_repository.register_or_refresh("n-fresh", "fresh.fleet", 8192, "agent-1").await.unwrap();
    let resealed = fixture.service.retry_waiting(&sealed.id).await.unwrap();
    assert_eq!(resealed.tenants_recovered, 1);
    assert_eq!(resealed.tenants_waiting, 0);
    assert_eq!(resealed.status, RecoveryEventStatus::Completed);

    let salvaged = fixture.bot_repository.find("bot-stranded").await.unwrap().unwrap();
    assert_eq!(salvaged.node_id.as_deref(), Some("n-fresh"));

    // Los items ya resueltos no se reprocesan en reintentos futuros.
    let items = fixture.recovery_repository.items_for_event(&sealed.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, RecoveryItemStatus::Recovered);
    let journal_len_before = fixture.channel.journal.lock().unwrap().len();
    fixture.service.retry_waiting(&sealed.id).await.unwrap();
    assert_eq!(fixture.channel.journal.lock().unwrap().len(), journal_len_before);
}
