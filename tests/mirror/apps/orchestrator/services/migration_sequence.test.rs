// [tests/mirror/apps/orchestrator/services/migration_sequence.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: MIGRATION ORCHESTRATOR
 * CERTIFICA: la secuencia ordenada export -> upload -> download ->
 *            stop -> import -> inspect, el rollback best-effort y la
 *            re-colocación del inventario.
 * =================================================================
 */

use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use wopr_domain_models::{
    BillingState, BotInstance, CommandResult, NodeCommandKind, ReleaseChannel, UpdatePolicy,
};
use wopr_infra_db::repositories::{BotInstanceRepository, NodeRepository};
use wopr_infra_db::TursoClient;
use wopr_orchestrator::services::command_bus::{CommandBusError, CommandChannel};
use wopr_orchestrator::services::notifier::AdminNotifier;
use wopr_orchestrator::services::{MigrationOrchestrator, PlacementEngine};

/// Canal guionado: registra cada despacho y rechaza los pautados.
#[derive(Default)]
struct ScriptedChannel {
    journal: Mutex<Vec<(String, NodeCommandKind)>>,
    rejections: Mutex<HashSet<(String, &'static str)>>,
}

impl ScriptedChannel {
    fn reject(&self, node_id: &str, kind: NodeCommandKind) {
        self.rejections.lock().unwrap().insert((node_id.to_string(), kind.as_str()));
    }

    fn journal(&self) -> Vec<(String, NodeCommandKind)> {
        self.journal.lock().unwrap().clone()
    }
}

impl CommandChannel for ScriptedChannel {
    async fn dispatch(
        &self,
        node_id: &str,
        kind: NodeCommandKind,
        _payload: serde_json::Value,
    ) -> Result<CommandResult, CommandBusError> {
        self.journal.lock().unwrap().push((node_id.to_string(), kind));
        if self.rejections.lock().unwrap().contains(&(node_id.to_string(), kind.as_str())) {
            return Err(CommandBusError::CommandRejected("scripted rejection".to_string()));
        }
        Ok(CommandResult {
            id: Uuid::new_v4(),
            success: true,
            data: Some(serde_json::json!({ "status": "running", "image_digest": "sha256:abc" })),
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

fn forge_bot(bot_id: &str, tenant_id: &str, node_id: &str, estimated_mb: i64) -> BotInstance {
    BotInstance {
        id: bot_id.to_string(),
        tenant_id: tenant_id.to_string(),
        name: bot_id.to_string(),
        node_id: Some(node_id.to_string()),
        billing_state: BillingState::Active,
        estimated_mb,
        stateful: true,
        image_reference: "ghcr.io/wopr/bot-agent:stable".to_string(),
        release_channel: ReleaseChannel::Pinned,
        update_policy: UpdatePolicy::Manual,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

struct MigrationFixture {
    channel: Arc<ScriptedChannel>,
    bot_repository: Arc<BotInstanceRepository>,
    orchestrator: MigrationOrchestrator<ScriptedChannel, CountingNotifier>,
}

async fn build_fixture() -> MigrationFixture {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    let node_repository = Arc::new(NodeRepository::new(client.clone()));
    let bot_repository = Arc::new(BotInstanceRepository::new(client.clone()));
    let channel = Arc::new(ScriptedChannel::default());
    let notifier = Arc::new(CountingNotifier::default());

    node_repository.register_or_refresh("n1", "n1.fleet", 8192, "agent-1").await.unwrap();
    node_repository.register_or_refresh("n2", "n2.fleet", 8192, "agent-1").await.unwrap();
    bot_repository.create(&forge_bot("b", "t", "n1", 512)).await.unwrap();

    let orchestrator = MigrationOrchestrator::new(
        Arc::clone(&channel),
        Arc::clone(&bot_repository),
        node_repository,
        Arc::new(PlacementEngine::new(Arc::new(NodeRepository::new(client)))),
        notifier,
    );

    MigrationFixture { channel, bot_repository, orchestrator }
}

#[tokio::test]
async fn certify_happy_path_command_order() {
    let fixture = build_fixture().await;

    let outcome = fixture.orchestrator.migrate("b", Some("n2"), None).await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.source_node_id, "n1");
    assert_eq!(outcome.target_node_id.as_deref(), Some("n2"));
    assert!(outcome.downtime_ms.is_some());

    // Secuencia exacta del protocolo de seis pasos.
    let expected: Vec<(String, NodeCommandKind)> = vec![
        ("n1".into(), NodeCommandKind::BotExport),
        ("n1".into(), NodeCommandKind::BackupUpload),
        ("n2".into(), NodeCommandKind::BackupDownload),
        ("n1".into(), NodeCommandKind::BotStop),
        ("n2".into(), NodeCommandKind::BotImport),
        ("n2".into(), NodeCommandKind::BotInspect),
    ];
    assert_eq!(fixture.channel.journal(), expected);

    // El inventario refleja la re-colocación.
    let migrated_bot = fixture.bot_repository.find("b").await.unwrap().unwrap();
    assert_eq!(migrated_bot.node_id.as_deref(), Some("n2"));
}

#[tokio::test]
async fn certify_rollback_on_import_failure() {
    let fixture = build_fixture().await;
    fixture.channel.reject("n2", NodeCommandKind::BotImport);

    let outcome = fixture.orchestrator.migrate("b", Some("n2"), None).await;
    assert!(!outcome.success);

    // El rollback revive al bot en el origen.
    let journal = fixture.channel.journal();
    assert_eq!(journal.last(), Some(&("n1".to_string(), NodeCommandKind::BotStart)));

    // El inventario permanece intacto.
    let untouched_bot = fixture.bot_repository.find("b").await.unwrap().unwrap();
    assert_eq!(untouched_bot.node_id.as_deref(), Some("n1"));
}

#[tokio::test]
async fn certify_preconditions() {
    let fixture = build_fixture().await;

    // Origen == destino.
    let same_target = fixture.orchestrator.migrate("b", Some("n1"), None).await;
    assert!(!same_target.success);
    assert_eq!(same_target.error.as_deref(), Some("source_equals_target"));

    // Bot inexistente.
    let ghost = fixture.orchestrator.migrate("ghost", Some("n2"), None).await;
    assert!(!ghost.success);
    assert_eq!(ghost.error.as_deref(), Some("bot_not_found"));

    // Sin destino con capacidad suficiente.
    let oversized = fixture.orchestrator.migrate("b", None, Some(1_000_000)).await;
    assert!(!oversized.success);
    assert_eq!(oversized.error.as_deref(), Some("no_node_with_sufficient_capacity"));
}
