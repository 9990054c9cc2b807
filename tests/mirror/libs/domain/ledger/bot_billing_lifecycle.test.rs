// [tests/mirror/libs/domain/ledger/bot_billing_lifecycle.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: BOT BILLING DIRECTORY
 * CERTIFICA: suspensión masiva por tenant y reactivación exclusiva
 *            con balance positivo.
 * =================================================================
 */

use chrono::Utc;
use std::sync::Arc;
use wopr_core_credit::Credit;
use wopr_domain_ledger::{BotBillingDirectory, CreditLedger};
use wopr_domain_models::{BillingState, BotInstance, ReleaseChannel, TransactionType, UpdatePolicy};
use wopr_infra_db::repositories::{AuditRepository, BotInstanceRepository, LedgerRepository};
use wopr_infra_db::TursoClient;

fn forge_bot(bot_id: &str, tenant_id: &str) -> BotInstance {
    BotInstance {
        id: bot_id.to_string(),
        tenant_id: tenant_id.to_string(),
        name: format!("{}-companion", bot_id),
        node_id: Some("node-alpha".to_string()),
        billing_state: BillingState::Active,
        estimated_mb: 512,
        stateful: true,
        image_reference: "ghcr.io/wopr/bot-agent:stable".to_string(),
        release_channel: ReleaseChannel::Pinned,
        update_policy: UpdatePolicy::Manual,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

async fn build_fixture() -> (Arc<CreditLedger>, Arc<BotInstanceRepository>, BotBillingDirectory) {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    let ledger = Arc::new(CreditLedger::new(Arc::new(LedgerRepository::new(client.clone()))));
    let bot_repository = Arc::new(BotInstanceRepository::new(client.clone()));
    let directory = BotBillingDirectory::new(
        Arc::clone(&bot_repository),
        Arc::new(AuditRepository::new(client)),
    );
    (ledger, bot_repository, directory)
}

#[tokio::test]
async fn certify_suspension_and_reactivation_cycle() {
    let (ledger, bot_repository, directory) = build_fixture().await;

    directory.register_bot(&forge_bot("bot-a", "tenant-x")).await.unwrap();
    directory.register_bot(&forge_bot("bot-b", "tenant-x")).await.unwrap();
    directory.register_bot(&forge_bot("bot-z", "tenant-other")).await.unwrap();

    // Congelamiento del tenant insolvente.
    let frozen = directory.suspend_all_for_tenant("tenant-x").await.unwrap();
    assert_eq!(frozen.len(), 2);
    for bot_id in ["bot-a", "bot-b"] {
        let bot = bot_repository.find(bot_id).await.unwrap().unwrap();
        assert_eq!(bot.billing_state, BillingState::Suspended);
    }
    // El tenant ajeno permanece intacto.
    assert_eq!(
        bot_repository.find("bot-z").await.unwrap().unwrap().billing_state,
        BillingState::Active
    );

    // Sin balance positivo no hay deshielo.
    assert!(directory.check_reactivation("tenant-x", &ledger).await.unwrap().is_empty());

    // Una compra deja el balance positivo: todos los bots despiertan.
    ledger
        .credit("tenant-x", Credit::from_cents(500).unwrap(), TransactionType::Purchase, "top-up", None)
        .await
        .unwrap();
    let thawed = directory.check_reactivation("tenant-x", &ledger).await.unwrap();
    assert_eq!(thawed.len(), 2);
    for bot_id in ["bot-a", "bot-b"] {
        let bot = bot_repository.find(bot_id).await.unwrap().unwrap();
        assert_eq!(bot.billing_state, BillingState::Active);
    }

    // Sin suspendidos, el barrido es un no-op.
    assert!(directory.check_reactivation("tenant-x", &ledger).await.unwrap().is_empty());
}
