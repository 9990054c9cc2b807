// [tests/mirror/libs/domain/ledger/runtime_cron_determinism.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: RUNTIME COST CRON
 * CERTIFICA: deducción diaria determinista (17¢ por bot + add-ons),
 *            idempotencia del re-barrido y el protocolo de clamp +
 *            suspensión ante insolvencia.
 * =================================================================
 */

use chrono::{NaiveDate, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wopr_core_credit::Credit;
use wopr_domain_ledger::{CreditLedger, RuntimeCostCron, SuspensionHook, PER_BOT_DAILY_CENTS};
use wopr_domain_models::{BillingState, BotInstance, ReleaseChannel, TransactionType, UpdatePolicy};
use wopr_infra_db::repositories::{AddonRepository, BotInstanceRepository, LedgerRepository};
use wopr_infra_db::TursoClient;

fn forge_bot(bot_id: &str, tenant_id: &str) -> BotInstance {
    BotInstance {
        id: bot_id.to_string(),
        tenant_id: tenant_id.to_string(),
        name: bot_id.to_string(),
        node_id: Some("node-alpha".to_string()),
        billing_state: BillingState::Active,
        estimated_mb: 512,
        stateful: false,
        image_reference: "wopr/bot-agent:stable".to_string(),
        release_channel: ReleaseChannel::Pinned,
        update_policy: UpdatePolicy::Manual,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

struct CronFixture {
    ledger: Arc<CreditLedger>,
    bot_repository: Arc<BotInstanceRepository>,
    addon_repository: Arc<AddonRepository>,
    suspension_count: Arc<AtomicUsize>,
}

impl CronFixture {
    async fn build() -> Self {
        let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
        Self {
            ledger: Arc::new(CreditLedger::new(Arc::new(LedgerRepository::new(client.clone())))),
            bot_repository: Arc::new(BotInstanceRepository::new(client.clone())),
            addon_repository: Arc::new(AddonRepository::new(client)),
            suspension_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn cron(&self) -> RuntimeCostCron {
        let counter = Arc::clone(&self.suspension_count);
        let hook: SuspensionHook = Arc::new(move |_tenant_id: String| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });
        RuntimeCostCron::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.bot_repository),
            Arc::clone(&self.addon_repository),
            hook,
        )
    }
}

#[tokio::test]
async fn certify_daily_deduction_and_idempotent_rerun() {
    let fixture = CronFixture::build().await;
    let sweep_date = NaiveDate::from_ymd_opt(2026, 7, 19).unwrap();

    fixture.bot_repository.create(&forge_bot("bot-a", "tenant-solvent")).await.unwrap();
    fixture.bot_repository.create(&forge_bot("bot-b", "tenant-solvent")).await.unwrap();
    fixture
        .addon_repository
        .enable("tenant-solvent", "voice-pack", Credit::from_cents(5).unwrap())
        .await
        .unwrap();
    fixture
        .ledger
        .credit("tenant-solvent", Credit::from_cents(500).unwrap(), TransactionType::Purchase, "seed", None)
        .await
        .unwrap();

    let first_sweep = fixture.cron().run_daily_sweep(sweep_date).await;
    assert_eq!(first_sweep.processed, 1);
    assert_eq!(first_sweep.debited, vec!["tenant-solvent".to_string()]);
    assert!(first_sweep.suspended.is_empty());

    // 2 bots × 17¢ + 5¢ de add-on = 39¢ deducidos.
    let expected_cost = 2 * PER_BOT_DAILY_CENTS + 5;
    let expected_balance = Credit::from_cents(500 - expected_cost).unwrap();
    assert_eq!(fixture.ledger.balance("tenant-solvent").await.unwrap(), expected_balance);

    // Re-barrido del mismo día: reference_id determinista -> no-op.
    let second_sweep = fixture.cron().run_daily_sweep(sweep_date).await;
    assert_eq!(second_sweep.debited, vec!["tenant-solvent".to_string()]);
    assert_eq!(fixture.ledger.balance("tenant-solvent").await.unwrap(), expected_balance);

    // Día distinto: nueva deducción.
    let next_day = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
    fixture.cron().run_daily_sweep(next_day).await;
    let balance_after_two_days = Credit::from_cents(500 - 2 * expected_cost).unwrap();
    assert_eq!(fixture.ledger.balance("tenant-solvent").await.unwrap(), balance_after_two_days);

    assert_eq!(fixture.suspension_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn certify_clamp_and_suspension_on_insolvency() {
    let fixture = CronFixture::build().await;
    let sweep_date = NaiveDate::from_ymd_opt(2026, 7, 19).unwrap();

    fixture.bot_repository.create(&forge_bot("bot-poor", "tenant-broke")).await.unwrap();
    // Solo 10¢ disponibles frente a un costo diario de 17¢.
    fixture
        .ledger
        .credit("tenant-broke", Credit::from_cents(10).unwrap(), TransactionType::Promo, "crumbs", None)
        .await
        .unwrap();

    let sweep = fixture.cron().run_daily_sweep(sweep_date).await;
    assert_eq!(sweep.suspended, vec!["tenant-broke".to_string()]);
    assert!(sweep.debited.is_empty());

    // El clamp drenó lo disponible a cero y el hook de suspensión corrió.
    assert!(fixture.ledger.balance("tenant-broke").await.unwrap().is_zero());
    assert_eq!(fixture.suspension_count.load(Ordering::SeqCst), 1);

    // Re-barrido del mismo día: el reference sellado convierte el
    // débito en replay y el hook de suspensión no vuelve a disparar.
    let rerun = fixture.cron().run_daily_sweep(sweep_date).await;
    assert_eq!(rerun.debited, vec!["tenant-broke".to_string()]);
    assert!(fixture.ledger.balance("tenant-broke").await.unwrap().is_zero());
    assert_eq!(fixture.suspension_count.load(Ordering::SeqCst), 1);
}
