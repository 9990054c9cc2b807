// [tests/mirror/apps/orchestrator/services/spending_sentinel.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: SPENDING SENTINEL
 * CERTIFICA: bloqueo por tope duro (diario y por capacidad), la
 *            sonda mínima sobre el límite, el gasto del buffer vivo
 *            y la cadencia de alertas (una por umbral por día).
 * =================================================================
 */

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use wopr_core_credit::Credit;
use wopr_domain_models::{CapScope, CapThresholds, Capability, MeterEvent, SpendingLimits};
use wopr_infra_db::repositories::{
    AuditRepository, MeterRepository, SpendingLimitRepository,
};
use wopr_infra_db::TursoClient;
use wopr_infra_meter::{MeterEmitter, MeterPipelineConfig};
use wopr_orchestrator::services::SpendingSentinel;

struct SentinelFixture {
    client: TursoClient,
    meter_repository: Arc<MeterRepository>,
    spending_repository: Arc<SpendingLimitRepository>,
    emitter: Arc<MeterEmitter>,
    sentinel: SpendingSentinel,
    _journal_dir: TempDir,
}

async fn build_fixture() -> SentinelFixture {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    let meter_repository = Arc::new(MeterRepository::new(client.clone()));
    let spending_repository = Arc::new(SpendingLimitRepository::new(client.clone()));
    let journal_dir = TempDir::new().expect("journal dir");
    let emitter = Arc::new(MeterEmitter::new(
        Arc::clone(&meter_repository),
        MeterPipelineConfig::with_data_dir(journal_dir.path()),
    ));
    let sentinel = SpendingSentinel::new(
        Arc::clone(&spending_repository),
        Arc::clone(&meter_repository),
        Arc::clone(&emitter),
        Arc::new(AuditRepository::new(client.clone())),
    );
    SentinelFixture {
        client,
        meter_repository,
        spending_repository,
        emitter,
        sentinel,
        _journal_dir: journal_dir,
    }
}

fn forge_event(tenant: &str, capability: Capability, charge_cents: u64) -> MeterEvent {
    MeterEvent::forge(
        tenant,
        Credit::from_cents(charge_cents / 2).unwrap(),
        Credit::from_cents(charge_cents).unwrap(),
        capability,
        "openrouter",
    )
}

fn daily_capped(hard_cap_cents: u64) -> SpendingLimits {
    SpendingLimits {
        daily: CapThresholds {
            alert_at: None,
            hard_cap: Some(Credit::from_cents(hard_cap_cents).unwrap()),
        },
        monthly: CapThresholds::default(),
        per_capability: HashMap::new(),
    }
}

#[tokio::test]
async fn certify_daily_hard_cap_block() {
    let fixture = build_fixture().await;
    fixture
        .spending_repository
        .store("tenant-a", &daily_capped(100))
        .await
        .unwrap();

    // 99.5¢ gastados + 1¢ de sonda > 100¢ -> bloqueo de ámbito diario.
    let mut nearly_capped = forge_event("tenant-a", Capability::Llm, 99);
    nearly_capped.charge = Credit::from_raw(995_000_000).unwrap();
    fixture.meter_repository.insert_batch(&[nearly_capped]).await.unwrap();

    let block = fixture
        .sentinel
        .check("tenant-a", Capability::Llm, Utc::now())
        .await
        .unwrap()
        .expect("hard cap must block");
    assert_eq!(block.scope, CapScope::Daily);
    assert_eq!(block.cap_raw, Credit::from_cents(100).unwrap().raw());

    // Con gasto holgado el centinela no interviene.
    fixture
        .spending_repository
        .store("tenant-a", &daily_capped(10_000))
        .await
        .unwrap();
    assert!(fixture
        .sentinel
        .check("tenant-a", Capability::Llm, Utc::now())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn certify_live_buffer_counts_toward_cap() {
    let fixture = build_fixture().await;
    fixture
        .spending_repository
        .store("tenant-b", &daily_capped(100))
        .await
        .unwrap();

    // El gasto vive SOLO en el buffer del emisor (aún sin cristalizar).
    fixture.emitter.emit(forge_event("tenant-b", Capability::Llm, 100)).await;

    let block = fixture
        .sentinel
        .check("tenant-b", Capability::Llm, Utc::now())
        .await
        .unwrap();
    assert!(block.is_some(), "buffered charge must count toward the cap");
}

#[tokio::test]
async fn certify_capability_scope_block() {
    let fixture = build_fixture().await;
    let limits = SpendingLimits {
        daily: CapThresholds::default(),
        monthly: CapThresholds::default(),
        per_capability: HashMap::from([(
            Capability::ImageGen,
            CapThresholds { alert_at: None, hard_cap: Some(Credit::from_cents(50).unwrap()) },
        )]),
    };
    fixture.spending_repository.store("tenant-c", &limits).await.unwrap();

    fixture
        .meter_repository
        .insert_batch(&[forge_event("tenant-c", Capability::ImageGen, 50)])
        .await
        .unwrap();

    // imageGen bloqueado por su tope propio; llm sigue libre.
    let image_block = fixture
        .sentinel
        .check("tenant-c", Capability::ImageGen, Utc::now())
        .await
        .unwrap()
        .expect("capability cap must block");
    assert_eq!(image_block.scope, CapScope::Capability);
    assert!(fixture
        .sentinel
        .check("tenant-c", Capability::Llm, Utc::now())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn certify_alert_emitted_once_per_day() {
    let fixture = build_fixture().await;
    let limits = SpendingLimits {
        daily: CapThresholds {
            alert_at: Some(Credit::from_cents(10).unwrap()),
            hard_cap: None,
        },
        monthly: CapThresholds::default(),
        per_capability: HashMap::new(),
    };
    fixture.spending_repository.store("tenant-d", &limits).await.unwrap();
    fixture
        .meter_repository
        .insert_batch(&[forge_event("tenant-d", Capability::Llm, 20)])
        .await
        .unwrap();

    // Tres pasadas sobre el umbral: una sola alerta en el rastro.
    for _ in 0..3 {
        assert!(fixture
            .sentinel
            .check("tenant-d", Capability::Llm, Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    let connection = fixture.client.get_connection().unwrap();
    let mut rows = connection
        .query(
            "SELECT COUNT(*) FROM audit_log WHERE action = 'spend.alert' AND subject = 'tenant-d'",
            (),
        )
        .await
        .unwrap();
    let alert_count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert_eq!(alert_count, 1);
}
