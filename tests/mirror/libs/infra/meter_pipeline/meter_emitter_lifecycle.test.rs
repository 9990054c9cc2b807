// [tests/mirror/libs/infra/meter_pipeline/meter_emitter_lifecycle.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: METER EMITTER (WAL -> DB -> DLQ)
 * CERTIFICA: durabilidad WAL, compactación tras COMMIT, replay en
 *            reinicio, destierro a DLQ y el sello post-close.
 * =================================================================
 */

use std::sync::Arc;
use tempfile::TempDir;
use wopr_core_credit::Credit;
use wopr_domain_models::{Capability, MeterEvent};
use wopr_infra_db::repositories::MeterRepository;
use wopr_infra_db::TursoClient;
use wopr_infra_meter::{MeterEmitter, MeterPipelineConfig};

fn forge_event(tenant: &str, charge_raw: i64) -> MeterEvent {
    MeterEvent::forge(
        tenant,
        Credit::from_raw(charge_raw / 2).unwrap(),
        Credit::from_raw(charge_raw).unwrap(),
        Capability::Llm,
        "openrouter",
    )
}

struct PipelineFixture {
    client: TursoClient,
    repository: Arc<MeterRepository>,
    emitter: Arc<MeterEmitter>,
    _journal_dir: TempDir,
    config: MeterPipelineConfig,
}

async fn build_fixture(max_retries: u32) -> PipelineFixture {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    let repository = Arc::new(MeterRepository::new(client.clone()));
    let journal_dir = TempDir::new().expect("journal dir");
    let mut config = MeterPipelineConfig::with_data_dir(journal_dir.path());
    config.max_retries = max_retries;
    let emitter = Arc::new(MeterEmitter::new(Arc::clone(&repository), config.clone()));
    PipelineFixture { client, repository, emitter, _journal_dir: journal_dir, config }
}

#[tokio::test]
async fn certify_wal_then_commit_then_compaction() {
    let fixture = build_fixture(3).await;

    let event_alpha = forge_event("tenant-a", 2_600_000);
    let event_beta = forge_event("tenant-a", 1_000_000);
    fixture.emitter.emit(event_alpha.clone()).await;
    fixture.emitter.emit(event_beta.clone()).await;

    // Antes del flush: dos líneas durables en el journal.
    let journal_before = std::fs::read_to_string(&fixture.config.wal_path).unwrap();
    assert_eq!(journal_before.lines().count(), 2);
    assert_eq!(fixture.emitter.buffered_charge("tenant-a").await.raw(), 3_600_000);

    fixture.emitter.flush().await;

    // Tras el COMMIT: filas cristalizadas y journal compactado a vacío.
    let persisted = fixture.repository.find_event(&event_alpha.id).await.unwrap();
    assert!(persisted.is_some());
    let journal_after = std::fs::read_to_string(&fixture.config.wal_path).unwrap();
    assert!(journal_after.trim().is_empty());
    assert!(fixture.emitter.buffered_charge("tenant-a").await.is_zero());

    // Replay post-commit del mismo id: INSERT OR IGNORE -> una sola fila.
    fixture.emitter.emit(event_alpha.clone()).await;
    fixture.emitter.flush().await;
    let replayed = fixture.repository.find_event(&event_alpha.id).await.unwrap().unwrap();
    assert_eq!(replayed.charge.raw(), 2_600_000);
}

#[tokio::test]
async fn certify_replay_after_restart() {
    let fixture = build_fixture(3).await;

    let stranded_event = forge_event("tenant-r", 500_000);
    fixture.emitter.emit(stranded_event.clone()).await;
    // Simulación de crash: el proceso muere sin flush; el emisor nuevo
    // rehidrata desde el journal del mismo directorio.
    let reborn_emitter = MeterEmitter::new(Arc::clone(&fixture.repository), fixture.config.clone());
    let replayed = reborn_emitter.replay_wal().await.unwrap();
    assert_eq!(replayed, 1);

    reborn_emitter.flush().await;
    assert!(fixture.repository.find_event(&stranded_event.id).await.unwrap().is_some());
}

#[tokio::test]
async fn certify_dlq_banishment_and_db_isolation() {
    let fixture = build_fixture(0).await;

    // Sabotaje del sustrato: el lote no puede cristalizar.
    fixture
        .client
        .get_connection()
        .unwrap()
        .execute("DROP TABLE meter_events", ())
        .await
        .unwrap();

    let doomed_event = forge_event("tenant-d", 700_000);
    fixture.emitter.emit(doomed_event.clone()).await;
    // Primer flush falla (retries pasa a 1 > max 0) -> destierro a DLQ.
    fixture.emitter.flush().await;

    let dlq_content = std::fs::read_to_string(&fixture.config.dlq_path).unwrap();
    assert_eq!(dlq_content.lines().count(), 1);
    assert!(dlq_content.contains(&doomed_event.id));

    // El buffer quedó limpio y el journal compactado.
    assert!(fixture.emitter.buffered_charge("tenant-d").await.is_zero());
    let journal = std::fs::read_to_string(&fixture.config.wal_path).unwrap();
    assert!(journal.trim().is_empty());
}

#[tokio::test]
async fn certify_emit_after_close_is_silent_drop() {
    let fixture = build_fixture(3).await;

    let final_event = forge_event("tenant-f", 300_000);
    fixture.emitter.emit(final_event.clone()).await;
    fixture.emitter.close().await;

    // El close ejecutó una descarga final.
    assert!(fixture.repository.find_event(&final_event.id).await.unwrap().is_some());

    // Emisión post-sello: descarte silencioso, sin journal nuevo.
    let ghost_event = forge_event("tenant-f", 999_999);
    fixture.emitter.emit(ghost_event.clone()).await;
    fixture.emitter.flush().await;
    assert!(fixture.repository.find_event(&ghost_event.id).await.unwrap().is_none());
}
