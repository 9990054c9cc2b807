// [tests/mirror/apps/orchestrator/services/snapshot_vault.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: SNAPSHOT VAULT
 * CERTIFICA: captura tar + metadatos, escudo de ids, restauración
 *            byte-fiel y el rollback del pivote ante fallo.
 * =================================================================
 */

use std::sync::Arc;
use tempfile::TempDir;
use wopr_domain_models::SnapshotTrigger;
use wopr_infra_db::repositories::SnapshotRepository;
use wopr_infra_db::TursoClient;
use wopr_orchestrator::services::{SnapshotError, SnapshotVault};

struct VaultFixture {
    vault: SnapshotVault,
    workspace: TempDir,
}

async fn build_fixture() -> VaultFixture {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    let workspace = TempDir::new().expect("workspace");
    let vault = SnapshotVault::new(
        Arc::new(SnapshotRepository::new(client)),
        workspace.path().join("snapshots"),
    );
    VaultFixture { vault, workspace }
}

fn seed_state_dir(fixture: &VaultFixture, name: &str) -> std::path::PathBuf {
    let state_dir = fixture.workspace.path().join(name);
    std::fs::create_dir_all(&state_dir).unwrap();
    std::fs::write(state_dir.join("config.json"), br#"{"persona":"companion"}"#).unwrap();
    std::fs::write(state_dir.join("memory.db"), b"conversational residue").unwrap();
    state_dir
}

#[tokio::test]
async fn certify_create_then_restore_round_trip() {
    let fixture = build_fixture().await;
    let source_dir = seed_state_dir(&fixture, "bot-42-home");

    let record = fixture
        .vault
        .create("bot-42", "operator-1", &source_dir, SnapshotTrigger::Manual, vec!["voice".into()])
        .await
        .unwrap();

    assert!(std::path::Path::new(&record.storage_path).exists());
    assert!(!record.config_hash.is_empty());
    assert!(record.size_mb >= 0.0);
    assert_eq!(fixture.vault.count("bot-42").await.unwrap(), 1);

    // Restauración sobre un destino con contenido previo.
    let destination_dir = fixture.workspace.path().join("bot-42-restored");
    std::fs::create_dir_all(&destination_dir).unwrap();
    std::fs::write(destination_dir.join("stale.txt"), b"previous life").unwrap();

    fixture.vault.restore(&record.id, &destination_dir).await.unwrap();

    // El árbol restaurado reproduce los bytes capturados.
    assert_eq!(
        std::fs::read(destination_dir.join("memory.db")).unwrap(),
        b"conversational residue"
    );
    assert_eq!(
        std::fs::read(destination_dir.join("config.json")).unwrap(),
        br#"{"persona":"companion"}"#
    );
    // El contenido previo fue apartado y purgado con el pivote.
    assert!(!destination_dir.join("stale.txt").exists());
}

#[tokio::test]
async fn certify_unsafe_instance_id_shield() {
    let fixture = build_fixture().await;
    let source_dir = seed_state_dir(&fixture, "innocent-home");

    for hostile_id in ["../escape", "bot;rm", "bot/nested", ""] {
        let rejection = fixture
            .vault
            .create(hostile_id, "operator-1", &source_dir, SnapshotTrigger::Manual, Vec::new())
            .await;
        assert!(matches!(rejection, Err(SnapshotError::UnsafeInstanceId(_))), "{}", hostile_id);
    }
}

#[tokio::test]
async fn certify_restore_rollback_preserves_destination() {
    let fixture = build_fixture().await;
    let source_dir = seed_state_dir(&fixture, "bot-frail-home");

    let record = fixture
        .vault
        .create("bot-frail", "operator-1", &source_dir, SnapshotTrigger::PreRestore, Vec::new())
        .await
        .unwrap();

    // Sabotaje: el artefacto desaparece del disco.
    std::fs::remove_file(&record.storage_path).unwrap();

    let destination_dir = fixture.workspace.path().join("bot-frail-live");
    std::fs::create_dir_all(&destination_dir).unwrap();
    std::fs::write(destination_dir.join("precious.txt"), b"do not lose").unwrap();

    let failed_restore = fixture.vault.restore(&record.id, &destination_dir).await;
    assert!(failed_restore.is_err());

    // El pivote de seguridad restituyó el destino original.
    assert_eq!(std::fs::read(destination_dir.join("precious.txt")).unwrap(), b"do not lose");
}

#[tokio::test]
async fn certify_metadata_queries_and_deletion() {
    let fixture = build_fixture().await;
    let source_dir = seed_state_dir(&fixture, "bot-meta-home");

    let first = fixture
        .vault
        .create("bot-meta", "operator-1", &source_dir, SnapshotTrigger::Scheduled, Vec::new())
        .await
        .unwrap();
    let _second = fixture
        .vault
        .create("bot-meta", "operator-1", &source_dir, SnapshotTrigger::Scheduled, Vec::new())
        .await
        .unwrap();

    assert_eq!(fixture.vault.count("bot-meta").await.unwrap(), 2);
    assert_eq!(fixture.vault.get_oldest("bot-meta", 1).await.unwrap().len(), 1);
    assert!(fixture.vault.get(&first.id).await.unwrap().is_some());

    // El borrado de la fila arrastra su tar (la fila es la dueña).
    fixture.vault.delete(&first.id).await.unwrap();
    assert!(!std::path::Path::new(&first.storage_path).exists());
    assert_eq!(fixture.vault.count("bot-meta").await.unwrap(), 1);
    assert!(matches!(
        fixture.vault.delete(&first.id).await,
        Err(SnapshotError::SnapshotNotFound(_))
    ));
}
