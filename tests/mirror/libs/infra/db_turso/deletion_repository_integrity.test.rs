// [tests/mirror/libs/infra/db_turso/deletion_repository_integrity.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: DELETION FLOW (30-DAY GRACE)
 * CERTIFICA: gracia de 30 días, cancel/markCompleted como no-ops
 *            fuera de pending y el barrido de expiradas.
 * =================================================================
 */

use chrono::{Duration, Utc};
use libsql::params;
use wopr_domain_models::DeletionStatus;
use wopr_infra_db::repositories::DeletionRepository;
use wopr_infra_db::TursoClient;

async fn memory_pair() -> (TursoClient, DeletionRepository) {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    let repository = DeletionRepository::new(client.clone());
    (client, repository)
}

#[tokio::test]
async fn certify_grace_window_and_cancellation() {
    let (_client, repository) = memory_pair().await;

    let request = repository.create("tenant-doomed", "operator-1").await.unwrap();
    assert_eq!(request.status, DeletionStatus::Pending);
    let grace = request.delete_after - request.created_at;
    assert_eq!(grace.num_days(), 30);

    // Recién creada no aparece como expirada.
    assert!(repository.find_expired().await.unwrap().is_empty());

    // Cancelación muta una sola vez; el segundo intento es no-op.
    assert!(repository.cancel(&request.id, "tenant regretted").await.unwrap());
    assert!(!repository.cancel(&request.id, "double tap").await.unwrap());

    let cancelled = repository.find(&request.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, DeletionStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("tenant regretted"));

    // markCompleted sobre cancelada: no-op.
    assert!(!repository
        .mark_completed(&request.id, &serde_json::json!({ "late": true }))
        .await
        .unwrap());
}

#[tokio::test]
async fn certify_expired_sweep_and_completion() {
    let (client, repository) = memory_pair().await;
    let request = repository.create("tenant-expired", "operator-1").await.unwrap();

    // Envejecimiento artificial: la gracia expiró ayer.
    let past = (Utc::now() - Duration::days(31)).to_rfc3339();
    client
        .get_connection()
        .unwrap()
        .execute(
            "UPDATE deletion_requests SET delete_after = ?1 WHERE id = ?2",
            params![past, request.id.clone()],
        )
        .await
        .unwrap();

    let expired = repository.find_expired().await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, request.id);

    // Reintento fallido: el contador crece y la fila sigue pending.
    repository.increment_failed(&request.id).await.unwrap();
    assert_eq!(repository.find_expired().await.unwrap().len(), 1);

    // Sello final con resumen.
    assert!(repository
        .mark_completed(&request.id, &serde_json::json!({ "bots_removed": 3 }))
        .await
        .unwrap());
    let completed = repository.find(&request.id).await.unwrap().unwrap();
    assert_eq!(completed.status, DeletionStatus::Completed);
    assert!(completed.completion_summary.is_some());
    assert!(repository.find_expired().await.unwrap().is_empty());
}
