// [tests/mirror/apps/orchestrator/services/deletion_cron.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: DELETION CRON
 * CERTIFICA: ejecución del borrado tras la gracia, el sello
 *            'completed' y el reintento de fallos en el ciclo
 *            siguiente sin mutar el estado.
 * =================================================================
 */

use chrono::{Duration, Utc};
use libsql::params;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wopr_domain_models::DeletionStatus;
use wopr_infra_db::repositories::DeletionRepository;
use wopr_infra_db::TursoClient;
use wopr_orchestrator::services::deletion_cron::{DeletionCron, DeletionExecutor};

struct CronFixture {
    client: TursoClient,
    repository: Arc<DeletionRepository>,
}

async fn build_fixture() -> CronFixture {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    let repository = Arc::new(DeletionRepository::new(client.clone()));
    CronFixture { client, repository }
}

async fn age_request(fixture: &CronFixture, request_id: &str) {
    let past = (Utc::now() - Duration::days(31)).to_rfc3339();
    fixture
        .client
        .get_connection()
        .unwrap()
        .execute(
            "UPDATE deletion_requests SET delete_after = ?1 WHERE id = ?2",
            params![past, request_id],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn certify_expired_request_completion() {
    let fixture = build_fixture().await;
    let request = fixture.repository.create("tenant-gone", "operator-1").await.unwrap();
    age_request(&fixture, &request.id).await;

    let executed_tenants = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let executor_log = Arc::clone(&executed_tenants);
    let executor: DeletionExecutor = Arc::new(move |tenant_id: String| {
        let executor_log = Arc::clone(&executor_log);
        Box::pin(async move {
            executor_log.lock().unwrap().push(tenant_id.clone());
            Ok(serde_json::json!({ "tenant": tenant_id, "bots_removed": 2 }))
        })
    });

    let cron = DeletionCron::new(Arc::clone(&fixture.repository), executor);
    let cycle = cron.run_cycle().await;
    assert_eq!(cycle.completed, 1);
    assert_eq!(cycle.failed, 0);
    assert_eq!(executed_tenants.lock().unwrap().as_slice(), ["tenant-gone".to_string()]);

    let sealed = fixture.repository.find(&request.id).await.unwrap().unwrap();
    assert_eq!(sealed.status, DeletionStatus::Completed);
    assert!(sealed.completion_summary.is_some());

    // Ciclo siguiente: nada pendiente, el ejecutor no vuelve a correr.
    let idle_cycle = cron.run_cycle().await;
    assert_eq!(idle_cycle.completed + idle_cycle.failed, 0);
    assert_eq!(executed_tenants.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn certify_failure_leaves_pending_for_retry() {
    let fixture = build_fixture().await;
    let request = fixture.repository.create("tenant-sticky", "operator-1").await.unwrap();
    age_request(&fixture, &request.id).await;

    let attempt_counter = Arc::new(AtomicUsize::new(0));
    let executor_attempts = Arc::clone(&attempt_counter);
    let flaky_executor: DeletionExecutor = Arc::new(move |tenant_id: String| {
        let executor_attempts = Arc::clone(&executor_attempts);
        Box::pin(async move {
            // Primer intento colapsa; el segundo prospera.
            if executor_attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("object storage unreachable".to_string())
            } else {
                Ok(serde_json::json!({ "tenant": tenant_id }))
            }
        })
    });

    let cron = DeletionCron::new(Arc::clone(&fixture.repository), flaky_executor);

    let first_cycle = cron.run_cycle().await;
    assert_eq!(first_cycle.failed, 1);
    let still_pending = fixture.repository.find(&request.id).await.unwrap().unwrap();
    assert_eq!(still_pending.status, DeletionStatus::Pending);

    let second_cycle = cron.run_cycle().await;
    assert_eq!(second_cycle.completed, 1);
    let sealed = fixture.repository.find(&request.id).await.unwrap().unwrap();
    assert_eq!(sealed.status, DeletionStatus::Completed);
}
