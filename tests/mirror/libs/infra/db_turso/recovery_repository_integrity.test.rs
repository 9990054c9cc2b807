// [tests/mirror/libs/infra/db_turso/recovery_repository_integrity.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: RECOVERY LEDGER (COUNT CONSERVATION)
 * CERTIFICA: recovered + failed + waiting == total en todo cierre;
 *            'completed' exige residuo cero.
 * =================================================================
 */

use chrono::Utc;
use uuid::Uuid;
use wopr_domain_models::{RecoveryEventStatus, RecoveryItem, RecoveryItemStatus, RecoveryTrigger};
use wopr_infra_db::repositories::RecoveryRepository;
use wopr_infra_db::TursoClient;

async fn memory_repository() -> RecoveryRepository {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    RecoveryRepository::new(client)
}

fn forge_item(event_id: &str, ordinal: usize, status: RecoveryItemStatus, reason: Option<&str>) -> RecoveryItem {
    RecoveryItem {
        id: format!("item-{:02}-{}", ordinal, Uuid::new_v4()),
        event_id: event_id.to_string(),
        tenant: format!("tenant-{}", ordinal),
        bot_id: format!("bot-{}", ordinal),
        source_node: "node-lost".to_string(),
        target_node: match status {
            RecoveryItemStatus::Recovered => Some("node-haven".to_string()),
            _ => None,
        },
        backup_key: None,
        status,
        reason: reason.map(str::to_string),
        started_at: Utc::now(),
        completed_at: None,
    }
}

#[tokio::test]
async fn certify_completed_closure() {
    let repository = memory_repository().await;
    let event = repository.open_event("node-lost", RecoveryTrigger::Auto, 2).await.unwrap();

    repository
        .append_item(&forge_item(&event.id, 0, RecoveryItemStatus::Recovered, None))
        .await
        .unwrap();
    repository
        .append_item(&forge_item(&event.id, 1, RecoveryItemStatus::Recovered, None))
        .await
        .unwrap();

    let sealed = repository.close_event(&event.id).await.unwrap();
    assert_eq!(sealed.status, RecoveryEventStatus::Completed);
    assert_eq!(sealed.tenants_recovered, 2);
    assert_eq!(sealed.tenants_failed + sealed.tenants_waiting, 0);
    assert_eq!(
        sealed.tenants_recovered + sealed.tenants_failed + sealed.tenants_waiting,
        sealed.tenants_total
    );
    assert!(sealed.completed_at.is_some());
}

#[tokio::test]
async fn certify_partial_closure_and_waiting_promotion() {
    let repository = memory_repository().await;
    let event = repository.open_event("node-lost", RecoveryTrigger::Drain, 3).await.unwrap();

    repository
        .append_item(&forge_item(&event.id, 0, RecoveryItemStatus::Recovered, None))
        .await
        .unwrap();
    repository
        .append_item(&forge_item(&event.id, 1, RecoveryItemStatus::Failed, Some("import rejected")))
        .await
        .unwrap();
    let waiting_item = forge_item(&event.id, 2, RecoveryItemStatus::Waiting, Some("no_capacity"));
    repository.append_item(&waiting_item).await.unwrap();

    let sealed = repository.close_event(&event.id).await.unwrap();
    assert_eq!(sealed.status, RecoveryEventStatus::Partial);
    assert_eq!(
        sealed.tenants_recovered + sealed.tenants_failed + sealed.tenants_waiting,
        sealed.tenants_total
    );

    // Solo el item en espera aparece en el barrido de reintento.
    let waiting = repository.waiting_items(&event.id).await.unwrap();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].id, waiting_item.id);

    // Promoción a recovered y cierre limpio.
    repository
        .update_item(&waiting_item.id, RecoveryItemStatus::Recovered, Some("node-haven"), None, None)
        .await
        .unwrap();
    let resealed = repository.close_event(&event.id).await.unwrap();
    assert_eq!(resealed.status, RecoveryEventStatus::Partial); // failed=1 persiste
    assert_eq!(resealed.tenants_recovered, 2);
    assert_eq!(resealed.tenants_waiting, 0);
}
