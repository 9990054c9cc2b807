// [tests/mirror/libs/infra/db_turso/ledger_repository_integrity.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: LEDGER REPOSITORY (APPEND-ONLY GUARD)
 * CERTIFICA: unicidad de reference_id, Σ delta, historial
 *            newest-first y la sonda has_reference_id.
 * =================================================================
 */

use wopr_core_credit::Credit;
use wopr_domain_models::TransactionType;
use wopr_infra_db::repositories::ledger::{forge_transaction, HistoryFilter};
use wopr_infra_db::repositories::LedgerRepository;
use wopr_infra_db::{DbError, TursoClient};

async fn memory_repository() -> LedgerRepository {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    LedgerRepository::new(client)
}

#[tokio::test]
async fn certify_sum_of_deltas_is_balance() {
    let repository = memory_repository().await;

    let grant = forge_transaction(
        "tenant-a",
        Credit::from_cents(500).unwrap(),
        TransactionType::SignupGrant,
        "signup grant",
        None,
    );
    repository.append_transaction(&grant).await.unwrap();

    let usage = forge_transaction(
        "tenant-a",
        Credit::from_raw(-2_600_000).unwrap(),
        TransactionType::AdapterUsage,
        "chat call",
        Some("E1".to_string()),
    );
    repository.append_transaction(&usage).await.unwrap();

    let balance = repository.sum_deltas("tenant-a").await.unwrap();
    assert_eq!(balance.raw(), 5_000_000_000 - 2_600_000);

    // Tenants ajenos permanecen intactos.
    assert!(repository.sum_deltas("tenant-b").await.unwrap().is_zero());
}

#[tokio::test]
async fn certify_reference_id_uniqueness() {
    let repository = memory_repository().await;

    let first = forge_transaction(
        "tenant-a",
        Credit::from_cents(1000).unwrap(),
        TransactionType::Purchase,
        "stripe purchase",
        Some("stripe_evt_1".to_string()),
    );
    repository.append_transaction(&first).await.unwrap();

    // El replay con el mismo reference_id es rechazado por el índice.
    let replay = forge_transaction(
        "tenant-a",
        Credit::from_cents(1000).unwrap(),
        TransactionType::Purchase,
        "stripe purchase replay",
        Some("stripe_evt_1".to_string()),
    );
    assert!(matches!(
        repository.append_transaction(&replay).await,
        Err(DbError::DuplicateReference)
    ));

    assert!(repository.has_reference_id("stripe_evt_1").await.unwrap());
    assert!(!repository.has_reference_id("stripe_evt_2").await.unwrap());

    let sealed = repository.find_by_reference("stripe_evt_1").await.unwrap().unwrap();
    assert_eq!(sealed.id, first.id);
}

#[tokio::test]
async fn certify_history_newest_first_with_filter() {
    let repository = memory_repository().await;

    for (index, transaction_type) in
        [TransactionType::SignupGrant, TransactionType::Purchase, TransactionType::Promo]
            .iter()
            .enumerate()
    {
        let transaction = forge_transaction(
            "tenant-a",
            Credit::from_cents(100 + index as u64).unwrap(),
            *transaction_type,
            &format!("entry {}", index),
            None,
        );
        repository.append_transaction(&transaction).await.unwrap();
    }

    let full_history = repository.history("tenant-a", &HistoryFilter::default()).await.unwrap();
    assert_eq!(full_history.len(), 3);
    assert!(full_history[0].created_at >= full_history[2].created_at);

    let purchases_only = repository
        .history(
            "tenant-a",
            &HistoryFilter { transaction_type: Some(TransactionType::Purchase), limit: None, offset: None },
        )
        .await
        .unwrap();
    assert_eq!(purchases_only.len(), 1);
    assert_eq!(purchases_only[0].transaction_type, TransactionType::Purchase);
}
