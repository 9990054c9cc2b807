// [tests/mirror/libs/domain/ledger/credit_ledger_integrity.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: CREDIT LEDGER ENGINE
 * CERTIFICA: S1 (signup -> llamada -> débito), S2 (webhook
 *            idempotente), frontera de insuficiencia y la
 *            linealización por tenant bajo concurrencia.
 * =================================================================
 */

use std::sync::Arc;
use wopr_core_credit::Credit;
use wopr_domain_ledger::{CreditLedger, LedgerError};
use wopr_domain_models::TransactionType;
use wopr_infra_db::repositories::ledger::HistoryFilter;
use wopr_infra_db::repositories::LedgerRepository;
use wopr_infra_db::TursoClient;

async fn memory_ledger() -> Arc<CreditLedger> {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    Arc::new(CreditLedger::new(Arc::new(LedgerRepository::new(client))))
}

#[tokio::test]
async fn certify_signup_call_debit_scenario() {
    let ledger = memory_ledger().await;

    // Alta con 500 centavos de regalo.
    ledger
        .credit("T", Credit::from_cents(500).unwrap(), TransactionType::SignupGrant, "signup", None)
        .await
        .unwrap();

    // Cargo del gateway: $0.0026 con reference = id del evento medido.
    ledger
        .debit("T", Credit::from_raw(2_600_000).unwrap(), TransactionType::AdapterUsage, "chat via p", Some("E1"))
        .await
        .unwrap();

    let expected = Credit::from_cents(500)
        .unwrap()
        .checked_sub(Credit::from_raw(2_600_000).unwrap())
        .unwrap();
    assert_eq!(ledger.balance("T").await.unwrap(), expected);

    let history = ledger.history("T", &HistoryFilter::default()).await.unwrap();
    let debits: Vec<_> = history
        .iter()
        .filter(|transaction| transaction.reference_id.as_deref() == Some("E1"))
        .collect();
    assert_eq!(debits.len(), 1);
}

#[tokio::test]
async fn certify_idempotent_webhook_scenario() {
    let ledger = memory_ledger().await;

    assert!(!ledger.has_reference_id("stripe_evt_1").await.unwrap());

    // La misma acreditación llega dos veces (replay del proveedor).
    for _ in 0..2 {
        ledger
            .credit(
                "T",
                Credit::from_cents(1000).unwrap(),
                TransactionType::Purchase,
                "stripe top-up",
                Some("stripe_evt_1"),
            )
            .await
            .unwrap();
    }

    assert_eq!(ledger.balance("T").await.unwrap(), Credit::from_cents(1000).unwrap());
    assert_eq!(ledger.history("T", &HistoryFilter::default()).await.unwrap().len(), 1);
    assert!(ledger.has_reference_id("stripe_evt_1").await.unwrap());
}

#[tokio::test]
async fn certify_insufficiency_boundary() {
    let ledger = memory_ledger().await;
    ledger
        .credit("T", Credit::from_cents(100).unwrap(), TransactionType::Promo, "promo", None)
        .await
        .unwrap();

    // El débito del balance exacto prospera; una unidad cruda más falla.
    let exact = Credit::from_cents(100).unwrap();
    let one_raw_over = exact.checked_add(Credit::from_raw(1).unwrap()).unwrap();

    assert!(matches!(
        ledger.debit("T", one_raw_over, TransactionType::AdapterUsage, "over", None).await,
        Err(LedgerError::InsufficientBalance { .. })
    ));
    ledger.debit("T", exact, TransactionType::AdapterUsage, "exact", None).await.unwrap();
    assert!(ledger.balance("T").await.unwrap().is_zero());
}

#[tokio::test]
async fn certify_negative_amount_rejection() {
    let ledger = memory_ledger().await;
    let negative = Credit::from_raw(-5).unwrap();

    assert!(matches!(
        ledger.credit("T", negative, TransactionType::Promo, "bad", None).await,
        Err(LedgerError::NegativeAmount)
    ));
    assert!(matches!(
        ledger.debit("T", negative, TransactionType::AdapterUsage, "bad", None).await,
        Err(LedgerError::NegativeAmount)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn certify_linearized_concurrent_debits() {
    let ledger = memory_ledger().await;
    ledger
        .credit("T", Credit::from_cents(50).unwrap(), TransactionType::Promo, "seed", None)
        .await
        .unwrap();

    // Diez débitos concurrentes de 10 centavos contra 50 disponibles:
    // exactamente cinco deben prosperar (invariante balance ≥ 0).
    let mut contenders = Vec::new();
    for contender_index in 0..10 {
        let contender_ledger = Arc::clone(&ledger);
        contenders.push(tokio::spawn(async move {
            contender_ledger
                .debit(
                    "T",
                    Credit::from_cents(10).unwrap(),
                    TransactionType::AdapterUsage,
                    &format!("burst {}", contender_index),
                    None,
                )
                .await
                .is_ok()
        }));
    }

    let mut successes = 0;
    for contender in contenders {
        if contender.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 5);
    assert!(ledger.balance("T").await.unwrap().is_zero());
}
