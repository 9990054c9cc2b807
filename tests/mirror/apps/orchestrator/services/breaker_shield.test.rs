// [tests/mirror/apps/orchestrator/services/breaker_shield.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: CIRCUIT BREAKER SHIELD
 * CERTIFICA: disparo en el error (umbral+1) dentro de la ventana,
 *            rechazo durante la cuarentena, auto-sanado al expirar y
 *            el renacimiento del umbral tras el reinicio.
 * =================================================================
 */

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use wopr_infra_db::repositories::CircuitBreakerRepository;
use wopr_infra_db::TursoClient;
use wopr_orchestrator::services::breaker::{
    BreakerVerdict, CircuitBreakerShield, BREAKER_ERROR_THRESHOLD, BREAKER_RESET_AFTER_SECONDS,
};

async fn build_shield() -> CircuitBreakerShield {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    CircuitBreakerShield::new(Arc::new(CircuitBreakerRepository::new(client)))
}

#[tokio::test]
async fn certify_trip_on_threshold_breach() {
    let shield = build_shield().await;
    let moment = Utc.with_ymd_and_hms(2026, 7, 19, 12, 0, 5).unwrap();

    // Hasta el umbral exacto el circuito permanece cerrado.
    for _ in 0..BREAKER_ERROR_THRESHOLD {
        shield.record_failure("instance-1", moment).await.unwrap();
    }
    assert!(matches!(shield.guard("instance-1", moment).await.unwrap(), BreakerVerdict::Closed));

    // El error (umbral+1) dentro de la ventana abre el circuito.
    shield.record_failure("instance-1", moment).await.unwrap();
    let verdict = shield.guard("instance-1", moment).await.unwrap();
    assert!(matches!(verdict, BreakerVerdict::Open { retry_after_seconds } if retry_after_seconds >= 1));
}

#[tokio::test]
async fn certify_quarantine_then_self_heal() {
    let shield = build_shield().await;
    let moment = Utc.with_ymd_and_hms(2026, 7, 19, 12, 0, 5).unwrap();

    for _ in 0..=BREAKER_ERROR_THRESHOLD {
        shield.record_failure("instance-1", moment).await.unwrap();
    }
    assert!(matches!(
        shield.guard("instance-1", moment).await.unwrap(),
        BreakerVerdict::Open { .. }
    ));

    // Un instante antes del fin de la cuarentena: sigue abierto.
    let almost = moment + Duration::seconds(BREAKER_RESET_AFTER_SECONDS - 1);
    assert!(matches!(shield.guard("instance-1", almost).await.unwrap(), BreakerVerdict::Open { .. }));

    // Cuarentena cumplida: el circuito cierra y el estado renace.
    let healed = moment + Duration::seconds(BREAKER_RESET_AFTER_SECONDS + 1);
    assert!(matches!(shield.guard("instance-1", healed).await.unwrap(), BreakerVerdict::Closed));

    // Un error aislado tras el sanado no re-dispara.
    shield.record_failure("instance-1", healed).await.unwrap();
    assert!(matches!(shield.guard("instance-1", healed).await.unwrap(), BreakerVerdict::Closed));
}

#[tokio::test]
async fn certify_window_rollover_resets_count() {
    let shield = build_shield().await;
    let moment = Utc.with_ymd_and_hms(2026, 7, 19, 12, 0, 5).unwrap();

    // Umbral repartido entre dos ventanas: jamás dispara.
    for _ in 0..BREAKER_ERROR_THRESHOLD {
        shield.record_failure("instance-1", moment).await.unwrap();
    }
    let next_window = moment + Duration::seconds(10);
    for _ in 0..BREAKER_ERROR_THRESHOLD {
        shield.record_failure("instance-1", next_window).await.unwrap();
    }
    assert!(matches!(
        shield.guard("instance-1", next_window).await.unwrap(),
        BreakerVerdict::Closed
    ));
}
