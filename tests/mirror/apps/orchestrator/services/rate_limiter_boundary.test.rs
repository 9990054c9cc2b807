// [tests/mirror/apps/orchestrator/services/rate_limiter_boundary.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: GATEWAY RATE LIMITER
 * CERTIFICA: N pasa / N+1 es 429, el avance de ventana rehabilita y
 *            el aislamiento entre tenants y capacidades.
 * =================================================================
 */

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use wopr_domain_models::Capability;
use wopr_infra_db::repositories::RateLimitRepository;
use wopr_infra_db::TursoClient;
use wopr_orchestrator::services::GatewayRateLimiter;

async fn build_limiter(llm_limit: i64) -> GatewayRateLimiter {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    GatewayRateLimiter::new(Arc::new(RateLimitRepository::new(client)))
        .with_limit(Capability::Llm, llm_limit)
}

#[tokio::test]
async fn certify_four_calls_three_pass_scenario() {
    // Configuración del escenario: llm 3/min.
    let limiter = build_limiter(3).await;
    let moment = Utc.with_ymd_and_hms(2026, 7, 19, 12, 0, 30).unwrap();

    let mut verdicts = Vec::new();
    for _ in 0..4 {
        verdicts.push(limiter.check("tenant-a", Capability::Llm, moment).await.unwrap());
    }

    assert_eq!(
        verdicts.iter().map(|decision| decision.allowed).collect::<Vec<_>>(),
        vec![true, true, true, false]
    );

    // La cuarta respuesta porta el material de las cabeceras 429.
    let denied = &verdicts[3];
    assert_eq!(denied.limit, 3);
    assert_eq!(denied.remaining, 0);
    assert!(denied.reset_epoch > moment.timestamp());
    assert!(denied.reset_epoch <= moment.timestamp() + 60);
}

#[tokio::test]
async fn certify_window_advance_rehabilitates() {
    let limiter = build_limiter(1).await;
    let moment = Utc.with_ymd_and_hms(2026, 7, 19, 12, 0, 59).unwrap();

    assert!(limiter.check("tenant-a", Capability::Llm, moment).await.unwrap().allowed);
    assert!(!limiter.check("tenant-a", Capability::Llm, moment).await.unwrap().allowed);

    // Un segundo después la ventana avanzó: la petición pasa.
    let next_window = moment + Duration::seconds(1);
    assert!(limiter.check("tenant-a", Capability::Llm, next_window).await.unwrap().allowed);
}

#[tokio::test]
async fn certify_tenant_and_capability_isolation() {
    let limiter = build_limiter(1).await;
    let moment = Utc.with_ymd_and_hms(2026, 7, 19, 12, 0, 10).unwrap();

    assert!(limiter.check("tenant-a", Capability::Llm, moment).await.unwrap().allowed);
    assert!(!limiter.check("tenant-a", Capability::Llm, moment).await.unwrap().allowed);

    // Otro tenant y otra capacidad conservan su cupo propio.
    assert!(limiter.check("tenant-b", Capability::Llm, moment).await.unwrap().allowed);
    assert!(limiter.check("tenant-a", Capability::ImageGen, moment).await.unwrap().allowed);
}
