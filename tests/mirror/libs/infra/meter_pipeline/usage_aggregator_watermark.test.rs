// [tests/mirror/libs/infra/meter_pipeline/usage_aggregator_watermark.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: USAGE AGGREGATOR (WATERMARK DISCIPLINE)
 * CERTIFICA: roll-up por tupla (tenant, capability, provider),
 *            pliegue al periodo mensual e idempotencia del
 *            re-barrido tras la marca de agua.
 * =================================================================
 */

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use wopr_core_credit::Credit;
use wopr_domain_models::{Capability, MeterEvent};
use wopr_infra_db::repositories::MeterRepository;
use wopr_infra_db::TursoClient;
use wopr_infra_meter::aggregator::month_start;
use wopr_infra_meter::UsageAggregator;

fn forge_event_at(tenant: &str, charge_raw: i64, timestamp: chrono::DateTime<Utc>) -> MeterEvent {
    let mut event = MeterEvent::forge(
        tenant,
        Credit::from_raw(charge_raw / 2).unwrap(),
        Credit::from_raw(charge_raw).unwrap(),
        Capability::Llm,
        "openrouter",
    );
    event.timestamp = timestamp;
    event.duration_ms = Some(120);
    event
}

#[tokio::test]
async fn certify_rollup_and_idempotent_resweep() {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    let repository = Arc::new(MeterRepository::new(client));
    let aggregator = UsageAggregator::new(Arc::clone(&repository));

    let base_moment = Utc.with_ymd_and_hms(2026, 7, 19, 14, 30, 0).unwrap();
    repository
        .insert_batch(&[
            forge_event_at("tenant-a", 2_000_000, base_moment),
            forge_event_at("tenant-a", 3_000_000, base_moment + Duration::seconds(10)),
            forge_event_at("tenant-b", 1_000_000, base_moment + Duration::seconds(20)),
        ])
        .await
        .unwrap();

    let sweep_moment = base_moment + Duration::seconds(60);
    let folded_groups = aggregator.run_window_sweep(sweep_moment).await.unwrap();
    assert_eq!(folded_groups, 2); // (tenant-a, llm, openrouter) y (tenant-b, …)

    // El gasto agregado del periodo alimenta al centinela de topes.
    let period_spent = repository
        .spent_between("tenant-a", month_start(sweep_moment), sweep_moment, None)
        .await
        .unwrap();
    assert_eq!(period_spent.raw(), 5_000_000);

    // Re-barrido sin filas nuevas: cero grupos re-plegados.
    let refolded = aggregator.run_window_sweep(sweep_moment + Duration::seconds(60)).await.unwrap();
    assert_eq!(refolded, 0);

    // Una fila nueva posterior a la marca sí se pliega.
    repository
        .insert_batch(&[forge_event_at("tenant-a", 500_000, sweep_moment + Duration::seconds(30))])
        .await
        .unwrap();
    let incremental = aggregator.run_window_sweep(sweep_moment + Duration::seconds(120)).await.unwrap();
    assert_eq!(incremental, 1);
}

#[tokio::test]
async fn certify_capability_scoped_spend() {
    let client = TursoClient::connect(":memory:", None).await.expect("memory strata");
    let repository = Arc::new(MeterRepository::new(client));

    let moment = Utc.with_ymd_and_hms(2026, 7, 19, 10, 0, 0).unwrap();
    let mut image_event = forge_event_at("tenant-a", 40_000_000, moment);
    image_event.capability = Capability::ImageGen;
    repository
        .insert_batch(&[forge_event_at("tenant-a", 2_000_000, moment), image_event])
        .await
        .unwrap();

    let llm_only = repository
        .spent_between("tenant-a", moment - Duration::hours(1), moment + Duration::hours(1), Some(Capability::Llm))
        .await
        .unwrap();
    assert_eq!(llm_only.raw(), 2_000_000);

    let everything = repository
        .spent_between("tenant-a", moment - Duration::hours(1), moment + Duration::hours(1), None)
        .await
        .unwrap();
    assert_eq!(everything.raw(), 42_000_000);
}
