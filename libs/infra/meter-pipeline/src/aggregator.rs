// [libs/infra/meter-pipeline/src/aggregator.rs]
/*!
 * =================================================================
 * APARATO: USAGE AGGREGATOR (V4.3 - WATERMARK SWEEPER)
 * CLASIFICACIÓN: INFRASTRUCTURE SERVICE (ESTRATO L3/L4)
 * RESPONSABILIDAD: ROLL-UP POR VENTANA DE 60s Y PERIODO MENSUAL
 *
 * # Mathematical Proof (Idempotent Folding):
 * El barrido solo consume filas con timestamp estrictamente posterior
 * a la marca de agua; como la marca avanza al máximo procesado dentro
 * del mismo ciclo, ninguna fila se pliega dos veces en los agregados.
 * =================================================================
 */

use crate::errors::MeterPipelineError;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use wopr_infra_db::repositories::MeterRepository;

/// Retraso de cortesía para no competir con inserciones en vuelo.
const SWEEP_LAG_SECONDS: i64 = 2;

pub struct UsageAggregator {
    meter_repository: Arc<MeterRepository>,
    aggregator_identifier: String,
}

impl UsageAggregator {
    #[must_use]
    pub fn new(meter_repository: Arc<MeterRepository>) -> Self {
        Self {
            meter_repository,
            aggregator_identifier: "usage-aggregator".to_string(),
        }
    }

    /**
     * Ejecuta un ciclo de agregación hasta `now` y avanza la marca.
     *
     * Retorna la cantidad de grupos plegados.
     */
    #[instrument(skip(self))]
    pub async fn run_window_sweep(&self, now: DateTime<Utc>) -> Result<usize, MeterPipelineError> {
        let watermark = self
            .meter_repository
            .load_watermark(&self.aggregator_identifier)
            .await?
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());

        let until = now - Duration::seconds(SWEEP_LAG_SECONDS);
        if until <= watermark {
            return Ok(0);
        }

        let groups = self.meter_repository.aggregate_groups_after(watermark, until).await?;
        if groups.is_empty() {
            self.meter_repository
                .store_watermark(&self.aggregator_identifier, until)
                .await?;
            return Ok(0);
        }

        let mut highest_processed = watermark;
        for group in &groups {
            let window_start = floor_to_minute(group.max_timestamp);
            let period_start = month_start(until);

            self.meter_repository.upsert_usage_summary(group, window_start).await?;
            self.meter_repository.upsert_billing_period_summary(group, period_start).await?;

            if group.max_timestamp > highest_processed {
                highest_processed = group.max_timestamp;
            }
        }

        self.meter_repository
            .store_watermark(&self.aggregator_identifier, highest_processed)
            .await?;

        debug!("📈 [AGGREGATOR]: {} groups folded; watermark -> {}.", groups.len(), highest_processed);
        Ok(groups.len())
    }

    /// Lanza el daemon de agregación (ventana = 60 s).
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            sweep_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!("📈 [AGGREGATOR]: Window sweeper daemon active (60s).");

            loop {
                sweep_ticker.tick().await;
                if let Err(sweep_fault) = self.run_window_sweep(Utc::now()).await {
                    tracing::error!("❌ [AGGREGATOR_FAULT]: Sweep collapsed: {}", sweep_fault);
                }
            }
        })
    }
}

/// Piso al minuto de la ventana de 60 s.
#[must_use]
pub fn floor_to_minute(moment: DateTime<Utc>) -> DateTime<Utc> {
    moment
        .with_second(0)
        .and_then(|truncated| truncated.with_nanosecond(0))
        .unwrap_or(moment)
}

/// Inicio del periodo de facturación activo (mensual, UTC).
#[must_use]
pub fn month_start(moment: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(moment.year(), moment.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(moment)
}
