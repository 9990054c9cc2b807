// [apps/orchestrator/src/services/breaker.rs]
/*!
 * =================================================================
 * APARATO: CIRCUIT BREAKER SHIELD (V4.3 - RUNAWAY CONTAINMENT)
 * CLASIFICACIÓN: GATEWAY GOVERNANCE (ESTRATO L4)
 * RESPONSABILIDAD: CORTE POR INSTANCIA ANTE RÁFAGAS DE ERRORES
 *
 * # Mathematical Proof (Trip Discipline):
 * Dentro de una ventana de 10 s, el error número (threshold+1) sella
 * tripped_at. Toda petición anterior a tripped_at + reset_after es
 * rechazada con 503; la primera posterior reinicia el estado y el
 * umbral debe alcanzarse de nuevo para re-disparar.
 * =================================================================
 */

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, instrument};
use wopr_infra_db::repositories::CircuitBreakerRepository;
use wopr_infra_db::DbError;

/// Ventana corta de conteo de errores.
pub const BREAKER_WINDOW_SECONDS: i64 = 10;
/// Errores tolerados dentro de la ventana antes del disparo.
pub const BREAKER_ERROR_THRESHOLD: i64 = 20;
/// Cuarentena tras el disparo.
pub const BREAKER_RESET_AFTER_SECONDS: i64 = 30;

/// Veredicto del escudo para una petición entrante.
#[derive(Debug, Clone)]
pub enum BreakerVerdict {
    Closed,
    Open { retry_after_seconds: i64 },
}

pub struct CircuitBreakerShield {
    breaker_repository: Arc<CircuitBreakerRepository>,
}

impl CircuitBreakerShield {
    #[must_use]
    pub fn new(breaker_repository: Arc<CircuitBreakerRepository>) -> Self {
        Self { breaker_repository }
    }

    /**
     * Evalúa el estado del breaker ANTES de reenviar la petición.
     * Una cuarentena expirada se reinicia aquí mismo (auto-sanado).
     */
    #[instrument(skip(self))]
    pub async fn guard(&self, instance_id: &str, now: DateTime<Utc>) -> Result<BreakerVerdict, DbError> {
        let Some(snapshot) = self.breaker_repository.load(instance_id).await? else {
            return Ok(BreakerVerdict::Closed);
        };

        if let Some(tripped_at) = snapshot.tripped_at {
            let quarantine_ends = tripped_at + Duration::seconds(BREAKER_RESET_AFTER_SECONDS);
            if now < quarantine_ends {
                return Ok(BreakerVerdict::Open {
                    retry_after_seconds: (quarantine_ends - now).num_seconds().max(1),
                });
            }
            // Cuarentena cumplida: el circuito cierra y el umbral renace.
            self.breaker_repository.reset(instance_id).await?;
            info!("🔁 [BREAKER_RESET]: Instance [{}] circuit closed after quarantine.", instance_id);
        }

        Ok(BreakerVerdict::Closed)
    }

    /**
     * Registra un error de la instancia; al exceder el umbral dentro
     * de la ventana, el circuito abre.
     */
    #[instrument(skip(self))]
    pub async fn record_failure(&self, instance_id: &str, now: DateTime<Utc>) -> Result<(), DbError> {
        let epoch = now.timestamp();
        let window_start = epoch - epoch.rem_euclid(BREAKER_WINDOW_SECONDS);

        let error_count = self.breaker_repository.record_error(instance_id, window_start).await?;
        if error_count > BREAKER_ERROR_THRESHOLD {
            self.breaker_repository.trip(instance_id, now).await?;
        }
        Ok(())
    }
}
