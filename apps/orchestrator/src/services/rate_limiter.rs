// [apps/orchestrator/src/services/rate_limiter.rs]
/*!
 * =================================================================
 * APARATO: GATEWAY RATE LIMITER (V4.3 - PERSISTED WINDOWS)
 * CLASIFICACIÓN: GATEWAY GOVERNANCE (ESTRATO L4)
 * RESPONSABILIDAD: CUPO POR (TENANT, CAPACIDAD) EN VENTANAS DE 60s
 *
 * # Mathematical Proof (Window Cap):
 * El contador vive en el sustrato (sobrevive reinicios) y el upsert
 * retorna el valor post-incremento: a lo sumo 'limit' peticiones
 * observan count ≤ limit dentro de una ventana.
 * =================================================================
 */

use crate::config::DEFAULT_CAPABILITY_RATE_LIMIT;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use wopr_domain_models::Capability;
use wopr_infra_db::repositories::RateLimitRepository;
use wopr_infra_db::DbError;

/// Duración de la ventana de cupo.
pub const RATE_WINDOW_SECONDS: i64 = 60;

/// Veredicto del limitador para una petición.
#[derive(Debug, Clone)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: i64,
    pub remaining: i64,
    pub reset_epoch: i64,
}

pub struct GatewayRateLimiter {
    rate_repository: Arc<RateLimitRepository>,
    /// Cupo por capacidad; ausencia = cupo nominal (60/min).
    capability_limits: HashMap<Capability, i64>,
}

impl GatewayRateLimiter {
    #[must_use]
    pub fn new(rate_repository: Arc<RateLimitRepository>) -> Self {
        Self { rate_repository, capability_limits: HashMap::new() }
    }

    /// Cupo específico de una capacidad (configuración del operador).
    #[must_use]
    pub fn with_limit(mut self, capability: Capability, limit: i64) -> Self {
        self.capability_limits.insert(capability, limit.max(1));
        self
    }

    #[must_use]
    pub fn limit_for(&self, capability: Capability) -> i64 {
        self.capability_limits
            .get(&capability)
            .copied()
            .unwrap_or(DEFAULT_CAPABILITY_RATE_LIMIT)
    }

    /**
     * Consume una unidad del cupo y emite el veredicto.
     */
    #[instrument(skip(self), fields(capability = capability.as_str()))]
    pub async fn check(
        &self,
        tenant_id: &str,
        capability: Capability,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, DbError> {
        let limit = self.limit_for(capability);
        let epoch = now.timestamp();
        let window_start = epoch - epoch.rem_euclid(RATE_WINDOW_SECONDS);

        let post_increment_count = self
            .rate_repository
            .increment_and_get(&capability.rate_limit_scope(), tenant_id, window_start)
            .await?;

        Ok(RateDecision {
            allowed: post_increment_count <= limit,
            limit,
            remaining: (limit - post_increment_count).max(0),
            reset_epoch: window_start + RATE_WINDOW_SECONDS,
        })
    }

    /// Higiene periódica: descarta ventanas con más de una hora.
    pub async fn purge_stale_windows(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        self.rate_repository
            .purge_windows_before(now.timestamp() - 3600)
            .await
    }
}
