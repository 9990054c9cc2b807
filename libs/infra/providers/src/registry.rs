// [libs/infra/providers/src/registry.rs]
/*!
 * =================================================================
 * APARATO: PROVIDER REGISTRY (V4.3 - SELF-HEALING MESH)
 * CLASIFICACIÓN: INFRASTRUCTURE SERVICE (ESTRATO L3)
 * RESPONSABILIDAD: ORDEN DE ENRUTAMIENTO Y OVERRIDES DE SALUD TTL
 *
 * # Mathematical Proof (Routing Total Order):
 * El orden (healthy DESC, unit_cost ASC, priority ASC, name ASC) es
 * total sobre el conjunto de adaptadores; la selección del primero
 * sano es determinista para un estado de overrides dado.
 * =================================================================
 */

use crate::errors::ProviderError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};
use wopr_domain_models::Capability;
use wopr_infra_db::repositories::ProviderHealthRepository;

/// TTL nominal de un override automático por 5xx repetidos.
pub const AUTO_UNHEALTHY_TTL_SECONDS: i64 = 120;

/// Descriptor estático de un adaptador de proveedor.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub name: String,
    pub capability: Capability,
    pub base_url: String,
    /// Costo por unidad de consumo en unidades crudas.
    pub unit_cost_raw: i64,
    pub priority: u32,
    pub models: Vec<String>,
}

pub struct ProviderRegistry {
    descriptors: Vec<ProviderDescriptor>,
    health_repository: Arc<ProviderHealthRepository>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new(descriptors: Vec<ProviderDescriptor>, health_repository: Arc<ProviderHealthRepository>) -> Self {
        Self { descriptors, health_repository }
    }

    /// Malla nominal de arranque del plano de control.
    #[must_use]
    pub fn with_default_mesh(health_repository: Arc<ProviderHealthRepository>) -> Self {
        Self::new(default_mesh(), health_repository)
    }

    /**
     * Adaptadores de una capacidad en orden de enrutamiento:
     * (healthy DESC, cost ASC, priority ASC).
     */
    #[instrument(skip(self))]
    pub async fn routing_order(&self, capability: Capability) -> Result<Vec<ProviderDescriptor>, ProviderError> {
        let live_overrides: HashMap<String, bool> = self.health_repository.live_overrides().await?;

        let mut candidates: Vec<(bool, ProviderDescriptor)> = self
            .descriptors
            .iter()
            .filter(|descriptor| descriptor.capability == capability)
            .map(|descriptor| {
                let healthy = live_overrides.get(&descriptor.name).copied().unwrap_or(true);
                (healthy, descriptor.clone())
            })
            .collect();

        if candidates.is_empty() {
            return Err(ProviderError::NoAdapterForCapability(capability.as_str().to_string()));
        }

        candidates.sort_by(|(left_healthy, left), (right_healthy, right)| {
            right_healthy
                .cmp(left_healthy)
                .then(left.unit_cost_raw.cmp(&right.unit_cost_raw))
                .then(left.priority.cmp(&right.priority))
                .then(left.name.cmp(&right.name))
        });

        Ok(candidates.into_iter().map(|(_, descriptor)| descriptor).collect())
    }

    /// Override automático tras 5xx: el adaptador sana solo al expirar el TTL.
    pub async fn mark_unhealthy(&self, provider_name: &str, reason: &str) {
        warn!("🤒 [MESH_DEGRADE]: Provider [{}] marked unhealthy: {}", provider_name, reason);
        if let Err(store_fault) = self
            .health_repository
            .store_override(provider_name, false, AUTO_UNHEALTHY_TTL_SECONDS, reason)
            .await
        {
            warn!("⚠️ [MESH_DEGRADE_FAULT]: Override rejected: {}", store_fault);
        }
    }

    /// Override manual del operador (sano/insano) con TTL explícito.
    pub async fn override_health(
        &self,
        provider_name: &str,
        healthy: bool,
        ttl_seconds: i64,
        reason: &str,
    ) -> Result<(), ProviderError> {
        self.health_repository
            .store_override(provider_name, healthy, ttl_seconds, reason)
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn descriptors(&self) -> &[ProviderDescriptor] {
        &self.descriptors
    }
}

/// Malla nominal: dos adaptadores LLM, uno por cada capacidad restante.
#[must_use]
pub fn default_mesh() -> Vec<ProviderDescriptor> {
    vec![
        ProviderDescriptor {
            name: "openrouter".into(),
            capability: Capability::Llm,
            base_url: "https://openrouter.ai/api".into(),
            unit_cost_raw: 2_000,
            priority: 1,
            models: vec!["gpt-4o-mini".into(), "claude-haiku".into(), "llama-3-70b".into()],
        },
        ProviderDescriptor {
            name: "anthropic-direct".into(),
            capability: Capability::Llm,
            base_url: "https://api.anthropic.com".into(),
            unit_cost_raw: 3_000,
            priority: 2,
            models: vec!["claude-sonnet".into(), "claude-haiku".into()],
        },
        ProviderDescriptor {
            name: "flux-imagery".into(),
            capability: Capability::ImageGen,
            base_url: "https://api.flux-imagery.example".into(),
            unit_cost_raw: 40_000_000,
            priority: 1,
            models: vec!["flux-schnell".into(), "flux-pro".into()],
        },
        ProviderDescriptor {
            name: "elevenvoice".into(),
            capability: Capability::AudioSpeech,
            base_url: "https://api.elevenvoice.example".into(),
            unit_cost_raw: 180_000,
            priority: 1,
            models: vec!["multilingual-v2".into()],
        },
        ProviderDescriptor {
            name: "twilio".into(),
            capability: Capability::Telephony,
            base_url: "https://api.twilio.com".into(),
            unit_cost_raw: 7_000_000,
            priority: 1,
            models: vec!["voice".into(), "sms".into()],
        },
    ]
}
