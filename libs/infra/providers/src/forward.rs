// [libs/infra/providers/src/forward.rs]
/*!
 * =================================================================
 * APARATO: UPSTREAM FORWARDER (V4.3 - FALL-THROUGH DISPATCH)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: REENVÍO CON PLAZO Y CASCADA ENTRE ADAPTADORES
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. TRANSPORT AGNOSTIC: El cuerpo viaja opaco; la malla no interpreta
 *    la gramática del proveedor.
 * 2. FALL-THROUGH: 5xx o fallo de transporte degradan al adaptador
 *    (override TTL) y la cascada continúa; 2xx-4xx se devuelven tal
 *    cual al tenant.
 * 3. DEADLINE: Toda petición aguas arriba porta un plazo de 30 s.
 * =================================================================
 */

use crate::errors::ProviderError;
use crate::registry::{ProviderDescriptor, ProviderRegistry};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use wopr_domain_models::Capability;

/// Plazo nominal de una petición aguas arriba.
pub const UPSTREAM_DEADLINE_SECONDS: u64 = 30;

/// Respuesta opaca devuelta por la malla.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: String,
    pub provider: String,
    pub duration_ms: i64,
}

pub struct UpstreamForwarder {
    http_client: reqwest::Client,
}

impl Default for UpstreamForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamForwarder {
    #[must_use]
    pub fn new() -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPSTREAM_DEADLINE_SECONDS))
            .user_agent("wopr-gateway/4.3")
            .build()
            .unwrap_or_default();
        Self { http_client }
    }

    /**
     * Despacha hacia el primer adaptador sano; cae en cascada ante
     * 5xx o fallos de transporte.
     *
     * # Errors:
     * `AllProvidersExhausted` cuando la cascada se agota (502 en el borde).
     */
    #[instrument(skip(self, registry, body), fields(capability = capability.as_str()))]
    pub async fn dispatch(
        &self,
        registry: &ProviderRegistry,
        capability: Capability,
        path_suffix: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<UpstreamResponse, ProviderError> {
        let ordered_adapters = registry.routing_order(capability).await?;
        let mut last_fault = String::from("no_attempt");

        for adapter in &ordered_adapters {
            match self.attempt(adapter, path_suffix, content_type, body).await {
                Ok(response) if response.status >= 500 => {
                    last_fault = format!("{} -> http {}", adapter.name, response.status);
                    registry.mark_unhealthy(&adapter.name, &last_fault).await;
                }
                Ok(response) => {
                    debug!("🛫 [MESH_DISPATCH]: [{}] answered {}.", adapter.name, response.status);
                    return Ok(response);
                }
                Err(transport_fault) => {
                    last_fault = format!("{} -> {}", adapter.name, transport_fault);
                    warn!("🛬 [MESH_FALLTHROUGH]: {}", last_fault);
                    registry.mark_unhealthy(&adapter.name, &last_fault).await;
                }
            }
        }

        Err(ProviderError::AllProvidersExhausted(last_fault))
    }

    async fn attempt(
        &self,
        adapter: &ProviderDescriptor,
        path_suffix: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<UpstreamResponse, ProviderError> {
        let target_url = format!("{}{}", adapter.base_url.trim_end_matches('/'), path_suffix);
        let attempt_started = std::time::Instant::now();

        let upstream_response = self
            .http_client
            .post(&target_url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body.to_vec())
            .send()
            .await
            .map_err(|transport_fault| {
                if transport_fault.is_timeout() {
                    ProviderError::DeadlineExceeded
                } else {
                    ProviderError::Transport(transport_fault)
                }
            })?;

        let status = upstream_response.status().as_u16();
        let response_content_type = upstream_response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/json")
            .to_string();

        let response_body = upstream_response.bytes().await.map_err(ProviderError::Transport)?;

        Ok(UpstreamResponse {
            status,
            body: response_body.to_vec(),
            content_type: response_content_type,
            provider: adapter.name.clone(),
            duration_ms: attempt_started.elapsed().as_millis() as i64,
        })
    }
}
