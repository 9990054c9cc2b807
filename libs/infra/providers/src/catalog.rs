// [libs/infra/providers/src/catalog.rs]
/*!
 * =================================================================
 * APARATO: PROVIDER COST CATALOG (V4.2 - DETERMINISTIC PRICING)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: COSTO(capacidad, unidades, modelo) Y /v1/models
 *
 * # Mathematical Proof (Deterministic Billing):
 * cost = unidades × costo_unitario(capacidad) × multiplicador(modelo).
 * Toda la aritmética es entera (i128 intermedio); la misma entrada
 * produce siempre el mismo costo crudo.
 * =================================================================
 */

use crate::registry::ProviderDescriptor;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use wopr_core_credit::Credit;
use wopr_domain_models::Capability;

/// Costo por unidad en unidades crudas, por capacidad.
/// llm: por token. audioSpeech: por segundo. imageGen: por imagen.
/// telephony: por segmento/minuto.
static BASE_UNIT_COST_RAW: Lazy<HashMap<Capability, i64>> = Lazy::new(|| {
    HashMap::from([
        (Capability::Llm, 2_000),
        (Capability::ImageGen, 40_000_000),
        (Capability::AudioSpeech, 180_000),
        (Capability::Telephony, 7_000_000),
    ])
});

/// Multiplicador por modelo premium, en puntos básicos (10_000 = 1.0x).
static MODEL_MULTIPLIER_BPS: Lazy<HashMap<&'static str, i64>> = Lazy::new(|| {
    HashMap::from([
        ("claude-sonnet", 30_000),
        ("gpt-4o", 25_000),
        ("flux-pro", 20_000),
    ])
});

/**
 * Costo del proveedor para un consumo dado.
 *
 * Unidades no positivas cobran una unidad mínima (sonda de costo).
 */
#[must_use]
pub fn provider_cost(capability: Capability, units: i64, model: Option<&str>) -> Credit {
    let unit_cost = BASE_UNIT_COST_RAW.get(&capability).copied().unwrap_or(0);
    let effective_units = units.max(1);
    let multiplier_bps = model
        .and_then(|model_name| MODEL_MULTIPLIER_BPS.get(model_name).copied())
        .unwrap_or(10_000);

    let widened = i128::from(unit_cost) * i128::from(effective_units) * i128::from(multiplier_bps) / 10_000;
    let clamped = widened.min(i128::from(i64::MAX)) as i64;
    Credit::from_raw(clamped).unwrap_or_else(|_| Credit::zero())
}

/// Documento del catálogo servido por GET /v1/models.
#[must_use]
pub fn models_document(descriptors: &[ProviderDescriptor]) -> serde_json::Value {
    let models: Vec<serde_json::Value> = descriptors
        .iter()
        .flat_map(|descriptor| {
            descriptor.models.iter().map(move |model_name| {
                serde_json::json!({
                    "id": model_name,
                    "object": "model",
                    "provider": descriptor.name,
                    "capability": descriptor.capability.as_str(),
                })
            })
        })
        .collect();

    serde_json::json!({ "object": "list", "data": models })
}
