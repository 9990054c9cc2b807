// [libs/domain/models/src/capability.rs]
/*!
 * =================================================================
 * APARATO: CAPABILITY TAXONOMY (V4.0 - GATEWAY RESOLVER)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: FAMILIAS DE CAPACIDADES Y RESOLUCIÓN RUTA -> CLASE
 * =================================================================
 */

use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Familia de APIs aguas arriba, usada para rate-limit y enrutamiento.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Llm,
    ImageGen,
    AudioSpeech,
    Telephony,
}

impl Capability {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Llm => "llm",
            Capability::ImageGen => "imageGen",
            Capability::AudioSpeech => "audioSpeech",
            Capability::Telephony => "telephony",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "llm" => Some(Capability::Llm),
            "imageGen" => Some(Capability::ImageGen),
            "audioSpeech" => Some(Capability::AudioSpeech),
            "telephony" => Some(Capability::Telephony),
            _ => None,
        }
    }

    /// Ámbito persistido del contador de rate-limit ("gateway:llm").
    #[must_use]
    pub fn rate_limit_scope(&self) -> String {
        format!("gateway:{}", self.as_str())
    }
}

/**
 * Resuelve la clase de capacidad de una ruta del gateway.
 *
 * # Logic:
 * El sufijo de la ruta (tras el prefijo de fachada) determina la familia.
 * Rutas desconocidas no se someten a rate-limit (retorna `None`).
 */
#[must_use]
pub fn capability_for_path(path: &str) -> Option<Capability> {
    if path.ends_with("/chat/completions")
        || path.ends_with("/completions")
        || path.ends_with("/embeddings")
        || path.ends_with("/messages")
    {
        return Some(Capability::Llm);
    }
    if path.ends_with("/images/generations") || path.ends_with("/video/generations") {
        return Some(Capability::ImageGen);
    }
    if path.ends_with("/audio/speech") || path.ends_with("/audio/transcriptions") {
        return Some(Capability::AudioSpeech);
    }
    if path.contains("/phone/") || path.contains("/messages/sms") {
        return Some(Capability::Telephony);
    }
    None
}
