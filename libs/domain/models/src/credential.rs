// [libs/domain/models/src/credential.rs]
/*!
 * =================================================================
 * APARATO: NODE CREDENTIAL MODELS (V4.0 - ONE-SHOT TOKENS)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: TOKENS DE REGISTRO DE UN SOLO USO
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Token de registro de un solo uso (formato UUID).
///
/// La consumición es atómica: un único UPDATE con predicado
/// `consumed_at IS NULL` decide al ganador bajo concurrencia.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationToken {
    pub token: String,

    #[serde(rename = "user_identifier")]
    pub user_id: String,

    /// Etiqueta humana del propósito ("rack-7 burst capacity").
    pub label: String,

    #[typeshare(serialized_as = "String")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<DateTime<Utc>>,

    #[typeshare(serialized_as = "String")]
    pub created_at: DateTime<Utc>,
}

impl RegistrationToken {
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }
}

/// Heurística de formato UUID para discriminar la vía de autenticación
/// del registro (secreto estático / secreto por nodo / token one-shot).
#[must_use]
pub fn looks_like_uuid(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    for (index, byte) in bytes.iter().enumerate() {
        match index {
            8 | 13 | 18 | 23 => {
                if *byte != b'-' {
                    return false;
                }
            }
            _ => {
                if !byte.is_ascii_hexdigit() {
                    return false;
                }
            }
        }
    }
    true
}
