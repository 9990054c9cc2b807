// [apps/orchestrator/src/services/notifier.rs]
/*!
 * =================================================================
 * APARATO: ADMIN NOTIFIER (V4.1 - BEST EFFORT SIGNAL)
 * CLASIFICACIÓN: INFRASTRUCTURE SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: SEÑALES AL OPERADOR SIN BLOQUEAR LA OPERACIÓN
 *
 * El transporte real (email/chat) es un colaborador externo; el
 * contrato interno es este trait y su implementación trazada.
 * =================================================================
 */

use tracing::warn;

/// Señal hacia el operador humano; el fallo jamás propaga.
pub trait AdminNotifier: Send + Sync + 'static {
    fn notify(&self, subject: &str, body: &str);
}

/// Implementación nominal: el Panóptico de trazas es el buzón.
#[derive(Default)]
pub struct TracingNotifier;

impl AdminNotifier for TracingNotifier {
    fn notify(&self, subject: &str, body: &str) {
        warn!("📣 [ADMIN_SIGNAL]: {} :: {}", subject, body);
    }
}
