// [libs/infra/db-turso/src/repositories/audit.rs]
/*!
 * =================================================================
 * APARATO: AUDIT TRAIL REPOSITORY (V4.1 - BEST EFFORT)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: RASTRO FORENSE NO-FATAL DEL SISTEMA
 *
 * El rastro jamás hace fallar la operación que lo origina: todo
 * rechazo del sustrato degrada a un 'warn' y la vida continúa.
 * =================================================================
 */

use crate::TursoClient;
use libsql::params;
use tracing::warn;

pub struct AuditRepository {
    database_client: TursoClient,
}

impl AuditRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Anexa una entrada; el fallo se degrada a warn (best-effort).
    pub async fn append(&self, actor: &str, action: &str, subject: &str, detail: Option<serde_json::Value>) {
        let database_connection = match self.database_client.get_connection() {
            Ok(connection) => connection,
            Err(connection_fault) => {
                warn!("⚠️ [AUDIT_DEGRADED]: Connection unavailable: {}", connection_fault);
                return;
            }
        };

        let insertion_result = database_connection
            .execute(
                "INSERT INTO audit_log (actor, action, subject, detail_json) VALUES (?1, ?2, ?3, ?4)",
                params![actor, action, subject, detail.map(|value| value.to_string())],
            )
            .await;

        if let Err(insertion_fault) = insertion_result {
            warn!("⚠️ [AUDIT_DEGRADED]: Entry rejected ({} {}): {}", action, subject, insertion_fault);
        }
    }
}
