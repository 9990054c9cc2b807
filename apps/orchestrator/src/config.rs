// [apps/orchestrator/src/config.rs]
/*!
 * =================================================================
 * APARATO: PLATFORM CONFIGURATION (V4.2 - ENV SOVEREIGN)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: CAPTURA DEL ENTORNO SIN INVENTAR VALORES
 *
 * La ausencia de una variable DESHABILITA la funcionalidad que
 * gobierna; el núcleo ni colapsa ni fabrica valores silenciosos.
 * =================================================================
 */

use std::env;
use std::path::PathBuf;
use tracing::info;

/// Margen nominal del gateway en puntos básicos (1.3x).
pub const DEFAULT_MARGIN_BASIS_POINTS: u32 = 13_000;

/// Límite nominal de peticiones por capacidad (ventana de 60 s).
pub const DEFAULT_CAPABILITY_RATE_LIMIT: i64 = 60;

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Dominio base del enrutado por subdominios de tenant.
    pub platform_domain: String,
    /// Ruta del sustrato de persistencia principal.
    pub database_path: String,
    /// Token del endpoint /quota; ausencia = superficie deshabilitada.
    pub fleet_api_token: Option<String>,
    /// Secreto estático opcional para el registro de nodos (vía 1).
    pub node_static_secret: Option<String>,
    /// Token de las rutas /api/admin; ausencia = superficie deshabilitada.
    pub admin_api_token: Option<String>,
    /// Directorio de snapshots tar.
    pub snapshot_dir: PathBuf,
    /// Sustrato dedicado de metadatos de snapshot (opcional).
    pub snapshot_db_path: Option<String>,
    /// Raíz de los directorios de estado de bots en los nodos.
    pub wopr_home_base: Option<String>,
    /// Directorio de datos del pipeline (WAL/DLQ).
    pub fleet_data_dir: PathBuf,
    /// Base de enlaces de afiliados (superficie externa).
    pub affiliate_base_url: Option<String>,
    /// DSN de captura de errores; ausencia = captura deshabilitada.
    pub sentry_dsn: Option<String>,
    /// URL canónica base para la validación de firmas de webhooks.
    pub webhook_base_url: String,
    /// Auth token del proveedor telefónico; ausencia = validación off.
    pub twilio_auth_token: Option<String>,
    /// Margen multiplicativo del gateway (bps).
    pub margin_basis_points: u32,
    /// Puerto de escucha del plano de control.
    pub listening_port: u16,
}

impl PlatformConfig {
    /**
     * Hidrata la configuración desde el entorno del proceso.
     */
    pub fn from_env() -> Self {
        let config = Self {
            platform_domain: env::var("PLATFORM_DOMAIN").unwrap_or_else(|_| "wopr.bot".to_string()),
            database_path: env::var("PLATFORM_DB_PATH").unwrap_or_else(|_| "wopr-platform.db".to_string()),
            fleet_api_token: non_empty(env::var("FLEET_API_TOKEN").ok()),
            node_static_secret: non_empty(env::var("NODE_SECRET").ok()),
            admin_api_token: non_empty(env::var("ADMIN_API_TOKEN").ok()),
            snapshot_dir: PathBuf::from(env::var("SNAPSHOT_DIR").unwrap_or_else(|_| "snapshots".to_string())),
            snapshot_db_path: non_empty(env::var("SNAPSHOT_DB_PATH").ok()),
            wopr_home_base: non_empty(env::var("WOPR_HOME_BASE").ok()),
            fleet_data_dir: PathBuf::from(env::var("FLEET_DATA_DIR").unwrap_or_else(|_| "fleet-data".to_string())),
            affiliate_base_url: non_empty(env::var("AFFILIATE_BASE_URL").ok()),
            sentry_dsn: non_empty(env::var("SENTRY_DSN").ok()),
            webhook_base_url: env::var("WEBHOOK_BASE_URL")
                .unwrap_or_else(|_| "https://gateway.wopr.bot".to_string()),
            twilio_auth_token: non_empty(env::var("TWILIO_AUTH_TOKEN").ok()),
            margin_basis_points: env::var("GATEWAY_MARGIN_BPS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .filter(|bps| *bps >= 10_000)
                .unwrap_or(DEFAULT_MARGIN_BASIS_POINTS),
            listening_port: env::var("PORT").ok().and_then(|raw| raw.parse().ok()).unwrap_or(3000),
        };

        info!(
            "🧭 [CONFIG]: domain={} quota={} admin={} node_static={} twilio={}",
            config.platform_domain,
            toggle(&config.fleet_api_token),
            toggle(&config.admin_api_token),
            toggle(&config.node_static_secret),
            toggle(&config.twilio_auth_token),
        );
        config
    }
}

fn non_empty(candidate: Option<String>) -> Option<String> {
    candidate.filter(|value| !value.trim().is_empty())
}

fn toggle(feature: &Option<String>) -> &'static str {
    if feature.is_some() { "on" } else { "off" }
}
