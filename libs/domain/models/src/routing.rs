// [libs/domain/models/src/routing.rs]
/*!
 * =================================================================
 * APARATO: TENANT SUBDOMAIN RESOLVER (V4.0 - PURE FUNCTION)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: EXTRACCIÓN DEL TENANT DESDE EL HOST HTTP
 * =================================================================
 */

/**
 * Extrae el identificador del tenant del subdominio del host.
 *
 * # Logic:
 * `t42.wopr.bot` -> `Some("t42")` cuando el dominio de plataforma es
 * `wopr.bot`. El host desnudo, puertos y dominios ajenos retornan `None`.
 * Aislada como función pura para su certificación independiente del
 * router HTTP.
 */
#[must_use]
pub fn extract_tenant_subdomain(host: &str, platform_domain: &str) -> Option<String> {
    let bare_host = host.split(':').next().unwrap_or(host);
    let suffix = format!(".{}", platform_domain);

    let prefix = bare_host.strip_suffix(suffix.as_str())?;
    if prefix.is_empty() || prefix.contains('.') {
        return None;
    }
    Some(prefix.to_string())
}
