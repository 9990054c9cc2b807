// [tests/mirror/libs/domain/models/capability_routing_integrity.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: CAPABILITY & SUBDOMAIN RESOLVERS
 * CERTIFICA: el mapa ruta -> capacidad del gateway y la extracción
 *            pura del tenant desde el host.
 * =================================================================
 */

use wopr_domain_models::{capability_for_path, extract_tenant_subdomain, Capability};

#[test]
fn certify_capability_map() {
    assert_eq!(capability_for_path("/v1/chat/completions"), Some(Capability::Llm));
    assert_eq!(capability_for_path("/v1/completions"), Some(Capability::Llm));
    assert_eq!(capability_for_path("/v1/embeddings"), Some(Capability::Llm));
    assert_eq!(capability_for_path("/v1/images/generations"), Some(Capability::ImageGen));
    assert_eq!(capability_for_path("/v1/video/generations"), Some(Capability::ImageGen));
    assert_eq!(capability_for_path("/v1/audio/speech"), Some(Capability::AudioSpeech));
    assert_eq!(capability_for_path("/v1/audio/transcriptions"), Some(Capability::AudioSpeech));
    assert_eq!(capability_for_path("/v1/phone/outbound"), Some(Capability::Telephony));
    assert_eq!(capability_for_path("/v1/phone/inbound/t42"), Some(Capability::Telephony));
    assert_eq!(capability_for_path("/v1/messages/sms"), Some(Capability::Telephony));
    assert_eq!(capability_for_path("/v1/messages/sms/inbound/t42"), Some(Capability::Telephony));

    // Rutas desconocidas no se someten a rate-limit.
    assert_eq!(capability_for_path("/v1/models"), None);
    assert_eq!(capability_for_path("/v1/mystery"), None);
}

#[test]
fn certify_rate_limit_scopes() {
    assert_eq!(Capability::Llm.rate_limit_scope(), "gateway:llm");
    assert_eq!(Capability::ImageGen.rate_limit_scope(), "gateway:imageGen");
}

#[test]
fn certify_tenant_subdomain_extraction() {
    assert_eq!(extract_tenant_subdomain("t42.wopr.bot", "wopr.bot"), Some("t42".to_string()));
    assert_eq!(extract_tenant_subdomain("t42.wopr.bot:8443", "wopr.bot"), Some("t42".to_string()));
    assert_eq!(extract_tenant_subdomain("wopr.bot", "wopr.bot"), None);
    assert_eq!(extract_tenant_subdomain("deep.t42.wopr.bot", "wopr.bot"), None);
    assert_eq!(extract_tenant_subdomain("t42.rival.tld", "wopr.bot"), None);
}
