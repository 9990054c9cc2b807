// [tests/mirror/libs/domain/models/node_lifecycle_integrity.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: NODE LIFECYCLE STATE MACHINE
 * CERTIFICA: la tabla cerrada de transiciones y los vetos de
 *            colocación/registro por estado.
 * =================================================================
 */

use wopr_domain_models::node::{next_status, NodeLifecycleEvent as Event, NodeStatus as Status};

#[test]
fn certify_nominal_lifecycle_path() {
    // registro -> degradación -> sentencia -> decomiso.
    assert_eq!(next_status(Status::Registering, Event::Register), Some(Status::Active));
    assert_eq!(next_status(Status::Active, Event::HeartbeatMissed), Some(Status::Degraded));
    assert_eq!(next_status(Status::Degraded, Event::DeadTimeout), Some(Status::Offline));
    assert_eq!(next_status(Status::Offline, Event::AdminDecommission), Some(Status::Decommissioned));
}

#[test]
fn certify_drain_path() {
    assert_eq!(next_status(Status::Active, Event::AdminDrain), Some(Status::Draining));
    assert_eq!(next_status(Status::Degraded, Event::AdminDrain), Some(Status::Draining));
    assert_eq!(next_status(Status::Draining, Event::DrainComplete), Some(Status::Offline));
}

#[test]
fn certify_resurrection_only_from_degraded() {
    assert_eq!(next_status(Status::Degraded, Event::HeartbeatReceived), Some(Status::Active));
    assert_eq!(next_status(Status::Offline, Event::HeartbeatReceived), None);
    assert_eq!(next_status(Status::Draining, Event::HeartbeatReceived), None);
    assert_eq!(next_status(Status::Decommissioned, Event::HeartbeatReceived), None);
}

#[test]
fn certify_placement_and_registration_gates() {
    // Solo 'active' recibe colocaciones nuevas.
    for vetoed in [Status::Registering, Status::Degraded, Status::Draining, Status::Offline, Status::Decommissioned] {
        assert!(!vetoed.accepts_placement(), "{:?} must not accept placement", vetoed);
    }
    assert!(Status::Active.accepts_placement());

    // draining/offline rechazan el re-registro (409 en el borde).
    assert!(Status::Draining.rejects_registration());
    assert!(Status::Offline.rejects_registration());
    assert!(!Status::Active.rejects_registration());
}

#[test]
fn certify_textual_round_trip() {
    for status in [
        Status::Registering,
        Status::Active,
        Status::Degraded,
        Status::Draining,
        Status::Offline,
        Status::Decommissioned,
    ] {
        assert_eq!(Status::parse(status.as_str()), Some(status));
    }
    assert_eq!(Status::parse("zombie"), None);
}
