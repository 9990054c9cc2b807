// [tests/mirror/libs/shared/heimdall/heimdall_integrity.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: HEIMDALL OBSERVER INTEGRITY
 * CERTIFICA: la ignición del observador no colapsa y el hook de
 *            pánico queda instalado.
 * =================================================================
 */

use wopr_shared_heimdall::init_tracing;

#[test]
fn certify_observer_ignition() {
    init_tracing("wopr_proving_grounds");
    // La segunda invocación del hook de pánico no debe colapsar el
    // proceso; solo reemplaza al anterior.
    tracing::info!("observer online");
}
