// [tests/mirror/libs/core/credit_engine/credit_arithmetic_laws.test.rs]
/*!
 * =================================================================
 * PROVING GROUNDS: CREDIT ARITHMETIC LAWS
 * CERTIFICA: round-trip centavos <-> unidades crudas, techo seguro,
 *            margen mínimo 1.0x y resta con piso en cero.
 * =================================================================
 */

use proptest::prelude::*;
use wopr_core_credit::{Credit, CreditError, MAXIMUM_SAFE_RAW_MAGNITUDE, RAW_UNITS_PER_CENT};

proptest! {
    // Ley de ida y vuelta: para todo n ∈ [0, 10^15 / 10^7].
    #[test]
    fn law_cents_round_trip(cents in 0u64..=100_000_000u64) {
        let value = Credit::from_cents(cents).unwrap();
        prop_assert_eq!(value.to_cents_rounded(), cents as i64);
    }

    // El margen jamás produce un cargo inferior al costo.
    #[test]
    fn law_margin_never_undercharges(raw in 0i64..=1_000_000_000_000i64, bps in 10_000u32..=50_000u32) {
        let cost = Credit::from_raw(raw).unwrap();
        let charge = cost.apply_margin_basis_points(bps).unwrap();
        prop_assert!(charge.raw() >= cost.raw());
    }

    // La resta con piso jamás produce negativos.
    #[test]
    fn law_clamped_subtraction_floor(left in 0i64..=10_000_000_000i64, right in 0i64..=10_000_000_000i64) {
        let minuend = Credit::from_raw(left).unwrap();
        let subtrahend = Credit::from_raw(right).unwrap();
        prop_assert!(!minuend.saturating_sub_to_zero(subtrahend).is_negative());
    }
}

#[test]
fn certify_safe_ceiling_rejection() {
    assert!(Credit::from_raw(MAXIMUM_SAFE_RAW_MAGNITUDE).is_ok());
    assert!(matches!(
        Credit::from_raw(MAXIMUM_SAFE_RAW_MAGNITUDE + 1),
        Err(CreditError::MagnitudeOverflow(_))
    ));
}

#[test]
fn certify_scenario_margin_values() {
    // Costo $0.002 con margen 1.3x -> cargo $0.0026 (valores del gateway).
    let cost = Credit::from_raw(2_000_000).unwrap();
    assert_eq!(cost.apply_margin_basis_points(13_000).unwrap().raw(), 2_600_000);
}

#[test]
fn certify_cent_floor_vs_round() {
    let one_and_a_half_cents = Credit::from_raw(RAW_UNITS_PER_CENT + RAW_UNITS_PER_CENT / 2).unwrap();
    assert_eq!(one_and_a_half_cents.to_cents_floor(), 1);
    assert_eq!(one_and_a_half_cents.to_cents_rounded(), 2);
}
