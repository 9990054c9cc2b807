// [libs/core/credit-engine/src/lib.rs]
/*!
 * =================================================================
 * APARATO: CREDIT VALUE ENGINE (V4.1 - LEDGER GRADE)
 * CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
 * RESPONSABILIDAD: ARITMÉTICA MONETARIA ENTERA DE PRECISIÓN SUB-CENTAVO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. INTEGER SOVEREIGNTY: Toda magnitud monetaria vive como i64 de
 *    unidades crudas (10^9 por dólar, 10^7 por centavo). Los flotantes
 *    quedan erradicados del Ledger y del Meter.
 * 2. INTEROP CEILING: El techo de magnitud se fija en el entero seguro
 *    de los dashboards externos para garantizar la paridad de lectura.
 * 3. NOMINAL PURITY: Erradicación total de abreviaciones.
 *
 * # Mathematical Proof (Closed Arithmetic):
 * Para todo n ∈ [0, 10^15 / 10^7]: from_cents(n).to_cents_rounded() == n.
 * La suma y resta verificadas rechazan cualquier resultado fuera del
 * techo de interoperabilidad, manteniendo el conjunto cerrado.
 * =================================================================
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unidades crudas por dólar (escala soberana 10^9).
pub const RAW_UNITS_PER_DOLLAR: i64 = 1_000_000_000;

/// Unidades crudas por centavo (10^7).
pub const RAW_UNITS_PER_CENT: i64 = 10_000_000;

/// Techo de magnitud segura para interoperar con lectores externos.
pub const MAXIMUM_SAFE_RAW_MAGNITUDE: i64 = 9_007_199_254_740_991;

/// Base de puntos básicos para la aplicación de márgenes (10_000 = 1.0x).
pub const MARGIN_BASIS_POINT_SCALE: i128 = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CreditError {
    /// La magnitud cruda excede el techo de interoperabilidad.
    #[error("[L2_CREDIT_FAULT]: RAW_MAGNITUDE_BEYOND_SAFE_CEILING -> {0}")]
    MagnitudeOverflow(i128),

    /// El margen solicitado es inferior a 1.0x (prohibido vender bajo costo).
    #[error("[L2_CREDIT_FAULT]: MARGIN_BELOW_UNITY -> {0} bps")]
    MarginBelowUnity(u32),
}

/**
 * Valor monetario inmutable del ecosistema WOPR.
 *
 * Cada instancia transporta una magnitud entera de unidades crudas con
 * signo. Las transacciones del Ledger usan el signo para codificar la
 * dirección del delta (crédito positivo, débito negativo).
 */
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Credit {
    raw_magnitude: i64,
}

impl Credit {
    /// Valor neutro del conjunto monetario.
    #[must_use]
    pub const fn zero() -> Self {
        Self { raw_magnitude: 0 }
    }

    /**
     * Construye un Credit desde unidades crudas con validación de techo.
     *
     * # Errors:
     * `MagnitudeOverflow` si |raw| excede el entero seguro de interop.
     */
    pub fn from_raw(raw_units: i64) -> Result<Self, CreditError> {
        if raw_units.unsigned_abs() > MAXIMUM_SAFE_RAW_MAGNITUDE as u64 {
            return Err(CreditError::MagnitudeOverflow(i128::from(raw_units)));
        }
        Ok(Self { raw_magnitude: raw_units })
    }

    /// Construye un Credit positivo desde centavos enteros.
    pub fn from_cents(cents: u64) -> Result<Self, CreditError> {
        let widened = i128::from(cents) * i128::from(RAW_UNITS_PER_CENT);
        Self::from_widened(widened)
    }

    /// Construye un Credit positivo desde dólares enteros.
    pub fn from_dollars(dollars: u64) -> Result<Self, CreditError> {
        let widened = i128::from(dollars) * i128::from(RAW_UNITS_PER_DOLLAR);
        Self::from_widened(widened)
    }

    fn from_widened(widened_magnitude: i128) -> Result<Self, CreditError> {
        if widened_magnitude.unsigned_abs() > MAXIMUM_SAFE_RAW_MAGNITUDE as u128 {
            return Err(CreditError::MagnitudeOverflow(widened_magnitude));
        }
        Ok(Self { raw_magnitude: widened_magnitude as i64 })
    }

    /// Magnitud cruda firmada (unidades de 10^-9 dólares).
    #[must_use]
    pub const fn raw(&self) -> i64 {
        self.raw_magnitude
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.raw_magnitude == 0
    }

    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.raw_magnitude > 0
    }

    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.raw_magnitude < 0
    }

    /// Suma verificada dentro del conjunto cerrado.
    pub fn checked_add(&self, other: Credit) -> Result<Credit, CreditError> {
        Self::from_widened(i128::from(self.raw_magnitude) + i128::from(other.raw_magnitude))
    }

    /// Resta verificada dentro del conjunto cerrado.
    pub fn checked_sub(&self, other: Credit) -> Result<Credit, CreditError> {
        Self::from_widened(i128::from(self.raw_magnitude) - i128::from(other.raw_magnitude))
    }

    /**
     * Resta con piso en cero: el resultado nunca es negativo.
     *
     * # Logic:
     * Usada por el cron de costos de runtime para debitar "lo disponible"
     * cuando el balance no cubre el costo diario completo.
     */
    #[must_use]
    pub fn saturating_sub_to_zero(&self, other: Credit) -> Credit {
        let difference = self.raw_magnitude.saturating_sub(other.raw_magnitude);
        Credit { raw_magnitude: difference.max(0) }
    }

    /// Inversión de signo (delta de débito en el Ledger).
    #[must_use]
    pub const fn negated(&self) -> Credit {
        Credit { raw_magnitude: -self.raw_magnitude }
    }

    /// Magnitud absoluta.
    #[must_use]
    pub const fn magnitude(&self) -> Credit {
        Credit { raw_magnitude: self.raw_magnitude.abs() }
    }

    /**
     * Centavos truncados hacia -infinito (pagos salientes).
     *
     * # Performance: O(1), división euclidiana entera.
     */
    #[must_use]
    pub const fn to_cents_floor(&self) -> i64 {
        self.raw_magnitude.div_euclid(RAW_UNITS_PER_CENT)
    }

    /// Centavos redondeados al más cercano (visualización).
    #[must_use]
    pub fn to_cents_rounded(&self) -> i64 {
        let half_cent = RAW_UNITS_PER_CENT / 2;
        if self.raw_magnitude >= 0 {
            (self.raw_magnitude + half_cent).div_euclid(RAW_UNITS_PER_CENT)
        } else {
            -((-self.raw_magnitude + half_cent).div_euclid(RAW_UNITS_PER_CENT))
        }
    }

    /// Representación decimal en dólares para el rastro forense ("4.9982").
    #[must_use]
    pub fn to_display_dollars(&self) -> String {
        let sign = if self.raw_magnitude < 0 { "-" } else { "" };
        let absolute = self.raw_magnitude.unsigned_abs();
        let whole_dollars = absolute / RAW_UNITS_PER_DOLLAR as u64;
        let fractional = absolute % RAW_UNITS_PER_DOLLAR as u64;
        // Cuatro decimales: resolución de 0.01 centavos para el dashboard.
        let fractional_ten_thousandths = fractional / 100_000;
        format!("{}{}.{:04}", sign, whole_dollars, fractional_ten_thousandths)
    }

    /**
     * Aplica un margen multiplicativo expresado en puntos básicos.
     *
     * # Logic:
     * charge = cost × (bps / 10_000), truncado. El margen mínimo es 1.0x
     * (10_000 bps), garantizando el invariante charge ≥ cost del Meter.
     *
     * # Errors:
     * - `MarginBelowUnity` si bps < 10_000.
     * - `MagnitudeOverflow` si el resultado escapa del techo seguro.
     */
    pub fn apply_margin_basis_points(&self, margin_basis_points: u32) -> Result<Credit, CreditError> {
        if i128::from(margin_basis_points) < MARGIN_BASIS_POINT_SCALE {
            return Err(CreditError::MarginBelowUnity(margin_basis_points));
        }
        let widened = i128::from(self.raw_magnitude) * i128::from(margin_basis_points)
            / MARGIN_BASIS_POINT_SCALE;
        Self::from_widened(widened)
    }
}

impl std::fmt::Display for Credit {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "${}", self.to_display_dollars())
    }
}
