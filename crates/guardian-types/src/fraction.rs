//! Basis-point fractions.
//!
//! Quorum and approval thresholds live in (0, 1]. Carrying them as integer
//! basis points keeps every threshold comparison an exact cross-multiplication.

use crate::error::TypesError;
use std::fmt;

/// A fraction in (0, 1] expressed in ten-thousandths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub struct BasisPoints(u32);

impl BasisPoints {
    /// Denominator: 10_000 bps == 1.0
    pub const SCALE: u32 = 10_000;
    /// 100%
    pub const ONE: Self = Self(Self::SCALE);
    /// Simple majority threshold.
    pub const HALF: Self = Self(5_000);
    /// Default quorum: 20% of eligible power.
    pub const DEFAULT_QUORUM: Self = Self(2_000);

    // Slack for binary representation error in decimal inputs such as 0.07.
    const FRACTION_TOLERANCE: f64 = 1e-6;

    /// Create from raw basis points; must lie in 1..=10_000.
    pub fn new(bps: u32) -> Result<Self, TypesError> {
        if bps == 0 || bps > Self::SCALE {
            return Err(TypesError::BasisPointsOutOfRange(bps));
        }
        Ok(Self(bps))
    }

    /// Convert a decimal fraction in (0, 1].
    ///
    /// The fraction must be a whole number of basis points; anything finer
    /// is rejected rather than rounded.
    pub fn from_fraction(fraction: f64) -> Result<Self, TypesError> {
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(TypesError::FractionOutOfRange(fraction));
        }
        let scaled = fraction * f64::from(Self::SCALE);
        let bps = scaled.round();
        if (scaled - bps).abs() > Self::FRACTION_TOLERANCE {
            return Err(TypesError::FractionNotExact(fraction));
        }
        Self::new(bps as u32)
    }

    pub const fn get(&self) -> u32 {
        self.0
    }

    pub fn as_fraction(&self) -> f64 {
        f64::from(self.0) / f64::from(Self::SCALE)
    }

    /// `numerator / denominator < self`, evaluated exactly.
    ///
    /// A zero denominator counts as a zero ratio.
    pub fn ratio_below(&self, numerator: u128, denominator: u128) -> bool {
        if denominator == 0 {
            return true;
        }
        numerator.saturating_mul(u128::from(Self::SCALE))
            < denominator.saturating_mul(u128::from(self.0))
    }

    /// `numerator / denominator > self`, evaluated exactly.
    ///
    /// A zero denominator never clears the threshold.
    pub fn ratio_above(&self, numerator: u128, denominator: u128) -> bool {
        if denominator == 0 {
            return false;
        }
        numerator.saturating_mul(u128::from(Self::SCALE))
            > denominator.saturating_mul(u128::from(self.0))
    }
}

impl TryFrom<u32> for BasisPoints {
    type Error = TypesError;

    fn try_from(bps: u32) -> Result<Self, Self::Error> {
        Self::new(bps)
    }
}

impl From<BasisPoints> for u32 {
    fn from(bps: BasisPoints) -> Self {
        bps.0
    }
}

impl fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}
