#![warn(missing_docs)]
//! Checked scalar newtypes for values that must stay inside a closed
//! interval: [`UnitInterval`] for `[0, 1]` (probabilities, risk levels) and
//! [`SignedUnitInterval`] for `[-1, 1]` (normalized actuation commands).

use serde::{Deserialize, Deserializer, Serialize};

/// Error returned when constructing an interval type from a value outside
/// its domain.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum IntervalError {
    /// The value is not inside `[0, 1]`.
    #[error("value {0} is outside the closed interval [0, 1]")]
    OutsideUnitInterval(f64),
    /// The value is not inside `[-1, 1]`.
    #[error("value {0} is outside the closed interval [-1, 1]")]
    OutsideSignedUnitInterval(f64),
    /// The value is NaN, which is not inside any interval.
    #[error("NaN is not inside any interval")]
    NotANumber,
}

/// Result type for fallible constructors in this crate.
pub type Result<T> = std::result::Result<T, IntervalError>;

/// A value in the closed interval `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct UnitInterval(f64);

impl UnitInterval {
    /// The lower endpoint, `0.0`.
    pub const ZERO: Self = Self(0.0);
    /// The upper endpoint, `1.0`.
    pub const ONE: Self = Self(1.0);

    /// Create a `UnitInterval`, rejecting values outside `[0, 1]` and NaN.
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() {
            Err(IntervalError::NotANumber)
        } else if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(IntervalError::OutsideUnitInterval(value))
        }
    }

    /// Create a `UnitInterval` by clamping `value` into `[0, 1]`.
    /// NaN clamps to `0.0`.
    #[must_use]
    pub fn saturating(value: f64) -> Self {
        if value.is_nan() {
            Self::ZERO
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// Returns the inner value.
    #[inline(always)]
    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

/// A value in the closed interval `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct SignedUnitInterval(f64);

impl SignedUnitInterval {
    /// The midpoint, `0.0`.
    pub const ZERO: Self = Self(0.0);

    /// Create a `SignedUnitInterval`, rejecting values outside `[-1, 1]`
    /// and NaN.
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() {
            Err(IntervalError::NotANumber)
        } else if (-1.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(IntervalError::OutsideSignedUnitInterval(value))
        }
    }

    /// Create a `SignedUnitInterval` by clamping `value` into `[-1, 1]`.
    /// NaN clamps to `0.0`.
    #[must_use]
    pub fn saturating(value: f64) -> Self {
        if value.is_nan() {
            Self::ZERO
        } else {
            Self(value.clamp(-1.0, 1.0))
        }
    }

    /// Returns the inner value.
    #[inline(always)]
    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

macro_rules! impl_interval_conversions {
    ($type:ty) => {
        impl TryFrom<f64> for $type {
            type Error = IntervalError;

            fn try_from(value: f64) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$type> for f64 {
            fn from(value: $type) -> f64 {
                value.0
            }
        }

        impl std::ops::Deref for $type {
            type Target = f64;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl Serialize for $type {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $type {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let value = f64::deserialize(deserializer)?;
                Self::new(value).map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_interval_conversions!(UnitInterval);
impl_interval_conversions!(SignedUnitInterval);
