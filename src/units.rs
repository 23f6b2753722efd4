//! This module defines various unit types and their conversions.
//!
//! Capacity is measured in the technology's own units: a rate (e.g. MW) for conversion and
//! renewable technologies and network arcs, an energy quantity (e.g. MWh) for storage.
use float_cmp::{ApproxEq, F64Margin};
use serde::{Deserialize, Serialize};

/// A trait implemented by all unit types
pub trait UnitType:
    Copy + std::fmt::Debug + PartialEq + PartialOrd + std::ops::Mul<Dimensionless, Output = Self>
{
    /// Create from an `f64` value
    fn new(value: f64) -> Self;

    /// Returns the value as an `f64`
    fn value(&self) -> f64;

    /// Whether the value is finite
    fn is_finite(&self) -> bool {
        self.value().is_finite()
    }
}

macro_rules! unit_struct {
    ($name:ident) => {
        /// Represents a type of quantity.
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            PartialOrd,
            Default,
            Serialize,
            Deserialize,
            derive_more::Add,
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::SubAssign,
            derive_more::Display,
        )]
        #[serde(transparent)]
        pub struct $name(pub f64);

        impl UnitType for $name {
            fn new(value: f64) -> Self {
                Self(value)
            }

            fn value(&self) -> f64 {
                self.0
            }
        }

        impl std::ops::Mul<Dimensionless> for $name {
            type Output = $name;
            fn mul(self, rhs: Dimensionless) -> $name {
                $name(self.0 * rhs.0)
            }
        }

        impl std::ops::Div<Dimensionless> for $name {
            type Output = $name;
            fn div(self, rhs: Dimensionless) -> $name {
                $name(self.0 / rhs.0)
            }
        }

        impl std::ops::Neg for $name {
            type Output = $name;
            fn neg(self) -> $name {
                $name(-self.0)
            }
        }

        impl std::iter::Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                $name(iter.map(|x| x.0).sum())
            }
        }

        impl ApproxEq for $name {
            type Margin = F64Margin;

            fn approx_eq<M: Into<Self::Margin>>(self, other: Self, margin: M) -> bool {
                self.0.approx_eq(other.0, margin)
            }
        }
    };
}

macro_rules! impl_mul {
    ($Lhs:ty, $Rhs:ty, $Out:ty) => {
        impl std::ops::Mul<$Rhs> for $Lhs {
            type Output = $Out;
            fn mul(self, rhs: $Rhs) -> $Out {
                <$Out>::new(self.0 * rhs.0)
            }
        }
        impl std::ops::Mul<$Lhs> for $Rhs {
            type Output = $Out;
            fn mul(self, lhs: $Lhs) -> $Out {
                <$Out>::new(self.0 * lhs.0)
            }
        }
    };
}

macro_rules! impl_div {
    ($Lhs:ty, $Rhs:ty, $Out:ty) => {
        impl std::ops::Div<$Rhs> for $Lhs {
            type Output = $Out;
            fn div(self, rhs: $Rhs) -> $Out {
                <$Out>::new(self.0 / rhs.0)
            }
        }
    };
}

unit_struct!(Dimensionless);

impl Dimensionless {
    /// Raise to an integer power
    pub fn powi(self, rhs: i32) -> Self {
        Dimensionless(self.0.powi(rhs))
    }

    /// Raise to a floating-point power
    pub fn powf(self, rhs: f64) -> Self {
        Dimensionless(self.0.powf(rhs))
    }
}

impl From<f64> for Dimensionless {
    fn from(val: f64) -> Self {
        Self(val)
    }
}

impl From<Dimensionless> for f64 {
    fn from(val: Dimensionless) -> Self {
        val.0
    }
}

// Base quantities
unit_struct!(Money);
unit_struct!(Hours);
unit_struct!(Energy);
unit_struct!(Flow);
unit_struct!(Capacity);
unit_struct!(Emissions);

// Derived quantities
unit_struct!(MoneyPerCapacity);
unit_struct!(MoneyPerCapacityPerYear);
unit_struct!(MoneyPerEnergy);
unit_struct!(MoneyPerEmissions);
unit_struct!(EmissionsPerEnergy);
unit_struct!(EmissionsPerHour);
unit_struct!(EnergyPerEmissions);

// Multiplication rules
impl_mul!(Flow, Hours, Energy);
impl_mul!(Energy, MoneyPerEnergy, Money);
impl_mul!(Energy, EmissionsPerEnergy, Emissions);
impl_mul!(Emissions, MoneyPerEmissions, Money);
impl_mul!(Flow, EmissionsPerEnergy, EmissionsPerHour);
impl_mul!(EmissionsPerHour, Hours, Emissions);
impl_mul!(Emissions, EnergyPerEmissions, Energy);
impl_mul!(Capacity, MoneyPerCapacity, Money);

// Division rules
impl_div!(Energy, Hours, Flow);
impl_div!(Money, Energy, MoneyPerEnergy);
impl_div!(Money, Capacity, MoneyPerCapacity);
