use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const GHS_CURRENCY_CODE: &str = "GHS";
pub const GHS_CURRENCY_CODE_LOWER: &str = "ghs";

//--------------------------------------       Cedis        ----------------------------------------------------------
/// An amount of Ghanaian cedis, stored as an integer number of pesewas (minor units).
///
/// The payment gateway reports amounts in minor units, so `from_pesewas` is the lossless constructor. Converting to
/// major units (dividing by 100) only ever happens at display time.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Cedis(i64);

op!(binary Cedis, Add, add);
op!(binary Cedis, Sub, sub);
op!(inplace Cedis, SubAssign, sub_assign);
op!(unary Cedis, Neg, neg);

impl Mul<i64> for Cedis {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Cedis {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in pesewas: {0}")]
pub struct CedisConversionError(String);

impl From<i64> for Cedis {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Cedis {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Cedis {}

impl TryFrom<u64> for Cedis {
    type Error = CedisConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(CedisConversionError(format!("Value {} is too large to convert to Cedis", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Cedis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let major = self.0 as f64 / 100.0;
        write!(f, "GHS {major:0.2}")
    }
}

impl Cedis {
    pub fn from_pesewas(value: i64) -> Self {
        Self(value)
    }

    /// Whole-cedi constructor, mostly useful in tests and fixtures.
    pub fn from_cedis(value: i64) -> Self {
        Self(value * 100)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_in_major_units() {
        assert_eq!(Cedis::from_pesewas(10_000).to_string(), "GHS 100.00");
        assert_eq!(Cedis::from_pesewas(3_050).to_string(), "GHS 30.50");
        assert_eq!(Cedis::from_pesewas(5).to_string(), "GHS 0.05");
    }

    #[test]
    fn arithmetic() {
        let a = Cedis::from_cedis(100);
        let b = Cedis::from_pesewas(3_000);
        assert_eq!(a - b, Cedis::from_pesewas(7_000));
        assert_eq!(a + b, Cedis::from_pesewas(13_000));
        assert_eq!(-b, Cedis::from_pesewas(-3_000));
        assert!((a - b * 4).is_negative());
        let total: Cedis = vec![a, b, b].into_iter().sum();
        assert_eq!(total, Cedis::from_pesewas(16_000));
    }
}
