use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Sub},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const WON_CURRENCY_CODE: &str = "KRW";

//--------------------------------------        Won          ---------------------------------------------------------
/// A whole-unit currency amount. The gateways we talk to have no minor unit, so prices are plain integers.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Won(i64);

op!(binary Won, Add, add);
op!(binary Won, Sub, sub);
op!(inplace Won, AddAssign, add_assign);

impl Sum for Won {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented as a Won amount: {0}")]
pub struct WonConversionError(String);

impl From<i64> for Won {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Won {
    type Error = WonConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value).map(Self).map_err(|_| WonConversionError(format!("{value} is too large")))
    }
}

impl FromStr for Won {
    type Err = WonConversionError;

    /// Gateways send amounts as strings, sometimes with thousands separators ("50,000").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s.trim().replace(',', "");
        cleaned.parse::<i64>().map(Self).map_err(|e| WonConversionError(format!("{s}: {e}")))
    }
}

impl Display for Won {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "₩{}", self.0)
    }
}

impl Won {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}
