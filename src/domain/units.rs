//! Gas, balances and the fixed deposit/gas schedule.
//!
//! Balances are yoctoNEAR (`u128`). On the wire they travel as decimal
//! strings (`U128`), exactly like NEP-141 amounts, because JSON numbers
//! cannot hold 128-bit integers.

use std::fmt;
use std::ops::{Add, Mul};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Amount in yoctoNEAR (or in the smallest unit of a fungible token).
pub type Balance = u128;

/// 10^24 yocto = 1 NEAR.
pub const ONE_NEAR: Balance = 10_u128.pow(24);
/// The 1 yocto attached to calls that demand a full-access signature.
pub const ONE_YOCTO: Balance = 1;
/// 0.1 NEAR.
pub const POINT_ONE_NEAR: Balance = 10_u128.pow(23);
/// Funding moved into every freshly deployed index account.
pub const TWENTY_ONE_NEAR: Balance = 21 * ONE_NEAR;
/// Per-token storage registration deposit (NEP-145 `storage_deposit`).
pub const STORAGE_DEPOSIT: Balance = 12_500_000_000_000_000_000_000;

/// Prepaid gas in gas units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gas(pub u64);

impl Gas {
    pub const ONE_TERA: Self = Self(1_000_000_000_000);
    /// Hard per-transaction ceiling enforced by the platform.
    pub const MAX: Self = Self::from_tgas(300);

    pub const fn from_tgas(tgas: u64) -> Self {
        Self(tgas * Self::ONE_TERA.0)
    }

    pub const fn as_tgas(self) -> u64 {
        self.0 / Self::ONE_TERA.0
    }

    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl Add for Gas {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Mul<u64> for Gas {
    type Output = Self;

    fn mul(self, rhs: u64) -> Self {
        Self(self.0.saturating_mul(rhs))
    }
}

impl std::iter::Sum for Gas {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self(0), |acc, g| acc + g)
    }
}

impl fmt::Display for Gas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} TGas", self.as_tgas())
    }
}

pub const FIVE_TGAS: Gas = Gas::from_tgas(5);
pub const SEVEN_TGAS: Gas = Gas::from_tgas(7);
pub const TWENTY_TGAS: Gas = Gas::from_tgas(20);
pub const FORTY_TGAS: Gas = Gas::from_tgas(40);
pub const SEVENTY_FIVE_TGAS: Gas = Gas::from_tgas(75);
pub const THREE_HUNDRED_TGAS: Gas = Gas::MAX;

/// `u128` that (de)serializes as a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct U128(pub u128);

impl From<u128> for U128 {
    fn from(v: u128) -> Self {
        Self(v)
    }
}

impl From<U128> for u128 {
    fn from(v: U128) -> Self {
        v.0
    }
}

impl fmt::Display for U128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for U128 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for U128 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u128>()
            .map(Self)
            .map_err(|e| serde::de::Error::custom(format!("invalid U128 `{s}`: {e}")))
    }
}

/// Render a yocto amount as NEAR with up to `scale` fractional digits.
///
/// Amounts beyond `Decimal`'s 96-bit mantissa fall back to the raw yocto
/// string; no realistic balance gets there.
pub fn format_near(amount: Balance, scale: u32) -> String {
    match i128::try_from(amount).ok().and_then(|v| Decimal::try_from_i128_with_scale(v, 24).ok()) {
        Some(d) => d.round_dp(scale).normalize().to_string(),
        None => format!("{amount} yN"),
    }
}

/// Parse a decimal NEAR amount (`"26"`, `"0.5"`) into yocto.
pub fn parse_near(amount: &str) -> Option<Balance> {
    let d: Decimal = amount.trim().parse().ok()?;
    if d.is_sign_negative() {
        return None;
    }
    let whole = d.trunc();
    let frac = d - whole;
    let whole: u128 = whole.to_string().parse().ok()?;
    // Decimal keeps at most 28 fractional digits, so scale the fraction in two steps.
    let frac_yocto = (frac * Decimal::from(10_u64.pow(12)) * Decimal::from(10_u64.pow(12))).trunc();
    let frac_yocto: u128 = frac_yocto.to_string().parse().ok()?;
    whole.checked_mul(ONE_NEAR)?.checked_add(frac_yocto)
}
