//! NEAR account identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::error::ContractError;

/// Validated NEAR account id (`alice.testnet`, `wrap.testnet`, a 64-char implicit id).
///
/// Rules: 2..=64 chars, lowercase alphanumerics separated by single
/// `-`, `_` or `.`, no separator at either end.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub const MIN_LEN: usize = 2;
    pub const MAX_LEN: usize = 64;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<prefix>.<self>`, the way the manager names index accounts.
    pub fn sub_account(&self, prefix: &str) -> Result<Self, ContractError> {
        format!("{prefix}.{}", self.0).parse()
    }

    /// Whether `self` is a direct sub-account of `parent`.
    pub fn is_sub_account_of(&self, parent: &Self) -> bool {
        self.0
            .strip_suffix(parent.as_str())
            .and_then(|p| p.strip_suffix('.'))
            .is_some_and(|p| !p.is_empty() && !p.contains('.'))
    }

    fn validate(s: &str) -> Result<(), ContractError> {
        let invalid = || ContractError::InvalidAccountId(s.to_string());
        if s.len() < Self::MIN_LEN || s.len() > Self::MAX_LEN {
            return Err(invalid());
        }
        let mut prev_separator = true;
        for c in s.chars() {
            let separator = matches!(c, '-' | '_' | '.');
            if separator {
                if prev_separator {
                    return Err(invalid());
                }
            } else if !(c.is_ascii_lowercase() || c.is_ascii_digit()) {
                return Err(invalid());
            }
            prev_separator = separator;
        }
        if prev_separator {
            return Err(invalid());
        }
        Ok(())
    }
}

impl FromStr for AccountId {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::validate(s)?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for AccountId {
    type Error = ContractError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::try_from(s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
