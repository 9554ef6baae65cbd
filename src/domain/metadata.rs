//! NEP-148 fungible token metadata.

use serde::{Deserialize, Serialize};

use super::error::{ContractError, ContractResult};

/// Metadata spec version every index token declares.
pub const FT_METADATA_SPEC: &str = "ft-1.0.0";

/// Decimals used by index tokens (same as NEAR).
pub const DEFAULT_DECIMALS: u8 = 24;

/// Fungible token metadata as returned by `ft_metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FungibleTokenMetadata {
    /// Must be `ft-1.0.0`.
    pub spec: String,
    /// Human-readable name; also the sub-account prefix of a deployed index.
    pub name: String,
    /// Ticker, e.g. `NEARBULL`.
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Base64 sha256 of the JSON behind `reference`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_hash: Option<String>,
    pub decimals: u8,
}

impl FungibleTokenMetadata {
    /// Metadata for a new index with the default spec and decimals.
    pub fn index(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            spec: FT_METADATA_SPEC.to_string(),
            name: name.into(),
            symbol: symbol.into(),
            icon: None,
            reference: None,
            reference_hash: None,
            decimals: DEFAULT_DECIMALS,
        }
    }

    pub fn assert_valid(&self) -> ContractResult<()> {
        if self.spec != FT_METADATA_SPEC {
            return Err(ContractError::InvalidMetadata(format!(
                "spec must be {FT_METADATA_SPEC}, got {}",
                self.spec
            )));
        }
        if self.name.trim().is_empty() {
            return Err(ContractError::InvalidMetadata("empty name".into()));
        }
        if self.symbol.trim().is_empty() {
            return Err(ContractError::InvalidMetadata("empty symbol".into()));
        }
        if self.reference.is_some() != self.reference_hash.is_some() {
            return Err(ContractError::InvalidMetadata(
                "reference and reference_hash must be set together".into(),
            ));
        }
        Ok(())
    }

    /// Icon to show, falling back to a generated avatar keyed by symbol.
    pub fn icon_or_avatar(&self) -> String {
        match self.icon.as_deref() {
            Some(icon) if !icon.is_empty() => icon.to_string(),
            _ => format!("https://avatar.tobi.sh/{}", self.symbol),
        }
    }
}
