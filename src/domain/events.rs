//! NEP-297 event logs for the index token.
//!
//! Events are emitted as `EVENT_JSON:{...}` log lines with the `nep141`
//! standard and an array payload.

use serde::Serialize;

use super::account::AccountId;
use super::units::U128;

const STANDARD: &str = "nep141";
const VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FtMint {
    pub owner_id: AccountId,
    pub amount: U128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FtTransfer {
    pub old_owner_id: AccountId,
    pub new_owner_id: AccountId,
    pub amount: U128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Nep141Event {
    FtMint(Vec<FtMint>),
    FtTransfer(Vec<FtTransfer>),
}

#[derive(Serialize)]
struct Envelope<'a> {
    standard: &'static str,
    version: &'static str,
    #[serde(flatten)]
    event: &'a Nep141Event,
}

impl Nep141Event {
    /// Log line in the `EVENT_JSON:` format indexers pick up.
    pub fn to_log(&self) -> String {
        let envelope = Envelope {
            standard: STANDARD,
            version: VERSION,
            event: self,
        };
        format!(
            "EVENT_JSON:{}",
            serde_json::to_string(&envelope).unwrap_or_default()
        )
    }
}
