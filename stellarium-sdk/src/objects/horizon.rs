//! Horizon REST records.
//!
//! Only the fields the bot reads are modelled. Operation records are kept
//! flat (every type-specific field optional) so that unknown operation
//! types still decode and can advance the stream cursor.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Asset type tag Horizon uses for lumens.
pub const NATIVE_ASSET_TYPE: &str = "native";

/// Memo type carrying free text.
pub const TEXT_MEMO_TYPE: &str = "text";

/// A record from the `/operations` stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: String,
    pub paging_token: String,
    #[serde(default = "default_successful")]
    pub transaction_successful: bool,
    #[serde(rename = "type")]
    pub kind: String,

    // payment
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub asset_type: Option<CompactString>,
    #[serde(default)]
    pub asset_code: Option<CompactString>,

    // create_account
    #[serde(default)]
    pub funder: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub starting_balance: Option<String>,

    /// Present when the request used `join=transactions`.
    #[serde(default)]
    pub transaction: Option<TransactionRecord>,
}

fn default_successful() -> bool {
    true
}

impl OperationRecord {
    /// Text memo of the enclosing transaction, if it has a non-empty one.
    pub fn text_memo(&self) -> Option<&str> {
        let tx = self.transaction.as_ref()?;
        if tx.memo_type.as_deref() != Some(TEXT_MEMO_TYPE) {
            return None;
        }
        tx.memo.as_deref().filter(|memo| !memo.is_empty())
    }
}

/// Joined transaction fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(default)]
    pub memo_type: Option<CompactString>,
    #[serde(default)]
    pub memo: Option<String>,
}

/// A record from the `/trades` stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub paging_token: String,
    /// Absent for liquidity-pool trades.
    #[serde(default)]
    pub base_account: Option<String>,
    pub base_amount: String,
    pub base_asset_type: CompactString,
    #[serde(default)]
    pub base_asset_code: Option<CompactString>,
    #[serde(default)]
    pub counter_account: Option<String>,
    pub counter_amount: String,
    pub counter_asset_type: CompactString,
    #[serde(default)]
    pub counter_asset_code: Option<CompactString>,
}

/// `GET /accounts/{id}` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_id: String,
    #[serde(default)]
    pub balances: Vec<BalanceRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub balance: String,
    pub asset_type: CompactString,
    #[serde(default)]
    pub asset_code: Option<CompactString>,
}

impl BalanceRecord {
    /// Display code: `XLM` for lumens, the asset code otherwise.
    pub fn display_code(&self) -> &str {
        if self.asset_type == NATIVE_ASSET_TYPE {
            "XLM"
        } else {
            self.asset_code.as_deref().unwrap_or("?")
        }
    }
}

/// One decoded item of a Horizon stream.
///
/// `paging_token` comes from the SSE `id` field and is available even when
/// the payload itself could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord<T> {
    pub paging_token: Option<String>,
    pub payload: Result<T, String>,
}
