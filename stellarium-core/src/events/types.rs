//! Event type definitions.

use compact_str::CompactString;
use stellarium_sdk::objects::horizon::NATIVE_ASSET_TYPE;
use stellarium_sdk::objects::{OperationRecord, TradeRecord};
use std::fmt;

/// Display code of the native asset.
pub const NATIVE_ASSET_CODE: &str = "XLM";

/// Opaque subscriber handle (a Telegram chat id; negative for groups).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub i64);

impl SubscriberId {
    /// Group-like destinations have negative ids.
    pub fn is_group(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ledger streams the bot follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Operations,
    Trades,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::Operations, StreamKind::Trades];

    /// Name used as the checkpoint key.
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Operations => "operations",
            StreamKind::Trades => "trades",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position in a ledger stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// Start from the live tip of the stream.
    Now,
    /// Resume after this paging token.
    Token(String),
}

impl Cursor {
    pub fn as_str(&self) -> &str {
        match self {
            Cursor::Now => "now",
            Cursor::Token(token) => token,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asset as shown to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    Native,
    Issued { code: CompactString },
}

impl Asset {
    pub fn from_horizon(asset_type: &str, code: Option<&str>) -> Self {
        if asset_type == NATIVE_ASSET_TYPE {
            Asset::Native
        } else {
            Asset::Issued {
                code: code.unwrap_or_default().into(),
            }
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Asset::Native => NATIVE_ASSET_CODE,
            Asset::Issued { code } => code,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A payment between two accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    /// Literal decimal amount as published by the ledger.
    pub amount: String,
    pub asset: Asset,
    pub memo: Option<String>,
}

/// A funded account creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCreated {
    pub funder: String,
    pub account: String,
    pub starting_balance: String,
    pub memo: Option<String>,
}

/// A trade between two counterparties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    pub base_account: Option<String>,
    pub base_amount: String,
    pub base_asset: Asset,
    pub counter_account: Option<String>,
    pub counter_amount: String,
    pub counter_asset: Asset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEventKind {
    Transfer(Transfer),
    AccountCreated(AccountCreated),
    Trade(Trade),
    /// Nothing to notify (failed transaction, uninteresting operation type).
    Ignored,
    /// The payload could not be decoded; only its position is known.
    Malformed { reason: String },
}

/// One event from a ledger stream together with its cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEvent {
    pub cursor: String,
    pub kind: LedgerEventKind,
}

impl LedgerEvent {
    pub fn malformed(cursor: String, reason: impl Into<String>) -> Self {
        Self {
            cursor,
            kind: LedgerEventKind::Malformed {
                reason: reason.into(),
            },
        }
    }
}

impl From<OperationRecord> for LedgerEvent {
    fn from(op: OperationRecord) -> Self {
        let memo = op.text_memo().map(str::to_owned);
        let kind = if !op.transaction_successful {
            LedgerEventKind::Ignored
        } else {
            match op.kind.as_str() {
                "payment" => match (op.from, op.to, op.amount, op.asset_type) {
                    (Some(from), Some(to), Some(amount), Some(asset_type)) => {
                        LedgerEventKind::Transfer(Transfer {
                            from,
                            to,
                            amount,
                            asset: Asset::from_horizon(&asset_type, op.asset_code.as_deref()),
                            memo,
                        })
                    }
                    _ => LedgerEventKind::Malformed {
                        reason: "payment without from/to/amount/asset_type".into(),
                    },
                },
                "create_account" => match (op.funder, op.account, op.starting_balance) {
                    (Some(funder), Some(account), Some(starting_balance)) => {
                        LedgerEventKind::AccountCreated(AccountCreated {
                            funder,
                            account,
                            starting_balance,
                            memo,
                        })
                    }
                    _ => LedgerEventKind::Malformed {
                        reason: "create_account without funder/account/starting_balance".into(),
                    },
                },
                _ => LedgerEventKind::Ignored,
            }
        };

        Self {
            cursor: op.paging_token,
            kind,
        }
    }
}

impl From<TradeRecord> for LedgerEvent {
    fn from(trade: TradeRecord) -> Self {
        Self {
            cursor: trade.paging_token,
            kind: LedgerEventKind::Trade(Trade {
                base_account: trade.base_account,
                base_amount: trade.base_amount,
                base_asset: Asset::from_horizon(
                    &trade.base_asset_type,
                    trade.base_asset_code.as_deref(),
                ),
                counter_account: trade.counter_account,
                counter_amount: trade.counter_amount,
                counter_asset: Asset::from_horizon(
                    &trade.counter_asset_type,
                    trade.counter_asset_code.as_deref(),
                ),
            }),
        }
    }
}

/// A text destined for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub destination: SubscriberId,
    pub text: String,
}

impl Notification {
    pub fn new(destination: SubscriberId, text: impl Into<String>) -> Self {
        Self {
            destination,
            text: text.into(),
        }
    }
}
