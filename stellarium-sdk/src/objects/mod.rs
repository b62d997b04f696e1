pub mod horizon;
pub mod telegram;

pub use horizon::{
    AccountRecord, BalanceRecord, OperationRecord, StreamRecord, TradeRecord, TransactionRecord,
};
pub use telegram::{Chat, Message, TelegramResponse, Update, User};
