//! Chat commands.
//!
//! Parses `/command@bot argument` messages and produces the reply texts.
//! Sending the replies is left to the caller.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stellarium_core::events::SubscriberId;
use stellarium_core::registry::{RegistryError, SubscriberRegistry};
use stellarium_sdk::address::StellarAddress;
use stellarium_sdk::client::{ClientError, HorizonClient};
use stellarium_sdk::objects::AccountRecord;
use tokio::time::Instant;
use tracing::{error, info, warn};

pub const DONATION_ACCOUNT: &str = "GB2SWTADAJHQOE5L5DZ5RHFD3G2U6KW7HMDTIZWIWH5WDGZF4AAEAJGX";

pub const HELP_TEXT: &str = "/start stellar_address -> Starts bot\n\
/stop -> Stops bot\n\
/info -> Shows account info\n\
/stats -> Shows bot statistics\n\
/help -> This help\n\
/donate -> Donation account\n\
Chat: https://t.me/stellariumchat";

const INTERNAL_ERROR: &str = "Sorry, Internal error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Start(Option<String>),
    Stop,
    Info,
    Stats,
    Donate,
    Unknown(String),
}

impl Command {
    /// Parse a chat message. Returns `None` for text that is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start();
        if !text.starts_with('/') {
            return None;
        }

        let (head, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        let argument = Some(rest.trim()).filter(|arg| !arg.is_empty());

        Some(match name.as_str() {
            "/help" => Command::Help,
            "/start" => Command::Start(argument.map(str::to_owned)),
            "/stop" => Command::Stop,
            "/info" => Command::Info,
            "/stats" => Command::Stats,
            "/donate" => Command::Donate,
            _ => Command::Unknown(name),
        })
    }
}

/// Account balances lookup used by `/info`.
#[async_trait]
pub trait AccountLookup: Send + Sync {
    async fn account(&self, account_id: &str) -> Result<AccountRecord, ClientError>;
}

#[async_trait]
impl AccountLookup for HorizonClient {
    async fn account(&self, account_id: &str) -> Result<AccountRecord, ClientError> {
        HorizonClient::account(self, account_id).await
    }
}

pub struct CommandHandler {
    registry: SubscriberRegistry,
    accounts: Arc<dyn AccountLookup>,
    started_at: Instant,
}

impl CommandHandler {
    pub fn new(
        registry: SubscriberRegistry,
        accounts: Arc<dyn AccountLookup>,
        started_at: Instant,
    ) -> Self {
        Self {
            registry,
            accounts,
            started_at,
        }
    }

    /// Execute `command` for `chat` and return the replies in order.
    pub async fn handle(&self, chat: SubscriberId, command: Command) -> Vec<String> {
        match command {
            Command::Help => vec![HELP_TEXT.to_owned()],
            Command::Start(argument) => self.start(chat, argument).await,
            Command::Stop => vec![self.stop(chat).await],
            Command::Info => vec![self.info(chat).await],
            Command::Stats => {
                let (chats, accounts) = self.registry.count().await;
                vec![format!(
                    "Uptime: {}\nAccounts: {accounts}\nChats: {chats}",
                    format_uptime(self.started_at.elapsed())
                )]
            }
            Command::Donate => vec![format!("Donation account:\n{DONATION_ACCOUNT}")],
            Command::Unknown(name) => {
                info!(chat = %chat, command = %name, "Unknown command");
                vec!["Invalid command".to_owned(), HELP_TEXT.to_owned()]
            }
        }
    }

    async fn start(&self, chat: SubscriberId, argument: Option<String>) -> Vec<String> {
        if let Some(subscriber) = self.registry.lookup(chat).await {
            let follow_up = match argument {
                Some(_) => "If you want change tracking account, send /stop first".to_owned(),
                None => format!("Tracking Stellar address: {}", subscriber.account),
            };
            return vec!["Bot already started.".to_owned(), follow_up];
        }

        let Some(argument) = argument else {
            return vec![
                "Stellar address not provided".to_owned(),
                HELP_TEXT.to_owned(),
            ];
        };
        let address = match StellarAddress::parse(&argument) {
            Ok(address) => address,
            Err(e) => {
                info!(chat = %chat, error = %e, "Rejected Stellar address");
                return vec!["Invalid Stellar address".to_owned()];
            }
        };

        match self.registry.subscribe(chat, address.as_str()).await {
            Ok(()) => vec![format!("Tracking Stellar address: {address}")],
            Err(RegistryError::AlreadyExists(_)) => vec!["Bot already started.".to_owned()],
            Err(e) => {
                error!(chat = %chat, error = %e, "Failed to subscribe");
                vec![INTERNAL_ERROR.to_owned()]
            }
        }
    }

    async fn stop(&self, chat: SubscriberId) -> String {
        match self.registry.unsubscribe(chat).await {
            Ok(()) => "Bot stopped".to_owned(),
            Err(RegistryError::NotFound(_)) => "Bot already stopped".to_owned(),
            Err(e) => {
                error!(chat = %chat, error = %e, "Failed to unsubscribe");
                INTERNAL_ERROR.to_owned()
            }
        }
    }

    async fn info(&self, chat: SubscriberId) -> String {
        let Some(subscriber) = self.registry.lookup(chat).await else {
            return "You must /start bot first".to_owned();
        };
        match self.accounts.account(&subscriber.account).await {
            Ok(record) => wallet_info(&subscriber.account, &record),
            Err(e) => {
                warn!(chat = %chat, error = %e, "Failed to fetch account");
                "Error obtaining wallet info".to_owned()
            }
        }
    }
}

fn wallet_info(address: &str, record: &AccountRecord) -> String {
    let mut text = format!("Wallet address: {address}\nBalances:\n");
    for balance in &record.balances {
        text.push_str(&format!("{}: {}\n", balance.display_code(), balance.balance));
    }
    text
}

fn format_uptime(elapsed: Duration) -> String {
    let minutes = elapsed.as_secs() / 60;
    format!(
        "{} Days {} Hours {} Minutes",
        minutes / (24 * 60),
        minutes / 60 % 24,
        minutes % 60
    )
}
