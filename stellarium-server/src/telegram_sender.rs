//! Outbound sender backed by the Telegram Bot API.

use async_trait::async_trait;
use stellarium_core::events::SubscriberId;
use stellarium_core::processors::{DeliveryError, OutboundSender};
use stellarium_sdk::client::{ClientError, TelegramClient};

/// Groups with fewer members than this only contain the bot.
const MIN_GROUP_MEMBERS: u32 = 2;

pub struct TelegramSender {
    client: TelegramClient,
}

impl TelegramSender {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OutboundSender for TelegramSender {
    async fn send(&self, destination: SubscriberId, text: &str) -> Result<(), DeliveryError> {
        self.client
            .send_message(destination.0, text)
            .await
            .map_err(classify)
    }

    async fn probe(&self, destination: SubscriberId) -> Result<(), DeliveryError> {
        if !destination.is_group() {
            return Ok(());
        }
        let members = self
            .client
            .get_chat_member_count(destination.0)
            .await
            .map_err(|e| DeliveryError::Recoverable(e.to_string()))?;
        check_members(members)
    }
}

fn classify(error: ClientError) -> DeliveryError {
    if error.is_rejection() {
        DeliveryError::Permanent(error.to_string())
    } else {
        DeliveryError::Recoverable(error.to_string())
    }
}

fn check_members(members: u32) -> Result<(), DeliveryError> {
    if members < MIN_GROUP_MEMBERS {
        Err(DeliveryError::Permanent(format!(
            "bot left alone ({members} members)"
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_and_forbidden_are_permanent() {
        let forbidden = ClientError::Telegram {
            code: 403,
            description: "Forbidden: bot was blocked by the user".into(),
        };
        assert!(matches!(classify(forbidden), DeliveryError::Permanent(_)));

        let bad_request = ClientError::Telegram {
            code: 400,
            description: "Bad Request: chat not found".into(),
        };
        assert!(matches!(classify(bad_request), DeliveryError::Permanent(_)));
    }

    #[test]
    fn throttling_is_recoverable() {
        let throttled = ClientError::Telegram {
            code: 429,
            description: "Too Many Requests: retry after 5".into(),
        };
        assert!(matches!(classify(throttled), DeliveryError::Recoverable(_)));
    }

    #[test]
    fn lonely_group_is_permanent() {
        assert!(matches!(check_members(1), Err(DeliveryError::Permanent(_))));
        assert!(check_members(2).is_ok());
    }
}
