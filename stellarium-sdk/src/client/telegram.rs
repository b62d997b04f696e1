//! Telegram Bot API client.

use super::ClientError;
use crate::objects::telegram::{ChatIdRequest, GetUpdates, SendMessage};
use crate::objects::{TelegramResponse, Update, User};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

const API_BASE: &str = "https://api.telegram.org/";

/// Typed client for the subset of the Bot API the bot uses.
#[derive(Clone)]
pub struct TelegramClient {
    http: Client,
    base_url: Url,
}

impl std::fmt::Debug for TelegramClient {
    // The base URL embeds the bot token.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient").finish_non_exhaustive()
    }
}

impl TelegramClient {
    /// Create a client for the bot identified by `token`.
    pub fn new(token: &str) -> Result<Self, ClientError> {
        // Not `join`: the `:` inside a token would parse as a URL scheme.
        let base_url = Url::parse(&format!("{API_BASE}bot{token}/"))?;
        // Long polls hold the request open for up to a minute.
        let http = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());
        Ok(Self { http, base_url })
    }

    /// Point the client at a different API host (e.g. a local Bot API server).
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// `getMe`: identity of the bot account.
    pub async fn get_me(&self) -> Result<User, ClientError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// `getUpdates` long poll starting at `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u32,
    ) -> Result<Vec<Update>, ClientError> {
        let request = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: &["message"],
        };
        self.call("getUpdates", &request).await
    }

    /// `sendMessage` with plain text.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .call("sendMessage", &SendMessage { chat_id, text })
            .await?;
        Ok(())
    }

    /// `getChatMemberCount`.
    pub async fn get_chat_member_count(&self, chat_id: i64) -> Result<u32, ClientError> {
        self.call("getChatMemberCount", &ChatIdRequest { chat_id })
            .await
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.base_url.join(method)?;
        let resp = self.http.post(url).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        // The Bot API reports failures in a JSON envelope with a non-2xx status;
        // fall back to the raw status only if the body is not that envelope.
        let envelope: TelegramResponse<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(ClientError::Json(e)),
            Err(_) => return Err(ClientError::Api { status, body: text }),
        };

        match envelope {
            TelegramResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            TelegramResponse {
                error_code,
                description,
                ..
            } => Err(ClientError::Telegram {
                code: error_code.unwrap_or_else(|| i64::from(status.as_u16())),
                description: description.unwrap_or_default(),
            }),
        }
    }
}
