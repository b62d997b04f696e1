//! Horizon client: account lookups and streaming endpoints.

use super::ClientError;
use crate::objects::{AccountRecord, OperationRecord, StreamRecord, TradeRecord};
use crate::sse::{SseDecoder, SseEvent};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A live Horizon stream. Ends when the server closes the connection.
pub type HorizonStream<T> = BoxStream<'static, Result<StreamRecord<T>, ClientError>>;

/// Typed client for a Horizon instance.
#[derive(Debug, Clone)]
pub struct HorizonClient {
    http: Client,
    base_url: Url,
}

impl HorizonClient {
    /// Create a new `HorizonClient` for `base_url` (e.g. `https://horizon.stellar.org`).
    pub fn new(base_url: Url) -> Self {
        // No overall timeout: streaming responses stay open indefinitely.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http, base_url }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `GET /accounts/{id}`.
    pub async fn account(&self, account_id: &str) -> Result<AccountRecord, ClientError> {
        let url = self.base_url.join(&format!("accounts/{account_id}"))?;
        let resp = self
            .http
            .get(url)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        Ok(resp.json().await?)
    }

    /// Stream operations (with their transactions joined) from `cursor`.
    pub async fn stream_operations(
        &self,
        cursor: &str,
    ) -> Result<HorizonStream<OperationRecord>, ClientError> {
        self.stream("operations", &[("cursor", cursor), ("join", "transactions")])
            .await
    }

    /// Stream trades from `cursor`.
    pub async fn stream_trades(
        &self,
        cursor: &str,
    ) -> Result<HorizonStream<TradeRecord>, ClientError> {
        self.stream("trades", &[("cursor", cursor)]).await
    }

    async fn stream<T>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<HorizonStream<T>, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = self.base_url.join(path)?;
        debug!(url = %url, ?query, "Opening Horizon stream");

        let resp = self
            .http
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }

        let state = (resp.bytes_stream().boxed(), SseDecoder::new(), VecDeque::new());
        let records = stream::unfold(state, |(mut body, mut decoder, mut pending)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((Ok(event), (body, decoder, pending)));
                }
                match body.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                    Some(Err(e)) => return Some((Err(ClientError::from(e)), (body, decoder, pending))),
                    None => return None,
                }
            }
        })
        .filter_map(|item: Result<SseEvent, ClientError>| async move {
            match item {
                Ok(event) => decode_record(event).map(Ok),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(records.boxed())
    }
}

/// Turn one SSE event into a typed record.
///
/// Horizon sends bare JSON strings (`"hello"`, `"byebye"`) as keep-alives;
/// those are dropped.
fn decode_record<T: DeserializeOwned>(event: SseEvent) -> Option<StreamRecord<T>> {
    let data = event.data.trim();
    if data.starts_with('"') {
        return None;
    }
    let payload = serde_json::from_str::<T>(data).map_err(|e| e.to_string());
    Some(StreamRecord {
        paging_token: event.id,
        payload,
    })
}
