//! Ledger source backed by Horizon's streaming endpoints.

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::future::ready;
use stellarium_core::events::{Cursor, LedgerEvent, StreamKind};
use stellarium_core::processors::{LedgerEventStream, LedgerSource, SourceError};
use stellarium_sdk::client::{ClientError, HorizonClient, HorizonStream};
use stellarium_sdk::objects::StreamRecord;
use tracing::warn;

pub struct HorizonSource {
    client: HorizonClient,
}

impl HorizonSource {
    pub fn new(client: HorizonClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LedgerSource for HorizonSource {
    async fn open(
        &self,
        stream: StreamKind,
        cursor: &Cursor,
    ) -> Result<LedgerEventStream, SourceError> {
        match stream {
            StreamKind::Operations => {
                let records = self
                    .client
                    .stream_operations(cursor.as_str())
                    .await
                    .map_err(SourceError::client)?;
                Ok(into_events(records))
            }
            StreamKind::Trades => {
                let records = self
                    .client
                    .stream_trades(cursor.as_str())
                    .await
                    .map_err(SourceError::client)?;
                Ok(into_events(records))
            }
        }
    }
}

fn into_events<T>(records: HorizonStream<T>) -> LedgerEventStream
where
    T: Into<LedgerEvent> + Send + 'static,
{
    records.filter_map(|item| ready(to_event(item))).boxed()
}

/// Records that fail to decode still advance the cursor when their position
/// is known; without an id they are skipped.
fn to_event<T: Into<LedgerEvent>>(
    item: Result<StreamRecord<T>, ClientError>,
) -> Option<Result<LedgerEvent, SourceError>> {
    match item {
        Err(e) => Some(Err(SourceError::client(e))),
        Ok(StreamRecord {
            payload: Ok(record),
            ..
        }) => Some(Ok(record.into())),
        Ok(StreamRecord {
            paging_token: Some(cursor),
            payload: Err(reason),
        }) => Some(Ok(LedgerEvent::malformed(cursor, reason))),
        Ok(StreamRecord {
            paging_token: None,
            payload: Err(reason),
        }) => {
            warn!(reason = %reason, "Skipping undecodable record without id");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellarium_core::events::LedgerEventKind;
    use stellarium_sdk::objects::TradeRecord;

    fn trade() -> TradeRecord {
        TradeRecord {
            paging_token: "107449468983894017-0".into(),
            base_account: Some("GBASE".into()),
            base_amount: "10.0000000".into(),
            base_asset_type: "native".into(),
            base_asset_code: None,
            counter_account: Some("GCOUNTER".into()),
            counter_amount: "5.0000000".into(),
            counter_asset_type: "credit_alphanum4".into(),
            counter_asset_code: Some("USD".into()),
        }
    }

    #[test]
    fn decoded_record_becomes_event() {
        let item = Ok(StreamRecord {
            paging_token: Some("107449468983894017-0".into()),
            payload: Ok(trade()),
        });
        let event = to_event(item).unwrap().unwrap();
        assert_eq!(event.cursor, "107449468983894017-0");
        assert!(matches!(event.kind, LedgerEventKind::Trade(_)));
    }

    #[test]
    fn undecodable_record_with_id_is_malformed() {
        let item: Result<StreamRecord<TradeRecord>, ClientError> = Ok(StreamRecord {
            paging_token: Some("42".into()),
            payload: Err("missing field `base_amount`".into()),
        });
        let event = to_event(item).unwrap().unwrap();
        assert_eq!(event.cursor, "42");
        assert!(matches!(event.kind, LedgerEventKind::Malformed { .. }));
    }

    #[test]
    fn undecodable_record_without_id_is_skipped() {
        let item: Result<StreamRecord<TradeRecord>, ClientError> = Ok(StreamRecord {
            paging_token: None,
            payload: Err("garbage".into()),
        });
        assert!(to_event(item).is_none());
    }

    #[test]
    fn transport_errors_end_the_session() {
        let item: Result<StreamRecord<TradeRecord>, ClientError> =
            Err(ClientError::Json(serde_json::from_str::<u8>("x").unwrap_err()));
        assert!(matches!(to_event(item), Some(Err(SourceError::Client(_)))));
    }
}
