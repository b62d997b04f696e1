//! Telegram long-poll loop feeding the command handler.

use crate::commands::{Command, CommandHandler};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stellarium_core::events::SubscriberId;
use stellarium_core::processors::Delivery;
use stellarium_core::utils::shutdown_requested;
use stellarium_sdk::client::{ClientError, TelegramClient};
use stellarium_sdk::objects::Update;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Seconds the Bot API holds a `getUpdates` request open.
const LONG_POLL_SECS: u32 = 60;

/// Pause after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Where chat updates come from.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Updates with an id of at least `offset`, waiting up to
    /// `timeout_secs` for one to arrive.
    async fn updates(&self, offset: i64, timeout_secs: u32) -> Result<Vec<Update>, ClientError>;
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn updates(&self, offset: i64, timeout_secs: u32) -> Result<Vec<Update>, ClientError> {
        self.get_updates(offset, timeout_secs).await
    }
}

pub struct CommandListener {
    source: Arc<dyn UpdateSource>,
    handler: Arc<CommandHandler>,
    delivery: Delivery,
    shutdown_rx: watch::Receiver<bool>,
    tasks: JoinSet<()>,
}

impl CommandListener {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        handler: Arc<CommandHandler>,
        delivery: Delivery,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            handler,
            delivery,
            shutdown_rx,
            tasks: JoinSet::new(),
        }
    }

    pub async fn run(mut self) {
        info!("CommandListener started");
        let mut offset = 0;

        loop {
            while self.tasks.try_join_next().is_some() {}

            tokio::select! {
                biased;

                _ = shutdown_requested(&mut self.shutdown_rx) => break,

                polled = self.source.updates(offset, LONG_POLL_SECS) => match polled {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            self.dispatch(update);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to poll updates");
                        tokio::select! {
                            biased;
                            _ = shutdown_requested(&mut self.shutdown_rx) => break,
                            _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                        }
                    }
                },
            }
        }

        while self.tasks.join_next().await.is_some() {}
        info!("CommandListener shutdown complete");
    }

    fn dispatch(&mut self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(text) = message.text else {
            return;
        };
        let Some(command) = Command::parse(&text) else {
            debug!(chat = message.chat.id, "Ignoring non-command message");
            return;
        };

        let chat = SubscriberId(message.chat.id);
        info!(chat = %chat, text = ?text, "Received from chat");

        let handler = self.handler.clone();
        let delivery = self.delivery.clone();
        self.tasks.spawn(async move {
            for reply in handler.handle(chat, command).await {
                delivery.deliver(chat, &reply).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{AccountLookup, DONATION_ACCOUNT, HELP_TEXT};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use stellarium_core::config::PipelineConfig;
    use stellarium_core::framework::DatabaseProcessor;
    use stellarium_core::processors::{DeliveryError, OutboundSender};
    use stellarium_core::registry::SubscriberRegistry;
    use stellarium_sdk::objects::{AccountRecord, Chat, Message};
    use tokio::time::Instant;

    /// Plays back scripted poll results, then blocks like an idle long poll.
    struct ScriptedUpdates {
        polls: Mutex<VecDeque<Result<Vec<Update>, ClientError>>>,
        offsets: Mutex<Vec<i64>>,
    }

    impl ScriptedUpdates {
        fn new(polls: Vec<Result<Vec<Update>, ClientError>>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
                offsets: Mutex::default(),
            }
        }

        fn offsets(&self) -> Vec<i64> {
            self.offsets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpdateSource for ScriptedUpdates {
        async fn updates(&self, offset: i64, _timeout_secs: u32) -> Result<Vec<Update>, ClientError> {
            self.offsets.lock().unwrap().push(offset);
            let next = self.polls.lock().unwrap().pop_front();
            match next {
                Some(polled) => polled,
                None => std::future::pending().await,
            }
        }
    }

    /// Records replies, optionally after a delay.
    #[derive(Default)]
    struct Replies {
        delay: Duration,
        sent: Mutex<Vec<(SubscriberId, String)>>,
    }

    impl Replies {
        fn sent(&self) -> Vec<(SubscriberId, String)> {
            let mut sent = self.sent.lock().unwrap().clone();
            sent.sort();
            sent
        }
    }

    #[async_trait]
    impl OutboundSender for Replies {
        async fn send(&self, destination: SubscriberId, text: &str) -> Result<(), DeliveryError> {
            tokio::time::sleep(self.delay).await;
            self.sent
                .lock()
                .unwrap()
                .push((destination, text.to_owned()));
            Ok(())
        }
    }

    struct NoAccounts;

    #[async_trait]
    impl AccountLookup for NoAccounts {
        async fn account(&self, _account_id: &str) -> Result<AccountRecord, ClientError> {
            Err(ClientError::Telegram {
                code: 404,
                description: "Not Found".into(),
            })
        }
    }

    fn text(update_id: i64, chat: i64, text: &str) -> Update {
        Update {
            update_id,
            message: Some(Message {
                message_id: update_id,
                chat: Chat {
                    id: chat,
                    kind: "private".into(),
                },
                text: Some(text.into()),
            }),
        }
    }

    async fn listener(
        source: Arc<ScriptedUpdates>,
        replies: Arc<Replies>,
    ) -> (CommandListener, watch::Sender<bool>) {
        let db = DatabaseProcessor::in_memory().await.unwrap();
        let registry = SubscriberRegistry::load(db).await.unwrap();
        let handler = Arc::new(CommandHandler::new(
            registry.clone(),
            Arc::new(NoAccounts),
            Instant::now(),
        ));
        let delivery = Delivery::new(replies, registry, &PipelineConfig::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            CommandListener::new(source, handler, delivery, shutdown_rx),
            shutdown_tx,
        )
    }

    async fn wait_for_polls(source: &ScriptedUpdates, polls: usize) {
        tokio::time::timeout(Duration::from_secs(60), async {
            while source.offsets().len() < polls {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn advances_offset_and_answers_only_commands() {
        let source = Arc::new(ScriptedUpdates::new(vec![
            Err(ClientError::Telegram {
                code: 502,
                description: "Bad Gateway".into(),
            }),
            Ok(vec![
                text(10, 1, "/help"),
                text(11, 2, "hello"),
                Update {
                    update_id: 12,
                    message: None,
                },
                Update {
                    update_id: 13,
                    message: Some(Message {
                        message_id: 13,
                        chat: Chat {
                            id: 2,
                            kind: "private".into(),
                        },
                        text: None,
                    }),
                },
                text(9, 3, "/donate"),
            ]),
            Ok(vec![]),
        ]));
        let replies = Arc::new(Replies::default());
        let (listener, shutdown_tx) = listener(source.clone(), replies.clone()).await;
        tokio::time::pause();
        let handle = tokio::spawn(listener.run());

        wait_for_polls(&source, 4).await;
        // Retried with the same offset after the failure, then moved past
        // the highest id seen even though it was not the last one.
        assert_eq!(source.offsets(), vec![0, 0, 14, 14]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(
            replies.sent(),
            vec![
                (SubscriberId(1), HELP_TEXT.to_owned()),
                (
                    SubscriberId(3),
                    format!("Donation account:\n{DONATION_ACCOUNT}")
                ),
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_waits_for_pending_replies() {
        let source = Arc::new(ScriptedUpdates::new(vec![Ok(vec![text(1, 5, "/help")])]));
        let replies = Arc::new(Replies {
            delay: Duration::from_secs(5),
            ..Replies::default()
        });
        let (listener, shutdown_tx) = listener(source.clone(), replies.clone()).await;
        tokio::time::pause();
        let started = Instant::now();
        let handle = tokio::spawn(listener.run());

        wait_for_polls(&source, 2).await;
        assert!(replies.sent().is_empty());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(replies.sent(), vec![(SubscriberId(5), HELP_TEXT.to_owned())]);
    }
}
