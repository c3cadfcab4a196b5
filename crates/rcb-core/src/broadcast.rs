use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    config::Config,
    dispatch::describe_send_error,
    messaging::{port::MessagingPort, types::Reply},
    ports::{record_error, LogStore},
};

/// Local endpoint the broadcast CLI posts to, and its form field.
pub const BROADCAST_PATH: &str = "/broadcast";
pub const BROADCAST_PARAM: &str = "m";

/// Capacity of the broadcast queue; producers wait when it is full.
pub const QUEUE_SIZE: usize = 3;

pub fn queue() -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
    mpsc::channel(QUEUE_SIZE)
}

/// Fans queued messages out to every known chat of an allowed identity.
pub struct BroadcastRelay {
    cfg: Arc<Config>,
    messenger: Arc<dyn MessagingPort>,
    store: Arc<dyn LogStore>,
}

impl BroadcastRelay {
    pub fn new(
        cfg: Arc<Config>,
        messenger: Arc<dyn MessagingPort>,
        store: Arc<dyn LogStore>,
    ) -> Self {
        Self {
            cfg,
            messenger,
            store,
        }
    }

    /// Drain the queue until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<String>) {
        while let Some(message) = rx.recv().await {
            self.broadcast(&message).await;
        }
        tracing::debug!("broadcast queue closed");
    }

    /// Returns the number of chats the message was delivered to.
    pub async fn broadcast(&self, message: &str) -> usize {
        let chats = match self.store.chats() {
            Ok(chats) => chats,
            Err(e) => {
                record_error(
                    self.store.as_ref(),
                    &format!("failed to get chats from local database: {e}"),
                );
                return 0;
            }
        };

        let reply = Reply::menu(message);
        let mut delivered = 0;
        for chat in chats {
            if !self.cfg.is_available_id(&chat.identity) {
                record_error(
                    self.store.as_ref(),
                    &format!("not an allowed user id for broadcasting: {}", chat.identity),
                );
                continue;
            }
            match self.messenger.send_reply(chat.chat_id, &reply).await {
                Ok(_) => delivered += 1,
                Err(e) => record_error(
                    self.store.as_ref(),
                    &describe_send_error(&e, chat.chat_id, message.len(), true),
                ),
            }
        }
        delivered
    }
}
