use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::timeout;

use crate::{
    domain::{ChatId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, Reply},
    },
    Result,
};

/// Deadline for calls whose result matters (sends, edits, file lookups).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Deadline for best-effort calls (typing indicator, reactions).
pub const IGNORABLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug)]
pub struct DeadlineConfig {
    pub request: Duration,
    pub ignorable: Duration,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            request: REQUEST_TIMEOUT,
            ignorable: IGNORABLE_TIMEOUT,
        }
    }
}

/// MessagingPort decorator that bounds every outbound call with a deadline.
///
/// An expired call resolves to `Error::Timeout` and is handled like any other failure.
pub struct DeadlineMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: DeadlineConfig,
}

impl DeadlineMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: DeadlineConfig) -> Self {
        Self { inner, cfg }
    }
}

async fn bounded<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout(limit)),
    }
}

#[async_trait::async_trait]
impl MessagingPort for DeadlineMessenger {
    async fn send_reply(&self, chat_id: ChatId, reply: &Reply) -> Result<MessageRef> {
        bounded(self.cfg.request, self.inner.send_reply(chat_id, reply)).await
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        bounded(self.cfg.request, self.inner.edit_text(msg, text)).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        bounded(
            self.cfg.request,
            self.inner.answer_callback_query(callback_id, text),
        )
        .await
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        bounded(self.cfg.ignorable, self.inner.send_chat_action(chat_id, action)).await
    }

    async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        bounded(self.cfg.ignorable, self.inner.set_reaction(msg, emoji)).await
    }

    async fn file_url(&self, file_id: &str) -> Result<String> {
        bounded(self.cfg.request, self.inner.file_url(file_id)).await
    }
}
