use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{ChatAction, Reply},
    Result,
};

/// Outbound side of the chat transport.
///
/// Send failures surface as `Error::Send(SendFailure)` so callers can log the cause.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_reply(&self, chat_id: ChatId, reply: &Reply) -> Result<MessageRef>;

    /// Replace a message's text and drop its inline keyboard.
    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()>;

    /// Resolve an uploaded file id to a downloadable URL.
    async fn file_url(&self, file_id: &str) -> Result<String>;
}
