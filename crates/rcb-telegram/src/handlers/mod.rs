//! Telegram update handlers.
//!
//! Each handler only translates the teloxide update into its transport-agnostic
//! form and hands it to the core dispatcher, which owns auth, sessions and replies.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{Message, User},
};

use rcb_core::{
    domain::{ChatId, MessageId},
    messaging::types::{Document, IncomingMessage, Sender},
};

use crate::router::AppState;

mod callback;

pub use callback::handle_callback;

pub(crate) fn sender_from(user: &User) -> Sender {
    Sender {
        username: user.username.clone(),
        first_name: user.first_name.clone(),
    }
}

pub(crate) fn incoming_from(msg: &Message) -> IncomingMessage {
    IncomingMessage {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
        sender: msg.from().map(sender_from),
        text: msg.text().map(str::to_string),
        document: msg.document().map(|d| Document {
            file_id: d.file.id.clone(),
        }),
    }
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let incoming = incoming_from(&msg);
    if incoming.text.is_none() && incoming.document.is_none() {
        tracing::debug!(chat_id = incoming.chat_id.0, "ignoring message without text or document");
        return Ok(());
    }

    state.core.handle_message(incoming).await;
    Ok(())
}
