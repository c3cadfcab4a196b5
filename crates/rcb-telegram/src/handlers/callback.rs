use std::sync::Arc;

use teloxide::prelude::*;

use rcb_core::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::types::CallbackQuery as CoreCallback,
};

use super::sender_from;
use crate::router::AppState;

pub(crate) fn callback_from(q: &CallbackQuery) -> Option<CoreCallback> {
    let data = q.data.clone().filter(|d| !d.is_empty())?;
    Some(CoreCallback {
        callback_id: q.id.clone(),
        sender: Some(sender_from(&q.from)),
        data,
        message: q.message.as_ref().map(|m| MessageRef {
            chat_id: ChatId(m.chat.id.0),
            message_id: MessageId(m.id.0),
        }),
    })
}

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    match callback_from(&q) {
        Some(cb) => {
            state.core.handle_callback(cb).await;
        }
        None => tracing::debug!(callback_id = %q.id, "ignoring callback query without data"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn query(data: Option<&str>) -> CallbackQuery {
        let mut value = json!({
            "id": "cb-1",
            "from": { "id": 1, "is_bot": false, "first_name": "Alice", "username": "alice" },
            "chat_instance": "ci",
            "message": {
                "message_id": 42,
                "date": 1700000000,
                "chat": { "id": 100, "type": "private", "first_name": "Alice" },
                "text": "Select a service to start:"
            }
        });
        if let (Some(obj), Some(d)) = (value.as_object_mut(), data) {
            obj.insert("data".to_string(), json!(d));
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn callback_carries_keyboard_message() {
        let cb = callback_from(&query(Some("/servicestart nginx"))).unwrap();
        assert_eq!(cb.callback_id, "cb-1");
        assert_eq!(cb.data, "/servicestart nginx");
        assert_eq!(
            cb.message,
            Some(MessageRef {
                chat_id: ChatId(100),
                message_id: MessageId(42),
            })
        );
        assert_eq!(
            cb.sender.and_then(|s| s.username).as_deref(),
            Some("alice")
        );
    }

    #[test]
    fn callback_without_data_is_dropped() {
        assert!(callback_from(&query(None)).is_none());
        assert!(callback_from(&query(Some(""))).is_none());
    }
}
