//! Telegram adapter (teloxide).
//!
//! This crate implements the `rcb-core` MessagingPort over the Telegram Bot API
//! and translates incoming updates for the core dispatcher.

use async_trait::async_trait;
use serde_json::json;
use teloxide::{
    prelude::*,
    types::{
        InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, ParseMode,
        ReplyMarkup,
    },
    ApiError, RequestError,
};

pub mod handlers;
pub mod router;

use rcb_core::{
    command::{Command, CANCEL_MENU, DEFAULT_MENU},
    domain::{ChatId, MessageId, MessageRef},
    errors::{Error, SendFailure},
    messaging::{
        port::MessagingPort,
        types::{ButtonAction, ChatAction, Keyboard, Reply},
    },
    Result,
};

pub const API_BASE_URL: &str = "https://api.telegram.org";

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    token: String,
    http: reqwest::Client,
}

impl TelegramMessenger {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            bot: Bot::new(token.clone()),
            token,
            http: reqwest::Client::new(),
        }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    fn file_url_for(&self, path: &str) -> String {
        format!("{API_BASE_URL}/file/bot{}/{path}", self.token)
    }
}

/// Classify a failed send so the dispatcher can log the cause.
pub(crate) fn map_send_err(e: RequestError) -> Error {
    let failure = match &e {
        RequestError::Api(ApiError::MessageTextIsEmpty) => SendFailure::Empty,
        RequestError::Api(ApiError::MessageIsTooLong) => SendFailure::TooLong,
        RequestError::Api(ApiError::ChatNotFound) => SendFailure::ChatNotFound,
        RequestError::RetryAfter(_) => SendFailure::RateLimited,
        other => SendFailure::Other(other.to_string()),
    };
    Error::Send(failure)
}

fn menu_markup(rows: &[&[Command]]) -> ReplyMarkup {
    let rows = rows
        .iter()
        .map(|row| row.iter().map(|c| KeyboardButton::new(c.tag())).collect::<Vec<_>>());
    ReplyMarkup::Keyboard(KeyboardMarkup::new(rows).resize_keyboard(true))
}

pub(crate) fn reply_markup(keyboard: &Keyboard) -> Result<Option<ReplyMarkup>> {
    let markup = match keyboard {
        Keyboard::None => return Ok(None),
        Keyboard::DefaultMenu => menu_markup(DEFAULT_MENU),
        Keyboard::CancelMenu => menu_markup(CANCEL_MENU),
        Keyboard::Inline(rows) => {
            let mut tg_rows = Vec::with_capacity(rows.len());
            for row in rows {
                let mut tg_row = Vec::with_capacity(row.len());
                for button in row {
                    tg_row.push(match &button.action {
                        ButtonAction::Callback(data) => {
                            InlineKeyboardButton::callback(button.label.clone(), data.clone())
                        }
                        ButtonAction::Url(url) => {
                            let url = reqwest::Url::parse(url).map_err(|e| {
                                Error::External(format!("invalid button url {url}: {e}"))
                            })?;
                            InlineKeyboardButton::url(button.label.clone(), url)
                        }
                    });
                }
                tg_rows.push(tg_row);
            }
            ReplyMarkup::InlineKeyboard(InlineKeyboardMarkup::new(tg_rows))
        }
    };
    Ok(Some(markup))
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_reply(&self, chat_id: ChatId, reply: &Reply) -> Result<MessageRef> {
        let mut req = self
            .bot
            .send_message(Self::tg_chat(chat_id), reply.text.clone());
        if reply.markdown {
            // Legacy Markdown keeps `_`, `*` and backticks as the only markup.
            #[allow(deprecated)]
            {
                req = req.parse_mode(ParseMode::Markdown);
            }
        }
        if let Some(markup) = reply_markup(&reply.keyboard)? {
            req = req.reply_markup(markup);
        }

        let msg = req.await.map_err(map_send_err)?;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.bot
            .edit_message_text(
                Self::tg_chat(msg.chat_id),
                Self::tg_msg_id(msg.message_id),
                text.to_string(),
            )
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut req = self.bot.answer_callback_query(callback_id.to_string());
        if let Some(t) = text {
            req = req.text(t.to_string());
        }
        req.await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
        };
        self.bot
            .send_chat_action(Self::tg_chat(chat_id), tg_action)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        // setMessageReaction is newer than the teloxide payloads, so it goes over plain HTTP.
        let url = format!("{API_BASE_URL}/bot{}/setMessageReaction", self.token);
        let body = json!({
            "chat_id": msg.chat_id.0,
            "message_id": msg.message_id.0,
            "reaction": [{ "type": "emoji", "emoji": emoji }],
        });
        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::External(format!("telegram error: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "setMessageReaction failed: HTTP {status} ({text})"
            )));
        }
        Ok(())
    }

    async fn file_url(&self, file_id: &str) -> Result<String> {
        let file = self
            .bot
            .get_file(file_id.to_string())
            .await
            .map_err(Self::map_err)?;
        Ok(self.file_url_for(&file.path))
    }
}

#[cfg(test)]
mod tests {
    use rcb_core::messaging::types::InlineButton;

    use super::*;

    #[test]
    fn default_menu_is_resized_and_complete() {
        let Some(ReplyMarkup::Keyboard(kb)) = reply_markup(&Keyboard::DefaultMenu).unwrap() else {
            panic!("expected reply keyboard");
        };
        assert_eq!(kb.resize_keyboard, Some(true));
        assert_eq!(kb.keyboard.len(), DEFAULT_MENU.len());
        let first: Vec<&str> = kb.keyboard[0].iter().map(|b| b.text.as_str()).collect();
        assert_eq!(first, vec!["/trlist", "/tradd", "/trremove", "/trdelete"]);
    }

    #[test]
    fn cancel_menu_has_a_single_button() {
        let Some(ReplyMarkup::Keyboard(kb)) = reply_markup(&Keyboard::CancelMenu).unwrap() else {
            panic!("expected reply keyboard");
        };
        assert_eq!(kb.keyboard.len(), 1);
        assert_eq!(kb.keyboard[0][0].text, "/cancel");
    }

    #[test]
    fn inline_rows_are_preserved() {
        let keyboard = Keyboard::Inline(vec![
            vec![InlineButton::callback("nginx", "/servicestart nginx")],
            vec![InlineButton::url("GitHub", "https://github.com/meinside")],
        ]);
        let Some(ReplyMarkup::InlineKeyboard(kb)) = reply_markup(&keyboard).unwrap() else {
            panic!("expected inline keyboard");
        };
        assert_eq!(kb.inline_keyboard.len(), 2);
        assert_eq!(kb.inline_keyboard[0][0].text, "nginx");
    }

    #[test]
    fn bad_button_url_is_an_error() {
        let keyboard = Keyboard::Inline(vec![vec![InlineButton::url("x", "not a url")]]);
        assert!(reply_markup(&keyboard).is_err());
        assert!(reply_markup(&Keyboard::None).unwrap().is_none());
    }

    #[test]
    fn send_errors_are_classified() {
        assert!(matches!(
            map_send_err(RequestError::Api(ApiError::MessageIsTooLong)),
            Error::Send(SendFailure::TooLong)
        ));
        assert!(matches!(
            map_send_err(RequestError::Api(ApiError::ChatNotFound)),
            Error::Send(SendFailure::ChatNotFound)
        ));
        assert!(matches!(
            map_send_err(RequestError::Api(ApiError::MessageTextIsEmpty)),
            Error::Send(SendFailure::Empty)
        ));
        assert!(matches!(
            map_send_err(RequestError::Api(ApiError::BotBlocked)),
            Error::Send(SendFailure::Other(_))
        ));
    }

    #[test]
    fn file_url_embeds_token_and_path() {
        let m = TelegramMessenger::new("123:abc");
        assert_eq!(
            m.file_url_for("documents/file_1.torrent"),
            "https://api.telegram.org/file/bot123:abc/documents/file_1.torrent"
        );
    }
}
