use crate::{
    domain::{ChatId, Identity, MessageId, MessageRef},
    formatting::is_markdown_balanced,
};

/// Who sent an update, as far as the transport knows.
#[derive(Clone, Debug)]
pub struct Sender {
    pub username: Option<String>,
    pub first_name: String,
}

impl Sender {
    /// The allow-list identity. Senders without a username have none.
    pub fn identity(&self) -> Option<Identity> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Identity::new)
    }
}

/// A file attached to a message.
#[derive(Clone, Debug)]
pub struct Document {
    pub file_id: String,
}

/// Transport-agnostic inbound message.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: Option<Sender>,
    pub text: Option<String>,
    pub document: Option<Document>,
}

impl IncomingMessage {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }
}

/// An inline-button press.
#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub callback_id: String,
    pub sender: Option<Sender>,
    pub data: String,
    /// The message carrying the keyboard, when the transport still has it.
    pub message: Option<MessageRef>,
}

/// Outgoing "chat action" (typing indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ButtonAction {
    Callback(String),
    Url(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

impl InlineButton {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }

    pub fn callback_data(&self) -> Option<&str> {
        match &self.action {
            ButtonAction::Callback(d) => Some(d),
            ButtonAction::Url(_) => None,
        }
    }
}

/// Keyboard attached to an outgoing message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Keyboard {
    None,
    /// Persistent reply keyboard with every command.
    DefaultMenu,
    /// Reply keyboard with only `/cancel`.
    CancelMenu,
    /// Inline buttons, one row per inner vec.
    Inline(Vec<Vec<InlineButton>>),
}

impl Keyboard {
    /// One button per row.
    pub fn inline_rows(buttons: Vec<InlineButton>) -> Self {
        Keyboard::Inline(buttons.into_iter().map(|b| vec![b]).collect())
    }

    pub fn inline_buttons(&self) -> Vec<&InlineButton> {
        match self {
            Keyboard::Inline(rows) => rows.iter().flatten().collect(),
            _ => Vec::new(),
        }
    }
}

/// A fully rendered outgoing message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Keyboard,
    /// Send with Markdown parse mode; false means plain text.
    pub markdown: bool,
}

impl Reply {
    pub fn new(text: impl Into<String>, keyboard: Keyboard) -> Self {
        let text = text.into();
        let markdown = is_markdown_balanced(&text);
        Self {
            text,
            keyboard,
            markdown,
        }
    }

    /// Reply carrying the default command menu.
    pub fn menu(text: impl Into<String>) -> Self {
        Self::new(text, Keyboard::DefaultMenu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_without_username_has_no_identity() {
        let s = Sender {
            username: None,
            first_name: "Alice".to_string(),
        };
        assert!(s.identity().is_none());

        let blank = Sender {
            username: Some("  ".to_string()),
            first_name: "Alice".to_string(),
        };
        assert!(blank.identity().is_none());

        let named = Sender {
            username: Some("alice".to_string()),
            first_name: "Alice".to_string(),
        };
        assert_eq!(named.identity(), Some(Identity::new("alice")));
    }

    #[test]
    fn reply_markdown_flag_follows_text() {
        assert!(Reply::menu("*bold* and _it_").markdown);
        assert!(!Reply::menu("snake_case").markdown);
    }

    #[test]
    fn inline_rows_puts_one_button_per_row() {
        let kb = Keyboard::inline_rows(vec![
            InlineButton::callback("a", "/x a"),
            InlineButton::callback("b", "/x b"),
        ]);
        let Keyboard::Inline(rows) = &kb else {
            panic!("expected inline keyboard");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(kb.inline_buttons()[1].callback_data(), Some("/x b"));
    }
}
