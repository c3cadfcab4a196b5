//! Command vocabulary and the text → intent parser.

use crate::formatting::remove_markdown_chars;

pub const MAGNET_PREFIX: &str = "magnet:";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    ServiceStatus,
    ServiceStart,
    ServiceStop,
    TorrentList,
    TorrentAdd,
    TorrentRemove,
    TorrentDelete,
    Status,
    Logs,
    Help,
    Privacy,
    Cancel,
}

/// Prefix table, tried in order; the first match wins.
///
/// Prefixes must stay unique in the sense that none is a prefix of another
/// entry listed after it.
pub const VOCABULARY: &[(&str, Command)] = &[
    ("/start", Command::Start),
    ("/servicestatus", Command::ServiceStatus),
    ("/servicestart", Command::ServiceStart),
    ("/servicestop", Command::ServiceStop),
    ("/trlist", Command::TorrentList),
    ("/tradd", Command::TorrentAdd),
    ("/trremove", Command::TorrentRemove),
    ("/trdelete", Command::TorrentDelete),
    ("/status", Command::Status),
    ("/logs", Command::Logs),
    ("/help", Command::Help),
    ("/privacy", Command::Privacy),
    ("/cancel", Command::Cancel),
];

/// Reply keyboard rows shown with every regular answer.
pub const DEFAULT_MENU: &[&[Command]] = &[
    &[
        Command::TorrentList,
        Command::TorrentAdd,
        Command::TorrentRemove,
        Command::TorrentDelete,
    ],
    &[
        Command::ServiceStatus,
        Command::ServiceStart,
        Command::ServiceStop,
    ],
    &[
        Command::Status,
        Command::Logs,
        Command::Privacy,
        Command::Help,
    ],
];

pub const CANCEL_MENU: &[&[Command]] = &[&[Command::Cancel]];

impl Command {
    pub fn tag(self) -> &'static str {
        VOCABULARY
            .iter()
            .find(|(_, c)| *c == self)
            .map(|(tag, _)| *tag)
            .unwrap_or_default()
    }
}

/// Parsed user input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    /// Raw `magnet:` link, passed through untouched.
    Magnet(String),
    Command { command: Command, arg: String },
    /// Input matched nothing; holds the text with markdown characters removed.
    Unknown(String),
}

pub fn parse(text: &str) -> Intent {
    if text.starts_with(MAGNET_PREFIX) {
        return Intent::Magnet(text.to_string());
    }

    for (prefix, command) in VOCABULARY {
        if let Some(rest) = text.strip_prefix(prefix) {
            return Intent::Command {
                command: *command,
                arg: rest.trim().to_string(),
            };
        }
    }

    Intent::Unknown(remove_markdown_chars(text, ""))
}
