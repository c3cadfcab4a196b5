//! Per-event state machine: authorize, act on collaborators, reply, transition.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    command::{parse, Command, Intent, MAGNET_PREFIX},
    config::Config,
    domain::{ChatId, MessageRef},
    errors::{Error, SendFailure},
    formatting as fmt,
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, ChatAction, IncomingMessage, InlineButton, Keyboard, Reply, Sender},
    },
    ports::{record_error, DownloadQueue, LogStore, ServiceController, SystemProbe},
    security::{authorize, Rejected},
    session::{SessionPool, SessionState, SessionStore, SessionTable},
};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NUM_RECENT_LOGS: usize = 20;
pub const TORRENT_FILE_EXTENSION: &str = ".torrent";
pub const ACK_REACTION: &str = "👌";

/// Everything the dispatcher talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub messenger: Arc<dyn MessagingPort>,
    pub queue: Arc<dyn DownloadQueue>,
    pub services: Arc<dyn ServiceController>,
    pub store: Arc<dyn LogStore>,
    pub probe: Arc<dyn SystemProbe>,
}

pub struct Dispatcher {
    cfg: Arc<Config>,
    sessions: SessionPool,
    deps: Collaborators,
    launched_at: Instant,
}

impl Dispatcher {
    /// Sessions are created here, one per allow-listed identity.
    pub fn new(cfg: Arc<Config>, deps: Collaborators) -> Self {
        let table = SessionTable::new(&cfg.available_ids);
        Self::with_sessions(cfg, deps, table)
    }

    pub fn with_sessions(
        cfg: Arc<Config>,
        deps: Collaborators,
        sessions: impl SessionStore + 'static,
    ) -> Self {
        Self {
            cfg,
            sessions: SessionPool::new(sessions),
            deps,
            launched_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn sessions(&self) -> &SessionPool {
        &self.sessions
    }

    pub fn store(&self) -> &dyn LogStore {
        self.deps.store.as_ref()
    }

    // ============== Messages ==============

    /// Handle one inbound message. Returns whether a reply was delivered.
    pub async fn handle_message(&self, msg: IncomingMessage) -> bool {
        let identity = match authorize(msg.sender.as_ref(), &self.cfg) {
            Ok(id) => id,
            Err(rejected) => {
                self.log_rejection(&rejected, msg.sender.as_ref());
                return false;
            }
        };

        self.typing(msg.chat_id).await;

        if let Err(e) = self.deps.store.save_chat(msg.chat_id, &identity) {
            tracing::warn!("failed to save chat into local database: {e}");
        }

        // Held until the new state is written.
        let mut sessions = self.sessions.lock().await;
        let Some(state) = sessions.get(&identity) else {
            record_error(self.store(), &format!("no session for id: {identity}"));
            return false;
        };

        let (reply, next) = match state {
            SessionState::Waiting => self.on_waiting(&msg).await,
            SessionState::WaitingUpload => (self.on_waiting_upload(&msg).await, SessionState::Waiting),
        };

        tracing::debug!(user = %identity, ?state, ?next, "turn complete");
        sessions.set(&identity, next);

        match self.deps.messenger.send_reply(msg.chat_id, &reply).await {
            Ok(_) => true,
            Err(e) => {
                record_error(
                    self.store(),
                    &describe_send_error(&e, msg.chat_id, reply.text.len(), false),
                );
                false
            }
        }
    }

    async fn on_waiting(&self, msg: &IncomingMessage) -> (Reply, SessionState) {
        if let Some(doc) = &msg.document {
            let reply = match self.deps.messenger.file_url(&doc.file_id).await {
                Ok(url) if url.ends_with(TORRENT_FILE_EXTENSION) => {
                    self.react(msg.message_ref()).await;
                    self.add_torrent(&url).await
                }
                Ok(_) => Reply::menu(fmt::MSG_UNPROCESSABLE_FILE),
                Err(e) => self.file_lookup_failed(&e),
            };
            return (reply, SessionState::Waiting);
        }

        let text = msg.text.as_deref().unwrap_or_default();
        let reply = match parse(text) {
            Intent::Magnet(link) => {
                self.react(msg.message_ref()).await;
                self.add_torrent(&link).await
            }
            Intent::Unknown(stripped) => Reply::menu(fmt::unknown_command(&stripped)),
            Intent::Command { command, arg } => match command {
                Command::Start => Reply::menu(fmt::MSG_DEFAULT),
                Command::ServiceStatus => self.service_status().await,
                Command::ServiceStart | Command::ServiceStop => {
                    if self.cfg.controllable_services.is_empty() {
                        Reply::menu(fmt::MSG_NO_CONTROLLABLE_SERVICES)
                    } else {
                        self.service_command(command, &arg).await
                    }
                }
                Command::TorrentList => {
                    Reply::menu(fmt::torrent_list_reply(&self.deps.queue.list().await))
                }
                Command::TorrentAdd => {
                    if arg.starts_with(MAGNET_PREFIX) {
                        self.add_torrent(&arg).await
                    } else {
                        return (
                            Reply::new(fmt::MSG_TORRENT_UPLOAD, Keyboard::CancelMenu),
                            SessionState::WaitingUpload,
                        );
                    }
                }
                Command::TorrentRemove | Command::TorrentDelete => {
                    self.torrent_command(command, &arg).await
                }
                Command::Status => Reply::menu(self.status_report()),
                Command::Logs => Reply::menu(self.logs_report()),
                Command::Help => Reply::new(
                    fmt::help(),
                    Keyboard::Inline(vec![vec![InlineButton::url("GitHub", fmt::GITHUB_URL)]]),
                ),
                Command::Privacy => Reply::menu(fmt::privacy_policy()),
                Command::Cancel => Reply::menu(fmt::MSG_CANCELED),
            },
        };
        (reply, SessionState::Waiting)
    }

    async fn on_waiting_upload(&self, msg: &IncomingMessage) -> Reply {
        let text = msg.text.as_deref().unwrap_or_default();
        if msg.document.is_none()
            && matches!(
                parse(text),
                Intent::Command {
                    command: Command::Cancel,
                    ..
                }
            )
        {
            return Reply::menu(fmt::MSG_CANCELED);
        }

        let source = match &msg.document {
            Some(doc) => match self.deps.messenger.file_url(&doc.file_id).await {
                Ok(url) => url,
                Err(e) => return self.file_lookup_failed(&e),
            },
            None => text.to_string(),
        };

        self.react(msg.message_ref()).await;
        self.add_torrent(&source).await
    }

    // ============== Callback queries ==============

    /// Handle an inline-button press. Never touches session state.
    pub async fn handle_callback(&self, q: CallbackQuery) -> bool {
        if let Err(rejected) = authorize(q.sender.as_ref(), &self.cfg) {
            self.log_rejection(&rejected, q.sender.as_ref());
            return false;
        }

        if let Some(m) = q.message {
            self.typing(m.chat_id).await;
        }

        let text = match parse(&q.data) {
            Intent::Command {
                command: Command::Cancel,
                ..
            } => String::new(),
            Intent::Command {
                command: command @ (Command::ServiceStart | Command::ServiceStop),
                arg,
            } => self.service_command(command, &arg).await.text,
            Intent::Command {
                command: command @ (Command::TorrentRemove | Command::TorrentDelete),
                arg,
            } => self.torrent_command(command, &arg).await.text,
            _ => {
                record_error(
                    self.store(),
                    &format!("unprocessable callback query: {}", q.data),
                );
                return false;
            }
        };

        let answer = (!text.is_empty()).then_some(text.as_str());
        if let Err(e) = self
            .deps
            .messenger
            .answer_callback_query(&q.callback_id, answer)
            .await
        {
            record_error(
                self.store(),
                &format!("failed to answer callback query {}: {e}", q.callback_id),
            );
            return false;
        }

        let text = if text.is_empty() {
            fmt::MSG_CANCELED.to_string()
        } else {
            text
        };

        let Some(target) = q.message else {
            record_error(
                self.store(),
                &format!("callback query {} has no message to edit", q.callback_id),
            );
            return false;
        };

        match self.deps.messenger.edit_text(target, &text).await {
            Ok(()) => true,
            Err(e) => {
                record_error(self.store(), &format!("failed to edit message text: {e}"));
                false
            }
        }
    }

    // ============== Actions ==============

    async fn add_torrent(&self, source: &str) -> Reply {
        let result = self.deps.queue.add(source).await;
        if let Err(e) = &result {
            tracing::warn!("failed to add torrent: {e}");
        }
        Reply::menu(fmt::add_result(&result))
    }

    async fn service_status(&self) -> Reply {
        if self.cfg.controllable_services.is_empty() {
            return Reply::menu(fmt::MSG_NO_CONTROLLABLE_SERVICES);
        }
        let statuses = self
            .deps
            .services
            .status(&self.cfg.controllable_services)
            .await;
        Reply::menu(fmt::service_statuses(&statuses))
    }

    /// Start/stop a controllable service, or offer a picker when `service` is not one.
    async fn service_command(&self, command: Command, service: &str) -> Reply {
        let starting = command == Command::ServiceStart;

        if !self.cfg.is_controllable_service(service) {
            let prompt = if starting {
                fmt::MSG_SERVICE_TO_START
            } else {
                fmt::MSG_SERVICE_TO_STOP
            };
            let buttons = self
                .cfg
                .controllable_services
                .iter()
                .map(|s| InlineButton::callback(s.as_str(), format!("{} {s}", command.tag())));
            return Reply::new(prompt, picker(buttons));
        }

        let text = if starting {
            match self.deps.services.start(service).await {
                Ok(_) => fmt::service_started(service),
                Err(f) => {
                    record_error(
                        self.store(),
                        &format!("service failed to start: {}", f.output),
                    );
                    fmt::service_start_failed(service, &f.reason)
                }
            }
        } else {
            match self.deps.services.stop(service).await {
                Ok(_) => fmt::service_stopped(service),
                Err(f) => {
                    record_error(
                        self.store(),
                        &format!("service failed to stop: {}", f.output),
                    );
                    fmt::service_stop_failed(service, &f.reason)
                }
            }
        };
        Reply::menu(text)
    }

    /// Remove/delete a torrent by id, or offer a picker when no id was given.
    async fn torrent_command(&self, command: Command, arg: &str) -> Reply {
        let torrents = match self.deps.queue.list().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("failed to list torrents: {e}");
                Vec::new()
            }
        };
        if torrents.is_empty() {
            return Reply::menu(fmt::MSG_NO_TORRENTS);
        }

        let delete = command == Command::TorrentDelete;
        if let Ok(id) = arg.parse::<i64>() {
            let result = self.deps.queue.remove(id, delete).await;
            return Reply::menu(fmt::remove_result(id, delete, &result));
        }

        let prompt = if delete {
            fmt::MSG_TORRENT_DELETE
        } else {
            fmt::MSG_TORRENT_REMOVE
        };
        let buttons = torrents.iter().map(|t| {
            InlineButton::callback(
                fmt::torrent_button_label(t),
                format!("{} {}", command.tag(), t.id),
            )
        });
        Reply::new(prompt, picker(buttons))
    }

    fn status_report(&self) -> String {
        let probe = self.deps.probe.as_ref();
        let disks: Vec<_> = std::iter::once(PathBuf::from("/"))
            .chain(self.cfg.mount_points.iter().cloned())
            .map(|p| {
                let usage = probe.disk_usage(&p);
                (p, usage)
            })
            .collect();
        fmt::status_report(
            APP_VERSION,
            self.uptime(),
            &probe.memory_usage(),
            &disks,
        )
    }

    fn logs_report(&self) -> String {
        match self.deps.store.recent_logs(NUM_RECENT_LOGS) {
            Ok(entries) => fmt::logs(&entries),
            Err(e) => {
                tracing::warn!("failed to get logs from local database: {e}");
                fmt::MSG_NO_LOGS.to_string()
            }
        }
    }

    fn uptime(&self) -> Duration {
        self.launched_at.elapsed()
    }

    // ============== Helpers ==============

    async fn typing(&self, chat_id: ChatId) {
        if let Err(e) = self
            .deps
            .messenger
            .send_chat_action(chat_id, ChatAction::Typing)
            .await
        {
            tracing::debug!("failed to send chat action: {e}");
        }
    }

    async fn react(&self, msg: MessageRef) {
        if let Err(e) = self.deps.messenger.set_reaction(msg, ACK_REACTION).await {
            tracing::debug!("failed to set reaction: {e}");
        }
    }

    fn file_lookup_failed(&self, e: &Error) -> Reply {
        record_error(self.store(), &format!("failed to get file url: {e}"));
        Reply::menu(format!("Failed to get file: {e}"))
    }

    fn log_rejection(&self, rejected: &Rejected, sender: Option<&Sender>) {
        let line = match (rejected, sender) {
            (Rejected::NoIdentity, Some(s)) => format!("has no user name: {}", s.first_name),
            (Rejected::NoIdentity, None) => "update has no 'from' value".to_string(),
            (Rejected::NotAllowed(id), _) => format!("not an allowed user id: {id}"),
        };
        record_error(self.store(), &line);
    }
}

/// One button per row, followed by a cancel button.
fn picker(buttons: impl Iterator<Item = InlineButton>) -> Keyboard {
    let mut all: Vec<InlineButton> = buttons.collect();
    all.push(InlineButton::callback(fmt::MSG_CANCEL, Command::Cancel.tag()));
    Keyboard::inline_rows(all)
}

/// Log line for a failed send, by cause.
pub fn describe_send_error(err: &Error, chat_id: ChatId, len: usize, broadcast: bool) -> String {
    let (what, scope) = if broadcast {
        ("broadcast message", " for broadcast")
    } else {
        ("message", "")
    };
    match err {
        Error::Send(SendFailure::Empty) => format!("{what} is empty"),
        Error::Send(SendFailure::TooLong) => format!("{what} is too long: {len} bytes"),
        Error::Send(SendFailure::ChatNotFound) => format!("no such chat id{scope}: {}", chat_id.0),
        Error::Send(SendFailure::RateLimited) => format!("too many requests{scope}"),
        other if broadcast => format!("failed to broadcast to chat id {}: {other}", chat_id.0),
        other => format!("failed to send message: {other}"),
    }
}
