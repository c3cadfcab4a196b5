//! In-memory collaborators shared by the dispatcher and relay tests.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    config::Config,
    domain::{ChatId, Identity, MessageId, MessageRef},
    errors::{Error, SendFailure},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, Reply},
    },
    ports::{
        AddOutcome, ChatRecord, DiskUsage, DownloadQueue, LogEntry, LogKind, LogStore,
        MemoryUsage, RemoveOutcome, ServiceController, ServiceFailure, SystemProbe, Torrent,
        TorrentStatus,
    },
    Result,
};

pub fn config(ids: &[&str], services: &[&str]) -> Arc<Config> {
    let json = serde_json::json!({
        "api_token": "123:abc",
        "available_ids": ids,
        "controllable_services": services,
    });
    Arc::new(Config::from_json(&json.to_string(), PathBuf::from("/tmp/rcb-test")).unwrap())
}

pub fn torrent(id: i64, name: &str) -> Torrent {
    Torrent {
        id,
        name: name.to_string(),
        status: TorrentStatus::Downloading,
        percent_done: 0.25,
        total_size: 4096,
        rate_download: 0,
        rate_upload: 0,
        error_string: String::new(),
    }
}

// ============== Messenger ==============

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    pub sends: Mutex<Vec<(ChatId, Reply)>>,
    pub edits: Mutex<Vec<(MessageRef, String)>>,
    pub answers: Mutex<Vec<(String, Option<String>)>>,
    pub actions: Mutex<Vec<(ChatId, ChatAction)>>,
    pub reactions: Mutex<Vec<(MessageRef, String)>>,
    pub send_failure: Mutex<Option<SendFailure>>,
}

impl FakeMessenger {
    pub fn sent(&self) -> Vec<(ChatId, Reply)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn last_reply(&self) -> Reply {
        self.sent().last().map(|(_, r)| r.clone()).expect("no reply sent")
    }

    pub fn fail_sends_with(&self, failure: SendFailure) {
        *self.send_failure.lock().unwrap() = Some(failure);
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_reply(&self, chat_id: ChatId, reply: &Reply) -> Result<MessageRef> {
        if let Some(f) = self.send_failure.lock().unwrap().clone() {
            return Err(Error::Send(f));
        }
        self.sends.lock().unwrap().push((chat_id, reply.clone()));
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(*id),
        })
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.edits.lock().unwrap().push((msg, text.to_string()));
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answers
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        self.actions.lock().unwrap().push((chat_id, action));
        Ok(())
    }

    async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.reactions.lock().unwrap().push((msg, emoji.to_string()));
        Ok(())
    }

    async fn file_url(&self, file_id: &str) -> Result<String> {
        Ok(format!("https://files.test/{file_id}"))
    }
}

// ============== Download queue ==============

pub struct FakeQueue {
    pub torrents: Mutex<Vec<Torrent>>,
    pub add_outcome: Mutex<AddOutcome>,
    pub adds: Mutex<Vec<String>>,
    pub removes: Mutex<Vec<(i64, bool)>>,
    pub delay: Duration,
    /// When set, every call fails with `Error::Rpc` carrying this text.
    pub rpc_failure: Option<String>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl Default for FakeQueue {
    fn default() -> Self {
        Self {
            torrents: Mutex::new(Vec::new()),
            add_outcome: Mutex::new(AddOutcome::Added),
            adds: Mutex::new(Vec::new()),
            removes: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            rpc_failure: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl FakeQueue {
    pub fn with_torrents(torrents: Vec<Torrent>) -> Self {
        Self {
            torrents: Mutex::new(torrents),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            rpc_failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    fn check(&self) -> Result<()> {
        match &self.rpc_failure {
            Some(reason) => Err(Error::Rpc(reason.clone())),
            None => Ok(()),
        }
    }

    pub fn added(&self) -> Vec<String> {
        self.adds.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<(i64, bool)> {
        self.removes.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadQueue for FakeQueue {
    async fn list(&self) -> Result<Vec<Torrent>> {
        self.check()?;
        Ok(self.torrents.lock().unwrap().clone())
    }

    async fn add(&self, source: &str) -> Result<AddOutcome> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.adds.lock().unwrap().push(source.to_string());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.check()?;
        Ok(*self.add_outcome.lock().unwrap())
    }

    async fn remove(&self, id: i64, delete_local_data: bool) -> Result<RemoveOutcome> {
        self.removes.lock().unwrap().push((id, delete_local_data));
        self.check()?;
        Ok(RemoveOutcome::Removed)
    }
}

// ============== Services ==============

#[derive(Default)]
pub struct FakeServices {
    pub fail: bool,
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ServiceController for FakeServices {
    async fn status(&self, services: &[String]) -> Vec<(String, String)> {
        services
            .iter()
            .map(|s| (s.clone(), "active".to_string()))
            .collect()
    }

    async fn start(&self, service: &str) -> std::result::Result<String, ServiceFailure> {
        self.calls.lock().unwrap().push(format!("start {service}"));
        if self.fail {
            return Err(ServiceFailure {
                reason: "exit status 1".to_string(),
                output: "Job for nginx.service failed".to_string(),
            });
        }
        Ok(String::new())
    }

    async fn stop(&self, service: &str) -> std::result::Result<String, ServiceFailure> {
        self.calls.lock().unwrap().push(format!("stop {service}"));
        Ok(String::new())
    }
}

// ============== Store ==============

#[derive(Default)]
pub struct MemoryStore {
    pub logs: Mutex<Vec<LogEntry>>,
    pub chats: Mutex<Vec<ChatRecord>>,
}

impl MemoryStore {
    pub fn errors(&self) -> Vec<String> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == LogKind::Error)
            .map(|e| e.message.clone())
            .collect()
    }
}

impl LogStore for MemoryStore {
    fn append_log(&self, kind: LogKind, message: &str) -> Result<()> {
        self.logs.lock().unwrap().push(LogEntry {
            kind,
            message: message.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn save_chat(&self, chat_id: ChatId, identity: &Identity) -> Result<()> {
        let mut chats = self.chats.lock().unwrap();
        if !chats.iter().any(|c| c.chat_id == chat_id) {
            chats.push(ChatRecord {
                chat_id,
                identity: identity.clone(),
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    fn chats(&self) -> Result<Vec<ChatRecord>> {
        Ok(self.chats.lock().unwrap().clone())
    }
}

// ============== Probe ==============

pub struct FakeProbe;

impl SystemProbe for FakeProbe {
    fn memory_usage(&self) -> Result<MemoryUsage> {
        Ok(MemoryUsage {
            resident_bytes: 1 << 20,
            virtual_bytes: 1 << 21,
        })
    }

    fn disk_usage(&self, path: &Path) -> Result<DiskUsage> {
        Ok(DiskUsage {
            path: path.to_path_buf(),
            total_bytes: 1 << 30,
            free_bytes: 1 << 29,
        })
    }
}
