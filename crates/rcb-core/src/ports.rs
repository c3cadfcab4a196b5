//! Narrow interfaces to the collaborators the dispatcher drives.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{ChatId, Identity},
    Result,
};

// ============== Download queue ==============

/// Torrent state as reported by the download daemon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TorrentStatus {
    Stopped,
    QueuedToVerify,
    Verifying,
    QueuedToDownload,
    Downloading,
    QueuedToSeed,
    Seeding,
    Unknown(i64),
}

impl TorrentStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Stopped,
            1 => Self::QueuedToVerify,
            2 => Self::Verifying,
            3 => Self::QueuedToDownload,
            4 => Self::Downloading,
            5 => Self::QueuedToSeed,
            6 => Self::Seeding,
            other => Self::Unknown(other),
        }
    }
}

/// Snapshot of one torrent; never cached.
#[derive(Clone, Debug, PartialEq)]
pub struct Torrent {
    pub id: i64,
    pub name: String,
    pub status: TorrentStatus,
    /// 0.0 ..= 1.0
    pub percent_done: f64,
    pub total_size: i64,
    /// Bytes per second.
    pub rate_download: i64,
    pub rate_upload: i64,
    /// Empty when the torrent is healthy.
    pub error_string: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Duplicate,
    /// The daemon answered but did not report success.
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    Rejected,
}

/// Download-queue RPC.
///
/// Errors carry text meant to be shown to the user as-is
/// (`Error::Rpc`, or `Error::MalformedResponse` with the raw body).
#[async_trait]
pub trait DownloadQueue: Send + Sync {
    async fn list(&self) -> Result<Vec<Torrent>>;

    /// `source` is a magnet link, a URL or a file URL.
    async fn add(&self, source: &str) -> Result<AddOutcome>;

    /// Remove from the list, optionally deleting downloaded data too.
    async fn remove(&self, id: i64, delete_local_data: bool) -> Result<RemoveOutcome>;
}

// ============== Service controller ==============

/// A start/stop that did not succeed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceFailure {
    /// Short reason shown to the user (e.g. exit status).
    pub reason: String,
    /// Combined command output, logged as an error.
    pub output: String,
}

#[async_trait]
pub trait ServiceController: Send + Sync {
    /// `(service, status)` pairs in the order given.
    async fn status(&self, services: &[String]) -> Vec<(String, String)>;

    async fn start(&self, service: &str) -> std::result::Result<String, ServiceFailure>;

    async fn stop(&self, service: &str) -> std::result::Result<String, ServiceFailure>;
}

// ============== System probe ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryUsage {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskUsage {
    pub path: PathBuf,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl DiskUsage {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }
}

pub trait SystemProbe: Send + Sync {
    fn memory_usage(&self) -> Result<MemoryUsage>;
    fn disk_usage(&self, path: &Path) -> Result<DiskUsage>;
}

// ============== Log / chat store ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogKind {
    Log,
    Error,
}

impl LogKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LogKind::Log => "log",
            LogKind::Error => "err",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "err" {
            LogKind::Error
        } else {
            LogKind::Log
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub kind: LogKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRecord {
    pub chat_id: ChatId,
    pub identity: Identity,
    pub created_at: DateTime<Utc>,
}

/// Append-only logs plus the deduplicated set of known chats.
///
/// Implementations serialize their own writes.
pub trait LogStore: Send + Sync {
    fn append_log(&self, kind: LogKind, message: &str) -> Result<()>;

    /// Newest first, at most `limit`.
    fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>>;

    /// No-op when the chat is already known.
    fn save_chat(&self, chat_id: ChatId, identity: &Identity) -> Result<()>;

    fn chats(&self) -> Result<Vec<ChatRecord>>;
}

/// Log an informational line to tracing and the store.
pub fn record_log(store: &dyn LogStore, message: &str) {
    tracing::info!("{message}");
    if let Err(e) = store.append_log(LogKind::Log, message) {
        tracing::warn!("failed to save log into local database: {e}");
    }
}

/// Log an error line to tracing and the store.
pub fn record_error(store: &dyn LogStore, message: &str) {
    tracing::error!("{message}");
    if let Err(e) = store.append_log(LogKind::Error, message) {
        tracing::warn!("failed to save log into local database: {e}");
    }
}
