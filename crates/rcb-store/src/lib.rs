//! SQLite-backed log and chat store.

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tokio::runtime::{Handle, RuntimeFlavor};

use rcb_core::{
    domain::{ChatId, Identity},
    errors::Error,
    ports::{ChatRecord, LogEntry, LogKind, LogStore},
    Result,
};

/// One connection behind a mutex, so reads and writes are serialized.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn store_err(e: rusqlite::Error) -> Error {
    Error::Store(e.to_string())
}

/// Run a database call that may block (lock wait, `busy_timeout`).
///
/// On a multi-threaded runtime the worker hands its other tasks off first.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(h) if h.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

impl SqliteStore {
    /// Open (or create) the database file and its tables.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        let store = Self::with_connection(conn)?;
        tracing::info!("database opened: {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(store_err)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5)).map_err(store_err)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Store("database lock poisoned".to_string()))
    }
}

impl LogStore for SqliteStore {
    fn append_log(&self, kind: LogKind, message: &str) -> Result<()> {
        blocking(|| {
            self.conn()?
                .execute(
                    "INSERT INTO logs (type, message, created_at) VALUES (?1, ?2, ?3)",
                    params![kind.as_str(), message, Utc::now().timestamp_millis()],
                )
                .map_err(store_err)?;
            Ok(())
        })
    }

    fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        blocking(|| self.query_recent_logs(limit))
    }

    fn save_chat(&self, chat_id: ChatId, identity: &Identity) -> Result<()> {
        blocking(|| self.insert_chat(chat_id, identity))
    }

    fn chats(&self) -> Result<Vec<ChatRecord>> {
        blocking(|| self.query_chats())
    }
}

impl SqliteStore {
    fn query_recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT type, message, created_at FROM logs ORDER BY id DESC LIMIT ?1")
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let kind: String = row.get(0)?;
                Ok(LogEntry {
                    kind: LogKind::parse(&kind),
                    message: row.get(1)?,
                    created_at: from_millis(row.get(2)?),
                })
            })
            .map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    fn insert_chat(&self, chat_id: ChatId, identity: &Identity) -> Result<()> {
        let inserted = self
            .conn()?
            .execute(
                "INSERT OR IGNORE INTO chats (chat_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![chat_id.0, identity.as_str(), Utc::now().timestamp_millis()],
            )
            .map_err(store_err)?;
        if inserted > 0 {
            tracing::debug!(chat_id = chat_id.0, user = %identity, "saved new chat");
        }
        Ok(())
    }

    fn query_chats(&self) -> Result<Vec<ChatRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT chat_id, user_id, created_at FROM chats ORDER BY id ASC")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ChatRecord {
                    chat_id: ChatId(row.get(0)?),
                    identity: Identity(row.get(1)?),
                    created_at: from_millis(row.get(2)?),
                })
            })
            .map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{mpsc, Arc},
        time::Instant,
    };

    use super::*;

    #[test]
    fn logs_come_back_newest_first_and_limited() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..25 {
            store.append_log(LogKind::Log, &format!("line {i}")).unwrap();
        }
        store.append_log(LogKind::Error, "boom").unwrap();

        let logs = store.recent_logs(20).unwrap();
        assert_eq!(logs.len(), 20);
        assert_eq!(logs[0].kind, LogKind::Error);
        assert_eq!(logs[0].message, "boom");
        assert_eq!(logs[1].message, "line 24");
        assert_eq!(logs[19].message, "line 6");
    }

    #[test]
    fn chats_are_deduplicated_by_chat_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_chat(ChatId(10), &Identity::new("alice")).unwrap();
        store.save_chat(ChatId(10), &Identity::new("alice")).unwrap();
        store.save_chat(ChatId(-20), &Identity::new("bob")).unwrap();

        let chats = store.chats().unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].chat_id, ChatId(10));
        assert_eq!(chats[1].identity, Identity::new("bob"));
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.sqlite");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.append_log(LogKind::Log, "starting server...").unwrap();
            store.save_chat(ChatId(1), &Identity::new("alice")).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let logs = store.recent_logs(5).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "starting server...");
        assert!(logs[0].created_at.timestamp() > 0);
        assert_eq!(store.chats().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn waiting_on_the_database_does_not_stall_other_tasks() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());

        let (locked_tx, locked_rx) = mpsc::channel();
        let holder = {
            let store = store.clone();
            std::thread::spawn(move || {
                let _guard = store.conn().unwrap();
                locked_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(400));
            })
        };
        locked_rx.recv().unwrap();

        let ticker = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Instant::now()
        });
        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                store.append_log(LogKind::Log, "written after the wait").unwrap();
                Instant::now()
            })
        };

        let ticked_at = ticker.await.unwrap();
        let written_at = writer.await.unwrap();
        holder.join().unwrap();

        assert!(ticked_at < written_at);
        assert_eq!(store.recent_logs(1).unwrap()[0].message, "written after the wait");
    }
}
