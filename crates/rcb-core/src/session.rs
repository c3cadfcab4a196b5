use std::collections::HashMap;

use tokio::sync::{Mutex, MutexGuard};

use crate::domain::Identity;

/// Per-identity conversational state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Waiting,
    /// A torrent source (file, magnet or URL) was asked for.
    WaitingUpload,
}

/// Storage behind the session lock. Swappable so tests can inject their own.
pub trait SessionStore: Send {
    /// `None` means the identity never had a session.
    fn get(&self, identity: &Identity) -> Option<SessionState>;
    fn set(&mut self, identity: &Identity, state: SessionState);
}

/// In-memory store pre-populated from the allow-list.
///
/// Unknown identities are never inserted; `set` on one is ignored.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<Identity, SessionState>,
}

impl SessionTable {
    pub fn new<'a>(identities: impl IntoIterator<Item = &'a Identity>) -> Self {
        Self {
            sessions: identities
                .into_iter()
                .map(|id| (id.clone(), SessionState::Waiting))
                .collect(),
        }
    }
}

impl SessionStore for SessionTable {
    fn get(&self, identity: &Identity) -> Option<SessionState> {
        self.sessions.get(identity).copied()
    }

    fn set(&mut self, identity: &Identity, state: SessionState) {
        if let Some(slot) = self.sessions.get_mut(identity) {
            *slot = state;
        }
    }
}

/// The single coarse lock over all sessions.
///
/// A guard is held for a whole turn (read state, call collaborators, reply,
/// write state), so every turn across every identity is serialized.
pub struct SessionPool {
    inner: Mutex<Box<dyn SessionStore>>,
}

impl SessionPool {
    pub fn new(store: impl SessionStore + 'static) -> Self {
        Self {
            inner: Mutex::new(Box::new(store)),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Box<dyn SessionStore>> {
        self.inner.lock().await
    }
}
