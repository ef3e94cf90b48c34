pub mod store;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::classifier::Fingerprint;
use crate::error::RelayError;
use crate::registry::store::{InMemoryStore, RegistryStore};

/// A delivery destination: private chat, group or channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatIdentity(pub i64);

impl fmt::Display for ChatIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<teloxide::types::ChatId> for ChatIdentity {
    fn from(id: teloxide::types::ChatId) -> Self {
        ChatIdentity(id.0)
    }
}

impl From<ChatIdentity> for teloxide::types::ChatId {
    fn from(chat: ChatIdentity) -> Self {
        teloxide::types::ChatId(chat.0)
    }
}

/// An endpoint a chat asked us to watch
#[derive(Debug, Clone, PartialEq)]
pub struct WatchedEndpoint {
    pub id: Uuid,
    pub url: String,
    /// `None` until the first successful fetch
    pub fingerprint: Option<Fingerprint>,
    pub added_at: DateTime<Utc>,
}

impl WatchedEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            fingerprint: None,
            added_at: Utc::now(),
        }
    }
}

/// Per-chat ordered list of watched endpoints.
///
/// Indices on the public surface are 1-based. One async lock guards every
/// read and write, so command handlers and the poller never interleave
/// inside a chat's list.
#[derive(Clone)]
pub struct Registry {
    store: Arc<Mutex<Box<dyn RegistryStore>>>,
}

impl Registry {
    pub fn new(store: Box<dyn RegistryStore>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(InMemoryStore::new()))
    }

    /// Register `url` for `chat` and return its 1-based index
    pub async fn add(&self, chat: ChatIdentity, url: &str) -> Result<usize, RelayError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RelayError::Validation("URL must not be empty".to_string()));
        }

        let mut store = self.store.lock().await;
        let index = store.append(chat, WatchedEndpoint::new(url));
        info!("Chat {} now watches {} (#{})", chat, url, index);
        Ok(index)
    }

    /// Remove the endpoint at 1-based `index`
    pub async fn remove(
        &self,
        chat: ChatIdentity,
        index: usize,
    ) -> Result<WatchedEndpoint, RelayError> {
        let position = to_position(index)?;
        let mut store = self.store.lock().await;
        let removed = store
            .remove(chat, position)
            .ok_or_else(|| RelayError::NotFound(format!("no endpoint #{} in this chat", index)))?;
        info!("Chat {} stopped watching {} (#{})", chat, removed.url, index);
        Ok(removed)
    }

    pub async fn list(&self, chat: ChatIdentity) -> Vec<WatchedEndpoint> {
        self.store.lock().await.list(chat)
    }

    /// Store a new fingerprint for the endpoint with `id`.
    ///
    /// The endpoint is found by id, so removals of other entries after a
    /// sweep snapshot do not matter. Fails with `NotFound` only when the
    /// endpoint itself is gone.
    pub async fn update_fingerprint(
        &self,
        chat: ChatIdentity,
        id: Uuid,
        fingerprint: Fingerprint,
    ) -> Result<(), RelayError> {
        let mut store = self.store.lock().await;
        let endpoint = store.find_mut(chat, id).ok_or_else(|| {
            RelayError::NotFound(format!("endpoint {} is no longer watched in chat {}", id, chat))
        })?;
        debug!("Fingerprint updated for {} in chat {}", endpoint.url, chat);
        endpoint.fingerprint = Some(fingerprint);
        Ok(())
    }

    /// Consistent copy of every chat's endpoints, taken under one lock
    pub async fn snapshot(&self) -> Vec<(ChatIdentity, Vec<WatchedEndpoint>)> {
        let store = self.store.lock().await;
        store
            .chats()
            .into_iter()
            .map(|chat| (chat, store.list(chat)))
            .collect()
    }

    pub async fn chats(&self) -> Vec<ChatIdentity> {
        self.store.lock().await.chats()
    }

    /// Every registration of exactly `url`, with its 1-based index
    pub async fn chats_watching(&self, url: &str) -> Vec<(ChatIdentity, usize, WatchedEndpoint)> {
        let url = url.trim();
        let store = self.store.lock().await;
        let mut matches = Vec::new();
        for chat in store.chats() {
            for (position, endpoint) in store.list(chat).into_iter().enumerate() {
                if endpoint.url == url {
                    matches.push((chat, position + 1, endpoint));
                }
            }
        }
        matches
    }
}

fn to_position(index: usize) -> Result<usize, RelayError> {
    index
        .checked_sub(1)
        .ok_or_else(|| RelayError::NotFound("endpoint numbers start at 1".to_string()))
}
