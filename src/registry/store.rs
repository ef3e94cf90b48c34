use std::collections::HashMap;

use uuid::Uuid;

use super::{ChatIdentity, WatchedEndpoint};

/// Storage backend for the registry.
///
/// Methods are synchronous and take `&mut self`: the `Registry` handle owns
/// the lock, so a backend never sees two calls at once.
pub trait RegistryStore: Send {
    /// Append an endpoint and return the new length of the chat's list
    fn append(&mut self, chat: ChatIdentity, endpoint: WatchedEndpoint) -> usize;

    /// Remove by 0-based position. `None` if the chat or position is absent.
    fn remove(&mut self, chat: ChatIdentity, position: usize) -> Option<WatchedEndpoint>;

    /// Endpoints of one chat in insertion order
    fn list(&self, chat: ChatIdentity) -> Vec<WatchedEndpoint>;

    /// Mutable access to the endpoint with `id`, wherever it sits in the list
    fn find_mut(&mut self, chat: ChatIdentity, id: Uuid) -> Option<&mut WatchedEndpoint>;

    /// Every chat that has at least one endpoint
    fn chats(&self) -> Vec<ChatIdentity>;
}

/// Process-local backend. State is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: HashMap<ChatIdentity, Vec<WatchedEndpoint>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for InMemoryStore {
    fn append(&mut self, chat: ChatIdentity, endpoint: WatchedEndpoint) -> usize {
        let list = self.entries.entry(chat).or_default();
        list.push(endpoint);
        list.len()
    }

    fn remove(&mut self, chat: ChatIdentity, position: usize) -> Option<WatchedEndpoint> {
        let list = self.entries.get_mut(&chat)?;
        if position >= list.len() {
            return None;
        }
        let removed = list.remove(position);
        if list.is_empty() {
            self.entries.remove(&chat);
        }
        Some(removed)
    }

    fn list(&self, chat: ChatIdentity) -> Vec<WatchedEndpoint> {
        self.entries.get(&chat).cloned().unwrap_or_default()
    }

    fn find_mut(&mut self, chat: ChatIdentity, id: Uuid) -> Option<&mut WatchedEndpoint> {
        self.entries
            .get_mut(&chat)?
            .iter_mut()
            .find(|endpoint| endpoint.id == id)
    }

    fn chats(&self) -> Vec<ChatIdentity> {
        let mut chats: Vec<ChatIdentity> = self
            .entries
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(chat, _)| *chat)
            .collect();
        // HashMap order is random; keep sweeps and broadcasts reproducible
        chats.sort();
        chats
    }
}
