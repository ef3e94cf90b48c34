//! Fakes for the gateway and fetcher seams, shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::classifier::MediaSource;
use crate::error::RelayError;
use crate::platform::MessagingGateway;
use crate::poller::fetch::{FetchedResponse, Fetcher};
use crate::registry::ChatIdentity;

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(ChatIdentity, String),
    Image(ChatIdentity, MediaSource, String),
    Video(ChatIdentity, MediaSource, String),
    Document(ChatIdentity, MediaSource, String),
}

impl Sent {
    pub fn chat(&self) -> ChatIdentity {
        match self {
            Sent::Text(chat, _)
            | Sent::Image(chat, _, _)
            | Sent::Video(chat, _, _)
            | Sent::Document(chat, _, _) => *chat,
        }
    }
}

/// Records every message; can be told to reject text or whole chats
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<Sent>>,
    fail_text: bool,
    fail_chats: Vec<ChatIdentity>,
}

impl RecordingGateway {
    pub fn failing_text() -> Self {
        Self {
            fail_text: true,
            ..Self::default()
        }
    }

    pub fn failing_for(chats: Vec<ChatIdentity>) -> Self {
        Self {
            fail_chats: chats,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_for(&self, chat: ChatIdentity) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Text(c, text) if c == chat => Some(text),
                _ => None,
            })
            .collect()
    }

    fn deliver(&self, sent: Sent, is_text: bool) -> Result<(), RelayError> {
        if self.fail_chats.contains(&sent.chat()) || (is_text && self.fail_text) {
            return Err(RelayError::Delivery(format!("rejected: {:?}", sent)));
        }
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_text(&self, chat: ChatIdentity, html: &str) -> Result<(), RelayError> {
        self.deliver(Sent::Text(chat, html.to_string()), true)
    }

    async fn send_image(
        &self,
        chat: ChatIdentity,
        source: &MediaSource,
        caption: &str,
    ) -> Result<(), RelayError> {
        self.deliver(Sent::Image(chat, source.clone(), caption.to_string()), false)
    }

    async fn send_video(
        &self,
        chat: ChatIdentity,
        source: &MediaSource,
        caption: &str,
    ) -> Result<(), RelayError> {
        self.deliver(Sent::Video(chat, source.clone(), caption.to_string()), false)
    }

    async fn send_document(
        &self,
        chat: ChatIdentity,
        source: &MediaSource,
        caption: &str,
    ) -> Result<(), RelayError> {
        self.deliver(Sent::Document(chat, source.clone(), caption.to_string()), false)
    }
}

/// Serves scripted responses per URL. The last response repeats forever.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, VecDeque<Result<FetchedResponse, String>>>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `Err` entries become `RelayError::Fetch` with that reason
    pub fn respond(&self, url: &str, script: Vec<Result<FetchedResponse, String>>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), script.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next(&self, url: &str) -> Result<FetchedResponse, RelayError> {
        let mut responses = self.responses.lock().unwrap();
        let script = responses
            .get_mut(url)
            .ok_or_else(|| RelayError::fetch(url, "no scripted response"))?;
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(RelayError::fetch(url, reason)),
            None => Err(RelayError::fetch(url, "no scripted response")),
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResponse, RelayError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.next(url);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
