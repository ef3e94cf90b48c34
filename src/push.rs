use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::classifier::{classify, Classification, ContentKind, RenderablePayload};
use crate::config::Attribution;
use crate::dispatcher::{DeliveryReport, Dispatcher};
use crate::registry::{ChatIdentity, Registry};

/// Result of one inbound push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted {
        chats: usize,
        report: DeliveryReport,
    },
    /// Malformed input; nothing was delivered
    Rejected(String),
}

/// Routes externally pushed updates through the classify/dispatch path.
///
/// There is no deduplication: a push is delivered once per target chat per
/// call, regardless of what the poller has already sent.
pub struct PushHandler {
    registry: Registry,
    dispatcher: Dispatcher,
    attribution: Attribution,
}

impl PushHandler {
    pub fn new(registry: Registry, dispatcher: Dispatcher, attribution: Attribution) -> Self {
        Self {
            registry,
            dispatcher,
            attribution,
        }
    }

    pub async fn on_push(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        source_url: Option<&str>,
    ) -> PushOutcome {
        if body.iter().all(u8::is_ascii_whitespace) {
            return PushOutcome::Rejected("empty body".to_string());
        }
        if ContentKind::from_content_type(content_type) == ContentKind::Structured {
            if let Err(e) = serde_json::from_slice::<Value>(body) {
                debug!("Rejecting push with invalid JSON: {}", e);
                return PushOutcome::Rejected(format!("body is not valid JSON: {}", e));
            }
        }

        let Classification { items, fingerprint } = classify(body, content_type, source_url);
        let targets = match (self.attribution, source_url) {
            (Attribution::UrlMatch, Some(url)) => {
                let matches = self.registry.chats_watching(url).await;
                let mut chats = Vec::with_capacity(matches.len());
                for (chat, _, endpoint) in matches {
                    // Pushed content counts as seen, so the next sweep stays quiet
                    if let Err(e) = self
                        .registry
                        .update_fingerprint(chat, endpoint.id, fingerprint.clone())
                        .await
                    {
                        debug!("Push: fingerprint not stored for chat {}: {}", chat, e);
                    }
                    chats.push(chat);
                }
                chats.dedup();
                if chats.is_empty() {
                    debug!("Push source {} matched no chat, broadcasting", url);
                    self.registry.chats().await
                } else {
                    chats
                }
            }
            _ => self.registry.chats().await,
        };

        let deliveries = targets
            .iter()
            .map(|chat| self.deliver(*chat, &items));
        let mut report = DeliveryReport::default();
        for single in join_all(deliveries).await {
            report.merge(single);
        }

        info!(
            "Push delivered to {} chat(s): {} sent, {} failed",
            targets.len(),
            report.sent,
            report.failed
        );
        PushOutcome::Accepted {
            chats: targets.len(),
            report,
        }
    }

    async fn deliver(
        &self,
        chat: ChatIdentity,
        items: &[RenderablePayload],
    ) -> DeliveryReport {
        let report = self.dispatcher.dispatch(chat, items).await;
        if !report.is_success() {
            warn!("Push: {} message(s) to chat {} failed", report.failed, chat);
        }
        report
    }
}
