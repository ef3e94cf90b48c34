pub mod fetch;
pub mod task;

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::classifier::{classify, Classification};
use crate::dispatcher::{DeliveryReport, Dispatcher};
use crate::poller::fetch::Fetcher;
use crate::registry::{ChatIdentity, Registry, WatchedEndpoint};

/// Result of checking one endpoint once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Unchanged,
    Changed(DeliveryReport),
    Failed,
    /// The endpoint was removed after the sweep read it
    Stale,
}

/// Totals for one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Fetches watched endpoints and notifies chats when their content changes
pub struct Poller {
    registry: Registry,
    fetcher: Arc<dyn Fetcher>,
    dispatcher: Dispatcher,
}

impl Poller {
    pub fn new(registry: Registry, fetcher: Arc<dyn Fetcher>, dispatcher: Dispatcher) -> Self {
        Self {
            registry,
            fetcher,
            dispatcher,
        }
    }

    /// Check every registered endpoint once.
    ///
    /// Works on a snapshot, so adds and removes that arrive mid-sweep only
    /// take effect on the next one. Fetches run concurrently.
    pub async fn sweep(&self) -> SweepReport {
        let snapshot = self.registry.snapshot().await;
        let checks = snapshot.iter().flat_map(|(chat, endpoints)| {
            endpoints
                .iter()
                .enumerate()
                .map(move |(i, endpoint)| self.check(*chat, i + 1, endpoint))
        });

        let mut report = SweepReport::default();
        for outcome in join_all(checks).await {
            match outcome {
                PollOutcome::Changed(_) => report.changed += 1,
                PollOutcome::Unchanged => report.unchanged += 1,
                PollOutcome::Failed => report.failed += 1,
                PollOutcome::Stale => report.skipped += 1,
            }
        }

        info!(
            "Sweep finished: {} changed, {} unchanged, {} failed, {} skipped",
            report.changed, report.unchanged, report.failed, report.skipped
        );
        report
    }

    /// Fetch one endpoint and dispatch if its fingerprint moved.
    ///
    /// The new fingerprint is stored before dispatching and is kept even
    /// if delivery fails, so a broken chat is not re-notified every sweep.
    pub async fn check(
        &self,
        chat: ChatIdentity,
        index: usize,
        endpoint: &WatchedEndpoint,
    ) -> PollOutcome {
        let response = match self.fetcher.fetch(&endpoint.url).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Chat {} #{}: {}", chat, index, e);
                return PollOutcome::Failed;
            }
        };

        let Classification { items, fingerprint } = classify(
            &response.body,
            response.content_type.as_deref(),
            Some(&endpoint.url),
        );

        if endpoint.fingerprint.as_ref() == Some(&fingerprint) {
            debug!("Chat {} #{}: {} unchanged", chat, index, endpoint.url);
            return PollOutcome::Unchanged;
        }

        if let Err(e) = self
            .registry
            .update_fingerprint(chat, endpoint.id, fingerprint)
            .await
        {
            debug!("Chat {} #{}: skipping dispatch, {}", chat, index, e);
            return PollOutcome::Stale;
        }

        info!("Chat {} #{}: {} changed", chat, index, endpoint.url);
        let report = self.dispatcher.dispatch(chat, &items).await;
        if !report.is_success() {
            warn!(
                "Chat {} #{}: {} of {} messages not delivered",
                chat,
                index,
                report.failed,
                report.sent + report.failed
            );
        }
        PollOutcome::Changed(report)
    }
}
