use std::sync::Arc;

use tracing::{debug, error};

use crate::classifier::RenderablePayload;
use crate::error::RelayError;
use crate::platform::MessagingGateway;
use crate::registry::ChatIdentity;

/// Telegram allows 4096 characters; leave room for markup
pub const MESSAGE_LIMIT: usize = 4000;

/// Raw value pieces are escaped separately, and escaping can grow a piece
/// up to 5x (`&` → `&amp;`), so pieces stay well under the message limit
const VALUE_PIECE: usize = 700;

const LABEL_LIMIT: usize = 200;

/// Outcome of delivering one payload to one chat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn merge(&mut self, other: DeliveryReport) {
        self.sent += other.sent;
        self.failed += other.failed;
    }
}

/// Renders payloads into chat messages. Stateless apart from the gateway.
#[derive(Clone)]
pub struct Dispatcher {
    gateway: Arc<dyn MessagingGateway>,
}

impl Dispatcher {
    pub fn new(gateway: Arc<dyn MessagingGateway>) -> Self {
        Self { gateway }
    }

    /// Deliver every item to `chat`.
    ///
    /// Text fields and links share one text block; each media item is its
    /// own message. Failures are logged and counted, never retried.
    pub async fn dispatch(&self, chat: ChatIdentity, items: &[RenderablePayload]) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for message in render_text(items) {
            self.record(
                &mut report,
                chat,
                "text",
                self.gateway.send_text(chat, &message).await,
            );
        }

        for item in items {
            let result = match item {
                RenderablePayload::Image { label, source } => {
                    self.gateway.send_image(chat, source, label).await
                }
                RenderablePayload::Video { label, source } => {
                    self.gateway.send_video(chat, source, label).await
                }
                RenderablePayload::Document { label, source } => {
                    self.gateway.send_document(chat, source, label).await
                }
                RenderablePayload::TextFields(_) | RenderablePayload::Link { .. } => continue,
            };
            self.record(&mut report, chat, "media", result);
        }

        debug!(
            "Dispatch to chat {}: {} sent, {} failed",
            chat, report.sent, report.failed
        );
        report
    }

    fn record(
        &self,
        report: &mut DeliveryReport,
        chat: ChatIdentity,
        kind: &str,
        result: Result<(), RelayError>,
    ) {
        match result {
            Ok(()) => report.sent += 1,
            Err(e) => {
                error!("Failed to deliver {} message to chat {}: {}", kind, chat, e);
                report.failed += 1;
            }
        }
    }
}

/// Render text fields and links as HTML messages, split to fit the limit.
/// Returns nothing when there is no text to send.
pub fn render_text(items: &[RenderablePayload]) -> Vec<String> {
    let mut lines: Vec<Vec<String>> = Vec::new();

    for item in items {
        match item {
            RenderablePayload::TextFields(fields) => {
                for (label, value) in fields {
                    lines.push(field_line(label, value));
                }
            }
            RenderablePayload::Link { label, url } => {
                let short_label: String = label.chars().take(LABEL_LIMIT).collect();
                let anchor = format!(
                    "<a href=\"{}\">{}</a>",
                    html_escape::encode_double_quoted_attribute(url),
                    html_escape::encode_text(&short_label)
                );
                // An anchor cannot be split, so an oversized one is sent as plain text
                if anchor.len() > MESSAGE_LIMIT {
                    lines.push(field_line(label, url));
                } else {
                    lines.push(vec![anchor]);
                }
            }
            _ => {}
        }
    }

    pack_lines(lines, MESSAGE_LIMIT)
}

/// `<b>label</b>: value` as escaped parts, each small enough to pack
fn field_line(label: &str, value: &str) -> Vec<String> {
    let label: String = label.chars().take(LABEL_LIMIT).collect();
    let mut parts = vec![format!("<b>{}</b>: ", html_escape::encode_text(&label))];
    parts.extend(
        split_message(value, VALUE_PIECE)
            .iter()
            .map(|piece| html_escape::encode_text(piece).into_owned()),
    );
    parts
}

/// Join lines with newlines into as few messages as fit `max_len`.
/// A line may continue into the next message between its parts.
fn pack_lines(lines: Vec<Vec<String>>, max_len: usize) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = String::new();

    for line in lines {
        for (i, part) in line.into_iter().enumerate() {
            let separator = if i == 0 && !current.is_empty() { "\n" } else { "" };
            if !current.is_empty() && current.len() + separator.len() + part.len() > max_len {
                messages.push(std::mem::take(&mut current));
                current.push_str(&part);
                continue;
            }
            current.push_str(separator);
            current.push_str(&part);
        }
    }

    if !current.is_empty() {
        messages.push(current);
    }
    messages
}

/// Split long text at newlines or spaces, never inside a UTF-8 character
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}
