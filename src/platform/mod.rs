pub mod telegram;

use async_trait::async_trait;

use crate::classifier::MediaSource;
use crate::error::RelayError;
use crate::registry::ChatIdentity;

/// Outbound channel to chats.
///
/// Every method reports failure as `RelayError::Delivery` and never panics.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Send an HTML-formatted text message
    async fn send_text(&self, chat: ChatIdentity, html: &str) -> Result<(), RelayError>;

    async fn send_image(
        &self,
        chat: ChatIdentity,
        source: &MediaSource,
        caption: &str,
    ) -> Result<(), RelayError>;

    async fn send_video(
        &self,
        chat: ChatIdentity,
        source: &MediaSource,
        caption: &str,
    ) -> Result<(), RelayError>;

    async fn send_document(
        &self,
        chat: ChatIdentity,
        source: &MediaSource,
        caption: &str,
    ) -> Result<(), RelayError>;
}
