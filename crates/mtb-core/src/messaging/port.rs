use async_trait::async_trait;

use crate::{
    domain::{ChatId, ChatRef, MessageId, MessageRef, SourceMessage},
    Result,
};

/// Chat-platform port consumed by the transfer engine and the orchestrator.
///
/// Telegram is the only implementation today; fakes implement it in tests.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Fetch one message. `Ok(None)` means the id does not exist (or was deleted).
    async fn fetch_message(&self, chat: &ChatRef, id: MessageId) -> Result<Option<SourceMessage>>;

    /// Read-only lookup used to warm caches before a slot starts.
    ///
    /// Implementations should avoid sending anything; the default fetches and discards.
    async fn peek_message(&self, chat: &ChatRef, id: MessageId) -> Result<()> {
        self.fetch_message(chat, id).await.map(|_| ())
    }

    async fn copy_message(
        &self,
        source: &SourceMessage,
        destination: ChatId,
        caption: Option<&str>,
    ) -> Result<()>;

    async fn send_text(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
    async fn edit_text(&self, msg: MessageRef, html: &str) -> Result<()>;
}
