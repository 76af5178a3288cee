//! Telegram adapter (teloxide).
//!
//! This crate implements the `mtb-core` ChatPlatform over the Telegram Bot API and
//! hosts the update router.
//!
//! The Bot API cannot read a message by id. `fetch_message` therefore forwards the
//! message into a probe chat, inspects the forwarded copy and deletes it again.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ParseMode, Recipient},
    ApiError, RequestError,
};

use tokio::time::sleep;
use tracing::debug;

pub mod handlers;
pub mod router;

use mtb_core::{
    domain::{ChatId, ChatRef, MediaKind, MessageId, MessageRef, SourceMessage},
    errors::Error,
    messaging::port::ChatPlatform,
    Result,
};

#[derive(Clone)]
pub struct TelegramPlatform {
    bot: Bot,
    probe_chat: Option<ChatId>,
}

impl TelegramPlatform {
    pub fn new(bot: Bot, probe_chat: Option<ChatId>) -> Self {
        Self { bot, probe_chat }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn recipient(chat: &ChatRef) -> Recipient {
        match chat {
            ChatRef::Id(id) => Recipient::Id(teloxide::types::ChatId(*id)),
            ChatRef::Handle(handle) => Recipient::ChannelUsername(format!("@{handle}")),
        }
    }

    fn map_err(e: RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    fn is_missing_message(e: &RequestError) -> bool {
        matches!(
            e,
            RequestError::Api(ApiError::MessageToForwardNotFound | ApiError::MessageIdInvalid)
        )
    }

    fn media_kind(msg: &Message) -> Option<MediaKind> {
        if msg.document().is_some() {
            Some(MediaKind::Document)
        } else if msg.video().is_some() {
            Some(MediaKind::Video)
        } else if msg.photo().is_some() {
            Some(MediaKind::Photo)
        } else if msg.audio().is_some() {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }

    /// One retry on `RetryAfter`; other errors are returned untouched.
    async fn call<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> std::result::Result<T, RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    debug!(wait = ?d, "telegram asked us to retry later");
                    sleep(d).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn with_retry<T, Fut>(&self, op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        self.call(op).await.map_err(Self::map_err)
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn fetch_message(&self, chat: &ChatRef, id: MessageId) -> Result<Option<SourceMessage>> {
        let Some(probe) = self.probe_chat else {
            return Err(Error::Config(
                "no probe chat configured for reading messages".to_string(),
            ));
        };

        let from = Self::recipient(chat);
        let forwarded = match self
            .call(|| {
                self.bot
                    .forward_message(Self::tg_chat(probe), from.clone(), Self::tg_msg_id(id))
                    .disable_notification(true)
            })
            .await
        {
            Ok(m) => m,
            Err(e) if Self::is_missing_message(&e) => return Ok(None),
            Err(e) => return Err(Self::map_err(e)),
        };

        let source = SourceMessage {
            chat: chat.clone(),
            id,
            media: Self::media_kind(&forwarded),
            caption: forwarded.caption().map(str::to_string),
        };

        if let Err(e) = self
            .with_retry(|| self.bot.delete_message(forwarded.chat.id, forwarded.id))
            .await
        {
            debug!(chat = %chat, id = id.0, "probe cleanup failed: {e}");
        }

        Ok(Some(source))
    }

    async fn peek_message(&self, chat: &ChatRef, _id: MessageId) -> Result<()> {
        let target = Self::recipient(chat);
        self.with_retry(|| self.bot.get_chat(target.clone())).await?;
        Ok(())
    }

    async fn copy_message(
        &self,
        source: &SourceMessage,
        destination: ChatId,
        caption: Option<&str>,
    ) -> Result<()> {
        let from = Self::recipient(&source.chat);
        self.with_retry(|| {
            let req = self.bot.copy_message(
                Self::tg_chat(destination),
                from.clone(),
                Self::tg_msg_id(source.id),
            );
            match caption {
                Some(c) => req.caption(c.to_string()),
                None => req,
            }
        })
        .await?;
        Ok(())
    }

    async fn send_text(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_text(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }
}
