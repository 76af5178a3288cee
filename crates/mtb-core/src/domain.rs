use std::fmt;

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Source chat as it appears in a permalink: numeric id or public handle.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatRef {
    Id(i64),
    Handle(String),
}

impl From<ChatId> for ChatRef {
    fn from(c: ChatId) -> Self {
        ChatRef::Id(c.0)
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRef::Id(id) => write!(f, "{id}"),
            ChatRef::Handle(h) => write!(f, "@{h}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Document,
    Video,
    Photo,
    Audio,
}

/// A message fetched from a source chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceMessage {
    pub chat: ChatRef,
    pub id: MessageId,
    pub media: Option<MediaKind>,
    pub caption: Option<String>,
}

impl SourceMessage {
    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }
}

/// The command message that started a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub requester: UserId,
    pub chat: ChatId,
    pub message: Option<MessageRef>,
}

/// One copy job: `count` consecutive ids starting at `start`, delivered to `destination`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    pub requester: UserId,
    pub destination: ChatId,
    pub start: MessageId,
    pub count: u32,
}

impl TransferRequest {
    /// Last id of the range, or `None` when the range leaves the id space.
    pub fn last_id(&self) -> Option<MessageId> {
        if self.count == 0 {
            return Some(self.start);
        }
        let span = i32::try_from(self.count - 1).ok()?;
        self.start.0.checked_add(span).map(MessageId)
    }
}

/// Outcome counters of one copy job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferResult {
    pub requested: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
    pub cancelled: bool,
}

impl TransferResult {
    pub fn new(requested: u32) -> Self {
        Self {
            requested,
            ..Default::default()
        }
    }

    pub fn processed(&self) -> u32 {
        self.succeeded + self.failed + self.skipped
    }
}
