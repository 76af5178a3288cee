//! Telegram message permalinks.
//!
//! Two shapes are recognised:
//! - `t.me/c/<internal_id>/<msg_id>`: private channel; the addressable chat id is
//!   `-100<internal_id>`.
//! - `t.me/<username>/<msg_id>`: public chat by handle.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{ChatRef, MessageId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageLink {
    pub chat: ChatRef,
    pub message: MessageId,
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:https?://)?t\.me/(c/)?(?P<chat>\w+)/(?P<msg>\d+)")
            .expect("valid regex")
    })
}

/// Parse a permalink. Anything unrecognised yields `None`; callers skip such links.
pub fn parse_message_link(text: &str) -> Option<MessageLink> {
    let text = text.trim();
    let text = text.split('?').next().unwrap_or("");

    let caps = link_re().captures(text)?;
    let is_private = caps.get(1).is_some();
    let chat_part = caps.name("chat")?.as_str();
    let message = caps.name("msg")?.as_str().parse::<i32>().ok()?;

    let chat = if is_private {
        if !chat_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        ChatRef::Id(format!("-100{chat_part}").parse::<i64>().ok()?)
    } else {
        ChatRef::Handle(chat_part.to_string())
    };

    Some(MessageLink {
        chat,
        message: MessageId(message),
    })
}
