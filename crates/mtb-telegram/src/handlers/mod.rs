//! Telegram update handlers.
//!
//! Every text goes through the same gate:
//! 1. allow-list check
//! 2. an open wizard question for this user takes the text as its answer
//! 3. commands
//! 4. a bare number completes a pending `/transfer`

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::warn;

use mtb_core::{
    domain::{ChatId, UserId},
    security::is_authorized,
    transfer::parse_quantity,
};

use crate::router::AppState;
mod commands;
mod transfer;

/// Best-effort HTML reply through the throttled platform.
pub(crate) async fn reply(state: &AppState, chat_id: ChatId, html: &str) {
    if let Err(e) = state.platform.send_text(chat_id, html).await {
        warn!(chat = chat_id.0, "reply failed: {e}");
    }
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));

    if !is_authorized(user_id, &state.cfg.telegram_allowed_users) {
        let _ = bot
            .send_message(
                msg.chat.id,
                "Unauthorized. Contact the bot owner for access.",
            )
            .await;
        return Ok(());
    }

    let (Some(user), Some(text)) = (user_id, msg.text()) else {
        return Ok(());
    };

    if state.replies.deliver(user, text) {
        return Ok(());
    }

    if text.starts_with('/') {
        return commands::handle_command(&msg, state, user).await;
    }

    if let Some(count) = parse_quantity(text) {
        transfer::start_pending(state, user, ChatId(msg.chat.id.0), count).await;
    }

    // Anything else is ignored.
    Ok(())
}
