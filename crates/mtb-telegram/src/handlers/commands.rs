use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;

use mtb_core::{
    domain::{ChatId, MessageId, MessageRef, RequestContext, UserId},
    errors::Error,
    formatting::escape_html,
    transfer::PendingTransfer,
};

use crate::router::AppState;

use super::reply;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// First whitespace-separated token as a chat id.
fn parse_destination(arg: &str) -> Option<ChatId> {
    arg.split_whitespace()
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .map(ChatId)
}

const HELP: &str = "📦 <b>Media Transfer Bot</b>\n\n\
<b>📋 Commands:</b>\n\
/multibatch - Queue up to several batches, run one after another\n\
/cancelmultibatch - Stop the multi-batch after the current slot\n\
/transfer &lt;channel_id&gt; - Reply to the first file, then send how many\n\
/botToChannel &lt;channel_id&gt; - Same as /transfer\n\
/canceltransfer - Stop a running /transfer\n\n\
<b>💡 Links:</b>\n\
• <code>https://t.me/c/123456/10</code> (private channel)\n\
• <code>https://t.me/somechannel/10</code> (public)";

const TRANSFER_USAGE: &str = "⚠️ <b>Incorrect Usage</b>\n\n\
1. Find the <b>first file</b> you want to send in this chat.\n\
2. <b>Reply</b> to that file with: <code>/transfer -100xxxxxxx</code>\n\
(Replace <code>-100xxxxxxx</code> with your Channel ID)";

/// Multi-slot runs are owned by one private chat.
fn requires_private_chat(cmd: &str) -> bool {
    matches!(cmd, "multibatch" | "cancelmultibatch" | "multicancel")
}

pub async fn handle_command(
    msg: &Message,
    state: Arc<AppState>,
    user: UserId,
) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let chat_id = ChatId(msg.chat.id.0);
    let (cmd, arg) = parse_command(text);

    if requires_private_chat(&cmd) && !msg.chat.is_private() {
        reply(&state, chat_id, &format!("⚠️ /{cmd} works in a private chat only.")).await;
        return Ok(());
    }

    match cmd.as_str() {
        "start" | "help" => {
            reply(&state, chat_id, HELP).await;
            Ok(())
        }

        "multibatch" => {
            let guard = match state.orchestrator.begin(user) {
                Ok(guard) => guard,
                Err(Error::AlreadyRunning) => {
                    reply(
                        &state,
                        chat_id,
                        "⚠️ A multibatch is already running. Try again after it finishes.",
                    )
                    .await;
                    return Ok(());
                }
                Err(e) => {
                    reply(&state, chat_id, &format!("❌ {}", escape_html(&e.to_string()))).await;
                    return Ok(());
                }
            };

            info!(user = user.0, "multibatch session started");
            let context = RequestContext {
                requester: user,
                chat: chat_id,
                message: Some(MessageRef {
                    chat_id,
                    message_id: MessageId(msg.id.0),
                }),
            };
            // The wizard waits for later updates from this chat, so it cannot run inside
            // the dispatcher's per-chat handler.
            let orchestrator = state.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.run(guard, context).await;
            });
            Ok(())
        }

        "cancelmultibatch" | "multicancel" => {
            state.orchestrator.request_cancel(user);
            reply(
                &state,
                chat_id,
                "✅ Multi-batch cancel requested. It will stop after the current slot finishes.",
            )
            .await;
            Ok(())
        }

        "transfer" | "bottochannel" => {
            let Some(start) = msg.reply_to_message() else {
                reply(&state, chat_id, TRANSFER_USAGE).await;
                return Ok(());
            };
            let Some(destination) = parse_destination(&arg) else {
                reply(
                    &state,
                    chat_id,
                    "❌ Please provide a valid Channel ID.\nExample: <code>/transfer -100123456789</code>",
                )
                .await;
                return Ok(());
            };

            let start = MessageId(start.id.0);
            state.pending.insert(
                user,
                PendingTransfer {
                    source: chat_id,
                    start,
                    destination,
                },
            );
            let body = format!(
                "✅ <b>Starting Point Selected!</b> (Message ID: <code>{}</code>)\n\n\
<b>How many files</b> do you want to transfer from here?\n\
<i>(Type a number, e.g., 10, 50, 100)</i>",
                start.0
            );
            reply(&state, chat_id, &body).await;
            Ok(())
        }

        "canceltransfer" => {
            let text = if state.running.cancel(user) {
                "🛑 Stopping transfer..."
            } else {
                "No transfer is running."
            };
            reply(&state, chat_id, text).await;
            Ok(())
        }

        _ => {
            let text = format!("Unknown command: /{}", escape_html(&cmd));
            reply(&state, chat_id, &text).await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bot_suffix_and_lowercases() {
        assert_eq!(
            parse_command("/botToChannel@MyBot -100123"),
            ("bottochannel".to_string(), "-100123".to_string())
        );
        assert_eq!(parse_command("/multibatch"), ("multibatch".to_string(), String::new()));
    }

    #[test]
    fn destination_must_be_numeric() {
        assert_eq!(parse_destination("-100123 extra"), Some(ChatId(-100123)));
        assert_eq!(parse_destination("@channel"), None);
        assert_eq!(parse_destination(""), None);
    }

    #[test]
    fn multibatch_commands_are_private_only() {
        for cmd in ["multibatch", "cancelmultibatch", "multicancel"] {
            assert!(requires_private_chat(&parse_command(&format!("/{cmd}@MyBot")).0));
        }
        assert!(!requires_private_chat("transfer"));
        assert!(!requires_private_chat("canceltransfer"));
        assert!(!requires_private_chat("help"));
    }
}
