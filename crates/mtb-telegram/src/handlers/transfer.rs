use std::sync::Arc;

use tracing::error;

use mtb_core::{
    audit::AuditEvent,
    domain::{ChatId, UserId},
    formatting::escape_html,
    transfer::run_single,
};

use crate::router::AppState;

use super::reply;

/// Quantity step of `/transfer`. A number from a user with nothing pending is ignored.
pub async fn start_pending(state: Arc<AppState>, user: UserId, chat_id: ChatId, count: u32) {
    let Some(pending) = state.pending.take(user) else {
        return;
    };

    let Some(cancel) = state.running.start(user) else {
        reply(
            &state,
            chat_id,
            "⚠️ A transfer is already running. Send /canceltransfer to stop it first.",
        )
        .await;
        return;
    };

    // Copying takes minutes; keep the dispatcher free for /canceltransfer.
    tokio::spawn(async move {
        let outcome = run_single(
            state.platform.clone(),
            &pending,
            user,
            count,
            &state.cfg.timing,
            &cancel,
            Some(state.audit.as_ref()),
        )
        .await;
        state.running.finish(user);

        if let Err(e) = outcome {
            error!(user = user.0, "transfer failed: {e}");
            state.audit.record(AuditEvent::error(user, &e.to_string(), Some("transfer")));
            let text = format!("❌ Transfer failed: <code>{}</code>", escape_html(&e.to_string()));
            reply(&state, pending.source, &text).await;
        }
    });
}
