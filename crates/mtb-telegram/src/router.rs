use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use mtb_core::messaging::throttled::{ThrottleConfig, ThrottledPlatform};
use mtb_core::{
    audit::AuditLogger,
    config::Config,
    domain::ChatId,
    messaging::port::ChatPlatform,
    orchestrator::{Orchestrator, OrchestratorState},
    replies::ReplyWaiters,
    transfer::{BatchRunner, PendingTransfers, PlatformClients, RangeBatchRunner, RunningTransfers},
};

use crate::handlers;
use crate::TelegramPlatform;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub platform: Arc<dyn ChatPlatform>,
    pub orchestrator: Arc<Orchestrator>,
    pub replies: Arc<ReplyWaiters>,
    pub pending: Arc<PendingTransfers>,
    pub running: Arc<RunningTransfers>,
    pub audit: Arc<AuditLogger>,
}

/// Raw Telegram client wrapped in the throttling decorator. The adapter still retries
/// a single 429 on its own. Fetches forward into the probe chat, so they are spaced
/// as writes to it.
fn throttled(bot: Bot, probe_chat: Option<ChatId>) -> Arc<dyn ChatPlatform> {
    let raw: Arc<dyn ChatPlatform> = Arc::new(TelegramPlatform::new(bot, probe_chat));
    Arc::new(ThrottledPlatform::new(raw, ThrottleConfig::default()).with_probe_chat(probe_chat))
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!("mtb started: @{}", me.username()),
        Err(e) => warn!("get_me failed: {e}"),
    }
    info!(allowed_users = cfg.telegram_allowed_users.len(), "authorization list loaded");

    let probe_chat = cfg.probe_chat().map(ChatId);
    if probe_chat.is_none() {
        warn!("no probe chat available; message fetches will fail");
    }

    let platform = throttled(bot.clone(), probe_chat);
    let secondary = cfg.secondary_bot_token.as_ref().map(|token| {
        info!("secondary bot configured for warm-up and batch runs");
        throttled(Bot::new(token.clone()), probe_chat)
    });

    let audit = Arc::new(AuditLogger::new(
        cfg.audit_log_path.clone(),
        cfg.audit_log_json,
    ));
    let runner: Arc<dyn BatchRunner> = Arc::new(RangeBatchRunner::new(
        cfg.multibatch_destination.map(ChatId),
        cfg.timing,
        Some(audit.clone()),
    ));
    let replies = Arc::new(ReplyWaiters::new());

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(OrchestratorState::new()),
        replies.clone(),
        PlatformClients {
            primary: platform.clone(),
            secondary,
        },
        Some(runner),
        cfg.timing,
        Some(audit.clone()),
    ));

    let state = Arc::new(AppState {
        cfg,
        platform,
        orchestrator,
        replies,
        pending: Arc::new(PendingTransfers::new()),
        running: Arc::new(RunningTransfers::new()),
        audit,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
