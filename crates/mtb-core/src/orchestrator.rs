//! Multi-slot orchestration.
//!
//! - [`OrchestratorState`]: the process-wide "one run at a time" lock plus per-user
//!   cancellation flags.
//! - [`SlotScheduler`]: executes collected slots strictly in order with a fixed pause
//!   between them, warming up upcoming links and honouring cancellation at slot
//!   boundaries.
//! - [`Orchestrator`]: one full `/multibatch` session (wizard, then scheduler) and the
//!   messages the requester sees along the way.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    audit::{AuditEvent, AuditLogger},
    config::TransferTiming,
    domain::{ChatId, RequestContext, UserId},
    errors::Error,
    formatting::{escape_html, slot_queue_summary, slot_start_text},
    link::parse_message_link,
    replies::ReplySource,
    transfer::runner::{invoke_batch_runner, BatchRunner, PlatformClients},
    wizard::{collect_slots, Slot, WizardOutcome},
    Result,
};

/// Global run lock and cancellation flags.
#[derive(Default)]
pub struct OrchestratorState {
    run_lock: Arc<AsyncMutex<()>>,
    cancelled: Mutex<HashSet<UserId>>,
}

/// Proof of holding the run lock. Dropping it releases the lock.
pub struct RunGuard {
    requester: UserId,
    _lock: OwnedMutexGuard<()>,
}

impl RunGuard {
    pub fn requester(&self) -> UserId {
        self.requester
    }
}

impl OrchestratorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the run lock without waiting. Clears a stale cancel flag of `requester`.
    pub fn try_begin(&self, requester: UserId) -> Result<RunGuard> {
        let lock = self
            .run_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| Error::AlreadyRunning)?;
        self.flags().remove(&requester);
        Ok(RunGuard {
            requester,
            _lock: lock,
        })
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    pub fn request_cancel(&self, requester: UserId) {
        self.flags().insert(requester);
    }

    pub fn is_cancelled(&self, requester: UserId) -> bool {
        self.flags().contains(&requester)
    }

    fn flags(&self) -> std::sync::MutexGuard<'_, HashSet<UserId>> {
        self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { executed: usize },
    Cancelled { executed: usize, not_started: usize },
}

pub struct SlotScheduler {
    state: Arc<OrchestratorState>,
    clients: PlatformClients,
    runner: Option<Arc<dyn BatchRunner>>,
    slot_delay: Duration,
}

impl SlotScheduler {
    pub fn new(
        state: Arc<OrchestratorState>,
        clients: PlatformClients,
        runner: Option<Arc<dyn BatchRunner>>,
        slot_delay: Duration,
    ) -> Self {
        Self {
            state,
            clients,
            runner,
            slot_delay,
        }
    }

    /// Run `slots` in order while `guard` is held.
    ///
    /// A slot error aborts the remaining slots and is returned.
    pub async fn run(
        &self,
        guard: &RunGuard,
        context: &RequestContext,
        slots: &[Slot],
    ) -> Result<RunOutcome> {
        let Some(runner) = self.runner.as_ref() else {
            return Err(Error::RunnerUnavailable);
        };

        let requester = guard.requester();
        let total = slots.len();

        for (idx, slot) in slots.iter().enumerate() {
            let number = idx + 1;
            if self.state.is_cancelled(requester) {
                return Ok(self.stopped(context.chat, idx, total).await);
            }

            if idx == 0 && total > 1 {
                self.warm_up(&slots[1..]).await;
            }

            if idx > 0 {
                self.notify(
                    context.chat,
                    &format!(
                        "⏳ Slot {number}/{total} will start in {} seconds...",
                        self.slot_delay.as_secs()
                    ),
                )
                .await;
                sleep(self.slot_delay).await;

                if self.state.is_cancelled(requester) {
                    return Ok(self.stopped(context.chat, idx, total).await);
                }
            }

            info!(slot = number, total, link = slot.link(), "starting slot");
            self.notify(context.chat, &slot_start_text(number, total, slot))
                .await;

            invoke_batch_runner(
                runner.as_ref(),
                &self.clients,
                context,
                slot.link(),
                slot.count(),
            )
            .await?;

            self.notify(context.chat, &format!("✅ Slot {number}/{total} finished."))
                .await;

            if number < total {
                self.warm_up(&slots[number..]).await;
            }
        }

        self.notify(context.chat, "✅ Multi-batch completed.").await;
        Ok(RunOutcome::Completed { executed: total })
    }

    async fn stopped(&self, chat: ChatId, executed: usize, total: usize) -> RunOutcome {
        info!(executed, total, "multi-slot run stopped by cancellation");
        self.notify(chat, "❌ Multi-batch stopped.").await;
        RunOutcome::Cancelled {
            executed,
            not_started: total - executed,
        }
    }

    /// Read-only lookups of each slot's first message so chat metadata is resolved
    /// before the slot starts. Failures are ignored.
    async fn warm_up(&self, upcoming: &[Slot]) {
        for slot in upcoming {
            let Some(link) = parse_message_link(slot.link()) else {
                continue;
            };
            if let Some(secondary) = &self.clients.secondary {
                match secondary.peek_message(&link.chat, link.message).await {
                    Ok(()) => continue,
                    Err(e) => debug!(link = slot.link(), "secondary warm-up failed: {e}"),
                }
            }
            if let Err(e) = self
                .clients
                .primary
                .peek_message(&link.chat, link.message)
                .await
            {
                debug!(link = slot.link(), "warm-up failed: {e}");
            }
        }
    }

    async fn notify(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.clients.primary.send_text(chat, text).await {
            warn!("failed to send status message: {e}");
        }
    }
}

/// How a `/multibatch` session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Cancelled,
    TimedOut,
    Rejected,
    Failed,
}

impl SessionOutcome {
    fn as_str(self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Cancelled => "cancelled",
            SessionOutcome::TimedOut => "timed_out",
            SessionOutcome::Rejected => "rejected",
            SessionOutcome::Failed => "failed",
        }
    }
}

pub struct Orchestrator {
    state: Arc<OrchestratorState>,
    replies: Arc<dyn ReplySource>,
    scheduler: SlotScheduler,
    clients: PlatformClients,
    timing: TransferTiming,
    audit: Option<Arc<AuditLogger>>,
}

impl Orchestrator {
    pub fn new(
        state: Arc<OrchestratorState>,
        replies: Arc<dyn ReplySource>,
        clients: PlatformClients,
        runner: Option<Arc<dyn BatchRunner>>,
        timing: TransferTiming,
        audit: Option<Arc<AuditLogger>>,
    ) -> Self {
        let scheduler = SlotScheduler::new(
            state.clone(),
            clients.clone(),
            runner,
            timing.slot_delay,
        );
        Self {
            state,
            replies,
            scheduler,
            clients,
            timing,
            audit,
        }
    }

    pub fn begin(&self, requester: UserId) -> Result<RunGuard> {
        self.state.try_begin(requester)
    }

    pub fn request_cancel(&self, requester: UserId) {
        self.state.request_cancel(requester);
    }

    /// Collect slots from the requester, then execute them. Consumes the guard, so the
    /// run lock is released whichever way this returns.
    pub async fn run(&self, guard: RunGuard, context: RequestContext) -> SessionOutcome {
        let outcome = self.run_inner(&guard, &context).await;
        info!(user = context.requester.0, outcome = outcome.as_str(), "multi-slot session ended");
        if let Some(audit) = &self.audit {
            audit.record(AuditEvent::run(context.requester, outcome.as_str()));
        }
        drop(guard);
        outcome
    }

    async fn run_inner(&self, guard: &RunGuard, context: &RequestContext) -> SessionOutcome {
        let platform = self.clients.primary.as_ref();
        let collected = collect_slots(
            platform,
            self.replies.as_ref(),
            &self.state,
            context.requester,
            context.chat,
            &self.timing,
        )
        .await;

        let slots = match collected {
            Ok(WizardOutcome::Collected(slots)) => slots,
            Ok(WizardOutcome::TimedOut) => {
                self.reply(
                    context.chat,
                    "⏱️ Timed out waiting for your reply. Run /multibatch again.",
                )
                .await;
                return SessionOutcome::TimedOut;
            }
            Ok(WizardOutcome::Cancelled) => {
                self.reply(context.chat, "❌ Cancelled.").await;
                return SessionOutcome::Cancelled;
            }
            Ok(WizardOutcome::Rejected(reason)) => {
                self.reply(context.chat, &reason.to_string()).await;
                return SessionOutcome::Rejected;
            }
            Err(e) => return self.failed(context, e).await,
        };

        self.reply(context.chat, &slot_queue_summary(&slots)).await;

        match self.scheduler.run(guard, context, &slots).await {
            Ok(RunOutcome::Completed { .. }) => SessionOutcome::Completed,
            Ok(RunOutcome::Cancelled { .. }) => SessionOutcome::Cancelled,
            Err(e) => self.failed(context, e).await,
        }
    }

    async fn failed(&self, context: &RequestContext, e: Error) -> SessionOutcome {
        error!(user = context.requester.0, "multi-slot run failed: {e}");
        if let Some(audit) = &self.audit {
            audit.record(AuditEvent::error(
                context.requester,
                &e.to_string(),
                Some("multibatch"),
            ));
        }
        let text = match e {
            Error::RunnerUnavailable => {
                "❌ No batch runner is configured, the multi-batch cannot run.".to_string()
            }
            other => format!(
                "❌ Error in /multibatch: <code>{}</code>",
                escape_html(&other.to_string())
            ),
        };
        self.reply(context.chat, &text).await;
        SessionOutcome::Failed
    }

    async fn reply(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.clients.primary.send_text(chat, text).await {
            warn!("failed to reply: {e}");
        }
    }
}
