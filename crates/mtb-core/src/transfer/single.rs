//! Single-shot transfer: `/transfer <dest>` as a reply to the first message, then the
//! quantity as a plain number.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    audit::{AuditEvent, AuditLogger},
    config::TransferTiming,
    domain::{ChatId, ChatRef, MessageId, TransferRequest, TransferResult, UserId},
    formatting::transfer_summary,
    messaging::port::ChatPlatform,
    transfer::engine::{RangeCopier, StatusProgress},
    Result,
};

/// A transfer waiting for its quantity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTransfer {
    /// Chat the command was issued in. Messages are copied from here and status is
    /// reported here.
    pub source: ChatId,
    pub start: MessageId,
    pub destination: ChatId,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-user pending quantity questions. A new `/transfer` replaces the previous one.
#[derive(Default)]
pub struct PendingTransfers {
    inner: Mutex<HashMap<UserId, PendingTransfer>>,
}

impl PendingTransfers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: UserId, pending: PendingTransfer) {
        lock(&self.inner).insert(user, pending);
    }

    pub fn take(&self, user: UserId) -> Option<PendingTransfer> {
        lock(&self.inner).remove(&user)
    }
}

/// Cancellation tokens of running single-shot transfers, one per user.
#[derive(Default)]
pub struct RunningTransfers {
    inner: Mutex<HashMap<UserId, CancellationToken>>,
}

impl RunningTransfers {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if `user` already has a transfer running.
    pub fn start(&self, user: UserId) -> Option<CancellationToken> {
        let mut map = lock(&self.inner);
        if map.contains_key(&user) {
            return None;
        }
        let token = CancellationToken::new();
        map.insert(user, token.clone());
        Some(token)
    }

    pub fn cancel(&self, user: UserId) -> bool {
        match lock(&self.inner).get(&user) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn finish(&self, user: UserId) {
        lock(&self.inner).remove(&user);
    }
}

/// Quantity reply: digits only, at least one.
pub fn parse_quantity(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<u32>().ok().filter(|n| *n >= 1)
}

/// Run one transfer, reporting progress and the summary into the source chat.
pub async fn run_single(
    platform: Arc<dyn ChatPlatform>,
    pending: &PendingTransfer,
    requester: UserId,
    count: u32,
    timing: &TransferTiming,
    cancel: &CancellationToken,
    audit: Option<&AuditLogger>,
) -> Result<TransferResult> {
    let request = TransferRequest {
        requester,
        destination: pending.destination,
        start: pending.start,
        count,
    };

    let status = platform
        .send_text(pending.source, "🚀 <b>Processing...</b>")
        .await?;
    let progress = StatusProgress::new(platform.clone(), status);

    let source = ChatRef::from(pending.source);
    let result = RangeCopier::new(platform.as_ref(), timing.copy_cool_down, timing.progress_every)
        .run(&source, &request, cancel, &progress)
        .await?;

    if let Err(e) = platform.edit_text(status, &transfer_summary(&result)).await {
        debug!("summary edit failed: {e}");
    }
    if let Some(audit) = audit {
        audit.record(AuditEvent::transfer(
            requester,
            &source.to_string(),
            pending.destination.0,
            &result,
        ));
    }
    info!(
        user = requester.0,
        succeeded = result.succeeded,
        cancelled = result.cancelled,
        "single transfer finished"
    );
    Ok(result)
}
