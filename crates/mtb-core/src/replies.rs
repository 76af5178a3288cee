//! Awaiting free-text replies from a user.
//!
//! The Telegram router feeds every incoming text through [`ReplyWaiters::deliver`]
//! first; if a wizard question is pending for that user the text answers it and is
//! not routed anywhere else.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::sync::oneshot;

use crate::domain::UserId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    TimedOut,
}

/// A registered interest in the next text message of one user.
pub struct PendingReply {
    rx: oneshot::Receiver<String>,
}

impl PendingReply {
    pub fn new(rx: oneshot::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Wait at most `timeout` for the reply.
    ///
    /// A waiter that was superseded (sender dropped) counts as no reply.
    pub async fn wait(self, timeout: Duration) -> Reply {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(text)) => Reply::Text(text),
            Ok(Err(_)) => {
                tracing::debug!("reply waiter dropped before an answer arrived");
                Reply::TimedOut
            }
            Err(_) => Reply::TimedOut,
        }
    }
}

/// Source of user replies for interactive flows.
pub trait ReplySource: Send + Sync {
    /// Register for the next text from `user`. Call before sending the prompt so a
    /// fast answer cannot slip past.
    fn subscribe(&self, user: UserId) -> PendingReply;
}

/// In-memory registry of pending questions, one per user.
#[derive(Default)]
pub struct ReplyWaiters {
    pending: Mutex<HashMap<UserId, oneshot::Sender<String>>>,
}

impl ReplyWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand `text` to the waiter of `user`. Returns `false` when nobody is waiting,
    /// in which case the caller routes the message normally.
    pub fn deliver(&self, user: UserId, text: &str) -> bool {
        let tx = {
            let mut map = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            map.remove(&user)
        };
        match tx {
            Some(tx) => tx.send(text.to_string()).is_ok(),
            None => false,
        }
    }

    #[cfg(test)]
    fn is_waiting(&self, user: UserId) -> bool {
        let map = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(&user).map(|tx| !tx.is_closed()).unwrap_or(false)
    }
}

impl ReplySource for ReplyWaiters {
    fn subscribe(&self, user: UserId) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        let mut map = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, tx| !tx.is_closed());
        map.insert(user, tx);
        PendingReply::new(rx)
    }
}
