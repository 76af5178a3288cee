use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, ChatRef, MessageId, MessageRef, SourceMessage},
    messaging::port::ChatPlatform,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* Telegram API calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per chat (Telegram 1 msg/sec style limits).
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// ChatPlatform decorator that spaces outbound calls.
///
/// Peeks only take the global slot; writes (copy/send/edit) also take a
/// per-destination slot. Fetches are writes into the probe chat when one is set (see
/// [`ThrottledPlatform::with_probe_chat`]). This reduces 429s but does not rule them
/// out, the adapter still honours `RetryAfter`.
pub struct ThrottledPlatform {
    inner: Arc<dyn ChatPlatform>,
    cfg: ThrottleConfig,
    probe_chat: Option<ChatId>,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledPlatform {
    pub fn new(inner: Arc<dyn ChatPlatform>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            probe_chat: None,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    /// Space fetches like writes to `chat`, for platforms that read by posting there.
    pub fn with_probe_chat(mut self, chat: Option<ChatId>) -> Self {
        self.probe_chat = chat;
        self
    }

    async fn limiter_for_chat(&self, chat_id: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_chat(&self, chat_id: i64) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat_id).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = { self.global.lock().await.reserve() };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl ChatPlatform for ThrottledPlatform {
    async fn fetch_message(&self, chat: &ChatRef, id: MessageId) -> Result<Option<SourceMessage>> {
        match self.probe_chat {
            Some(probe) => self.throttle_chat(probe.0).await,
            None => self.throttle_global().await,
        }
        self.inner.fetch_message(chat, id).await
    }

    async fn peek_message(&self, chat: &ChatRef, id: MessageId) -> Result<()> {
        self.throttle_global().await;
        self.inner.peek_message(chat, id).await
    }

    async fn copy_message(
        &self,
        source: &SourceMessage,
        destination: ChatId,
        caption: Option<&str>,
    ) -> Result<()> {
        self.throttle_chat(destination.0).await;
        self.inner.copy_message(source, destination, caption).await
    }

    async fn send_text(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.throttle_chat(chat_id.0).await;
        self.inner.send_text(chat_id, html).await
    }

    async fn edit_text(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.throttle_chat(msg.chat_id.0).await;
        self.inner.edit_text(msg, html).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlatform;

    #[tokio::test(start_paused = true)]
    async fn spaces_writes_to_the_same_chat() {
        let fake = Arc::new(FakePlatform::new());
        let throttled = ThrottledPlatform::new(fake.clone(), ThrottleConfig::default());

        let started = Instant::now();
        throttled.send_text(ChatId(1), "a").await.unwrap();
        throttled.send_text(ChatId(1), "b").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(1050));

        // A different chat only waits for the global slot.
        let before = Instant::now();
        throttled.send_text(ChatId(2), "c").await.unwrap();
        assert!(before.elapsed() < Duration::from_millis(1050));

        assert_eq!(fake.sent_texts(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_through_a_probe_chat_are_spaced_like_writes() {
        let fake = Arc::new(FakePlatform::new());
        let throttled = ThrottledPlatform::new(fake.clone(), ThrottleConfig::default())
            .with_probe_chat(Some(ChatId(99)));
        let src = ChatRef::Handle("src".to_string());

        let started = Instant::now();
        for id in 1..=3 {
            throttled.fetch_message(&src, MessageId(id)).await.unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(2 * 1050));

        let times: Vec<Instant> = fake.events().into_iter().map(|(t, _)| t).collect();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(1050));
        }

        // Status messages into the probe chat share the same budget.
        let before = Instant::now();
        throttled.send_text(ChatId(99), "x").await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_without_a_probe_chat_only_take_the_global_slot() {
        let fake = Arc::new(FakePlatform::new());
        let throttled = ThrottledPlatform::new(fake, ThrottleConfig::default());
        let src = ChatRef::Handle("src".to_string());

        let started = Instant::now();
        for id in 1..=3 {
            throttled.fetch_message(&src, MessageId(id)).await.unwrap();
        }
        assert!(started.elapsed() < Duration::from_millis(1050));
    }
}
