//! Sequential id-range copy engine.
//!
//! Ids are visited strictly in increasing order, one at a time. Every call that
//! reaches the platform for a media message (successful copy or failure) is followed
//! by a cool-down pause; skipped ids are not.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    domain::{ChatId, ChatRef, MessageId, MessageRef, TransferRequest, TransferResult},
    errors::Error,
    formatting::progress_text,
    messaging::port::ChatPlatform,
    Result,
};

/// Receives periodic progress of a running range. Display only.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn on_progress(&self, processed: u32, total: u32, succeeded: u32);
}

#[async_trait]
impl ProgressSink for () {
    async fn on_progress(&self, _processed: u32, _total: u32, _succeeded: u32) {}
}

/// Edits a status message in place; edit failures are ignored.
pub struct StatusProgress {
    platform: Arc<dyn ChatPlatform>,
    status: MessageRef,
}

impl StatusProgress {
    pub fn new(platform: Arc<dyn ChatPlatform>, status: MessageRef) -> Self {
        Self { platform, status }
    }
}

#[async_trait]
impl ProgressSink for StatusProgress {
    async fn on_progress(&self, processed: u32, total: u32, succeeded: u32) {
        let text = progress_text(processed, total, succeeded);
        if let Err(e) = self.platform.edit_text(self.status, &text).await {
            debug!("progress edit failed: {e}");
        }
    }
}

enum CopyOutcome {
    Copied,
    Skipped,
}

pub struct RangeCopier<'a> {
    platform: &'a dyn ChatPlatform,
    cool_down: Duration,
    progress_every: u32,
}

impl<'a> RangeCopier<'a> {
    pub fn new(platform: &'a dyn ChatPlatform, cool_down: Duration, progress_every: u32) -> Self {
        Self {
            platform,
            cool_down,
            progress_every: progress_every.max(1),
        }
    }

    /// Copy every media message in the request's range from `source`.
    ///
    /// Per-id failures are counted, never returned. The only error is a range that
    /// does not fit the id space, reported before anything is fetched.
    pub async fn run(
        &self,
        source: &ChatRef,
        request: &TransferRequest,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<TransferResult> {
        if request.last_id().is_none() {
            return Err(Error::InvalidRange {
                start: request.start.0,
                count: request.count,
            });
        }

        info!(
            source = %source,
            destination = request.destination.0,
            start = request.start.0,
            count = request.count,
            "starting range transfer"
        );

        let mut result = TransferResult::new(request.count);
        for offset in 0..request.count {
            if cancel.is_cancelled() {
                info!(processed = result.processed(), "range transfer cancelled");
                result.cancelled = true;
                break;
            }

            // In range: last_id() was checked above.
            let id = MessageId(request.start.0 + offset as i32);
            match self.copy_one(source, id, request.destination).await {
                Ok(CopyOutcome::Copied) => {
                    result.succeeded += 1;
                    debug!(id = id.0, "copied");
                    sleep(self.cool_down).await;
                }
                Ok(CopyOutcome::Skipped) => {
                    result.skipped += 1;
                    debug!(id = id.0, "skipped (no media or deleted)");
                }
                Err(e) => {
                    result.failed += 1;
                    warn!(id = id.0, "failed to copy message: {e}");
                    sleep(self.cool_down).await;
                }
            }

            let processed = offset + 1;
            if processed % self.progress_every == 0 {
                progress
                    .on_progress(processed, request.count, result.succeeded)
                    .await;
            }
        }

        info!(
            requested = result.requested,
            succeeded = result.succeeded,
            skipped = result.skipped,
            failed = result.failed,
            "range transfer finished"
        );
        Ok(result)
    }

    async fn copy_one(
        &self,
        source: &ChatRef,
        id: MessageId,
        destination: ChatId,
    ) -> Result<CopyOutcome> {
        let Some(msg) = self.platform.fetch_message(source, id).await? else {
            return Ok(CopyOutcome::Skipped);
        };
        if !msg.has_media() {
            return Ok(CopyOutcome::Skipped);
        }
        self.platform
            .copy_message(&msg, destination, msg.caption.as_deref())
            .await?;
        Ok(CopyOutcome::Copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use crate::testing::FakePlatform;
    use std::sync::Mutex;
    use tokio::time::Instant;

    const SRC: i64 = -10012345;

    fn request(start: i32, count: u32) -> TransferRequest {
        TransferRequest {
            requester: UserId(7),
            destination: ChatId(-100999),
            start: MessageId(start),
            count,
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        calls: Mutex<Vec<(u32, u32, u32)>>,
        cancel_at: Option<(u32, CancellationToken)>,
    }

    #[async_trait]
    impl ProgressSink for RecordingProgress {
        async fn on_progress(&self, processed: u32, total: u32, succeeded: u32) {
            self.calls.lock().unwrap().push((processed, total, succeeded));
            if let Some((at, tok)) = &self.cancel_at {
                if *at == processed {
                    tok.cancel();
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn visits_every_id_once_in_order_and_accounts_for_each() {
        let src = ChatRef::Id(SRC);
        let fake = FakePlatform::new()
            .with_media(src.clone(), 100, Some("first"))
            .with_text(src.clone(), 101)
            // 102 missing
            .with_media(src.clone(), 103, None)
            .failing_fetch(104)
            .with_media(src.clone(), 105, None)
            .failing_copy(105);

        let copier = RangeCopier::new(&fake, Duration::from_secs(2), 10);
        let res = copier
            .run(&src, &request(100, 6), &CancellationToken::new(), &())
            .await
            .unwrap();

        assert_eq!(fake.fetched_ids(), vec![100, 101, 102, 103, 104, 105]);
        assert_eq!(res.succeeded, 2);
        assert_eq!(res.skipped, 2);
        assert_eq!(res.failed, 2);
        assert_eq!(res.processed(), 6);
        assert!(!res.cancelled);

        let copies = fake.copies.lock().unwrap().clone();
        assert_eq!(
            copies,
            vec![
                (100, ChatId(-100999), Some("first".to_string())),
                (103, ChatId(-100999), None),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_after_copies_and_failures_but_not_skips() {
        let src = ChatRef::Id(SRC);
        let fake = FakePlatform::new()
            .with_media(src.clone(), 1, None)
            .with_text(src.clone(), 2)
            .failing_fetch(3);

        let started = Instant::now();
        RangeCopier::new(&fake, Duration::from_secs(2), 10)
            .run(&src, &request(1, 4), &CancellationToken::new(), &())
            .await
            .unwrap();

        // One copy + one failure = two cool-downs; the text and the missing id are free.
        assert_eq!(started.elapsed(), Duration::from_secs(4));

        let events = fake.events();
        let fetch3 = events.iter().find(|(_, e)| e.ends_with(" 3")).unwrap().0;
        let fetch2 = events.iter().find(|(_, e)| e == &format!("fetch {SRC} 2")).unwrap().0;
        assert_eq!(fetch2 - events[0].0, Duration::from_secs(2));
        assert_eq!(fetch3, fetch2);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_progress_every_tenth_id() {
        let src = ChatRef::Id(SRC);
        let mut fake = FakePlatform::new();
        for id in 1..=25 {
            fake = fake.with_media(src.clone(), id, None);
        }
        let progress = RecordingProgress::default();

        let res = RangeCopier::new(&fake, Duration::from_secs(2), 10)
            .run(&src, &request(1, 25), &CancellationToken::new(), &progress)
            .await
            .unwrap();

        assert_eq!(res.succeeded, 25);
        assert_eq!(
            progress.calls.lock().unwrap().clone(),
            vec![(10, 25, 10), (20, 25, 20)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_checked_before_each_id() {
        let src = ChatRef::Id(SRC);
        let cancel = CancellationToken::new();
        let fake = FakePlatform::new();
        let progress = RecordingProgress {
            cancel_at: Some((10, cancel.clone())),
            ..Default::default()
        };

        let res = RangeCopier::new(&fake, Duration::from_secs(2), 10)
            .run(&src, &request(1, 30), &cancel, &progress)
            .await
            .unwrap();

        assert!(res.cancelled);
        assert_eq!(fake.fetched_ids(), (1..=10).collect::<Vec<_>>());
        assert_eq!(res.skipped, 10);
    }

    #[tokio::test]
    async fn rejects_ranges_beyond_the_id_space() {
        let fake = FakePlatform::new();
        let err = RangeCopier::new(&fake, Duration::ZERO, 10)
            .run(
                &ChatRef::Id(SRC),
                &request(i32::MAX - 1, 5),
                &CancellationToken::new(),
                &(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidRange { count: 5, .. }));
        assert!(fake.fetched_ids().is_empty());
    }

    #[tokio::test]
    async fn status_progress_edits_the_status_message() {
        let fake = Arc::new(FakePlatform::new());
        let status = fake.send_text(ChatId(7), "start").await.unwrap();
        let sink = StatusProgress::new(fake.clone(), status);

        sink.on_progress(10, 40, 8).await;

        let edits = fake.edits.lock().unwrap().clone();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].0, status);
        assert!(edits[0].1.contains("10/40"));
    }
}
