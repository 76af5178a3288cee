//! Batch-runner adapter.
//!
//! A batch runner is an opaque single-batch routine whose accepted parameter shape is
//! not known up front. The adapter walks [`CANDIDATE_SHAPES`] from most to least
//! specific and uses the first shape the runner accepts. A runner rejects a shape
//! with [`InvokeError::SignatureMismatch`]; any other failure from an accepted shape is
//! returned to the caller as-is and no further shapes are tried.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    audit::{AuditEvent, AuditLogger},
    config::TransferTiming,
    domain::{ChatId, RequestContext, TransferRequest, TransferResult, UserId},
    errors::Error,
    formatting::{escape_html, transfer_summary},
    link::parse_message_link,
    messaging::port::ChatPlatform,
    transfer::engine::{ProgressSink, RangeCopier, StatusProgress},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallShape {
    WithSecondary,
    WithRequester,
    WithContext,
    LinkOnly,
}

impl CallShape {
    pub fn describe(self) -> &'static str {
        match self {
            CallShape::WithSecondary => "(secondary, primary, requester, link, count)",
            CallShape::WithRequester => "(primary, requester, link, count)",
            CallShape::WithContext => "(primary, context, link, count)",
            CallShape::LinkOnly => "(primary, link, count)",
        }
    }
}

/// Tried in this order.
pub const CANDIDATE_SHAPES: [CallShape; 4] = [
    CallShape::WithSecondary,
    CallShape::WithRequester,
    CallShape::WithContext,
    CallShape::LinkOnly,
];

/// Arguments of one invocation attempt, tagged by shape.
pub enum RunnerCall<'a> {
    WithSecondary {
        secondary: &'a Arc<dyn ChatPlatform>,
        primary: &'a Arc<dyn ChatPlatform>,
        requester: UserId,
        link: &'a str,
        count: u32,
    },
    WithRequester {
        primary: &'a Arc<dyn ChatPlatform>,
        requester: UserId,
        link: &'a str,
        count: u32,
    },
    WithContext {
        primary: &'a Arc<dyn ChatPlatform>,
        context: &'a RequestContext,
        link: &'a str,
        count: u32,
    },
    LinkOnly {
        primary: &'a Arc<dyn ChatPlatform>,
        link: &'a str,
        count: u32,
    },
}

impl RunnerCall<'_> {
    pub fn shape(&self) -> CallShape {
        match self {
            RunnerCall::WithSecondary { .. } => CallShape::WithSecondary,
            RunnerCall::WithRequester { .. } => CallShape::WithRequester,
            RunnerCall::WithContext { .. } => CallShape::WithContext,
            RunnerCall::LinkOnly { .. } => CallShape::LinkOnly,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("call shape not accepted by runner")]
    SignatureMismatch,
    #[error(transparent)]
    Failed(#[from] Error),
}

#[async_trait]
pub trait BatchRunner: Send + Sync {
    async fn invoke(&self, call: RunnerCall<'_>) -> std::result::Result<TransferResult, InvokeError>;
}

/// Clients handed to the runner. The secondary one is optional.
#[derive(Clone)]
pub struct PlatformClients {
    pub primary: Arc<dyn ChatPlatform>,
    pub secondary: Option<Arc<dyn ChatPlatform>>,
}

pub async fn invoke_batch_runner(
    runner: &dyn BatchRunner,
    clients: &PlatformClients,
    context: &RequestContext,
    link: &str,
    count: u32,
) -> Result<TransferResult> {
    let primary = &clients.primary;
    for shape in CANDIDATE_SHAPES {
        let call = match shape {
            CallShape::WithSecondary => {
                let Some(secondary) = clients.secondary.as_ref() else {
                    continue;
                };
                RunnerCall::WithSecondary {
                    secondary,
                    primary,
                    requester: context.requester,
                    link,
                    count,
                }
            }
            CallShape::WithRequester => RunnerCall::WithRequester {
                primary,
                requester: context.requester,
                link,
                count,
            },
            CallShape::WithContext => RunnerCall::WithContext {
                primary,
                context,
                link,
                count,
            },
            CallShape::LinkOnly => RunnerCall::LinkOnly {
                primary,
                link,
                count,
            },
        };

        match runner.invoke(call).await {
            Ok(result) => return Ok(result),
            Err(InvokeError::SignatureMismatch) => {
                debug!(shape = shape.describe(), "batch runner rejected call shape");
            }
            Err(InvokeError::Failed(e)) => return Err(e),
        }
    }

    let tried = CANDIDATE_SHAPES
        .iter()
        .map(|s| s.describe())
        .collect::<Vec<_>>()
        .join(", ");
    Err(Error::AdapterExhausted(tried))
}

/// Default runner: the id-range engine, delivering into a fixed destination or the
/// requester's private chat.
pub struct RangeBatchRunner {
    destination: Option<ChatId>,
    timing: TransferTiming,
    audit: Option<Arc<AuditLogger>>,
}

impl RangeBatchRunner {
    pub fn new(
        destination: Option<ChatId>,
        timing: TransferTiming,
        audit: Option<Arc<AuditLogger>>,
    ) -> Self {
        Self {
            destination,
            timing,
            audit,
        }
    }

    async fn run(
        &self,
        platform: &Arc<dyn ChatPlatform>,
        requester: UserId,
        link: &str,
        count: u32,
    ) -> Result<TransferResult> {
        // Private chat id == user id.
        let report_chat = ChatId(requester.0);

        let Some(parsed) = parse_message_link(link) else {
            warn!(link, "unrecognised message link, skipping batch");
            let notice = format!(
                "⚠️ Could not read link <code>{}</code>, skipping this batch.",
                escape_html(link)
            );
            if let Err(e) = platform.send_text(report_chat, &notice).await {
                debug!("notice send failed: {e}");
            }
            let mut result = TransferResult::new(count);
            result.skipped = count;
            return Ok(result);
        };

        let destination = self.destination.unwrap_or(report_chat);
        let request = TransferRequest {
            requester,
            destination,
            start: parsed.message,
            count,
        };

        let heading = format!(
            "🚀 <b>Processing...</b>\nCopying {count} messages from {}",
            escape_html(&parsed.chat.to_string())
        );
        let status = match platform.send_text(report_chat, &heading).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(link, "status message failed, copying without progress: {e}");
                None
            }
        };
        let progress: Box<dyn ProgressSink> = match status {
            Some(status) => Box::new(StatusProgress::new(platform.clone(), status)),
            None => Box::new(()),
        };

        // Slots are not interrupted mid-range; cancellation happens between slots.
        let result = RangeCopier::new(
            platform.as_ref(),
            self.timing.copy_cool_down,
            self.timing.progress_every,
        )
        .run(&parsed.chat, &request, &CancellationToken::new(), progress.as_ref())
        .await?;

        if let Some(status) = status {
            if let Err(e) = platform.edit_text(status, &transfer_summary(&result)).await {
                debug!("summary edit failed: {e}");
            }
        }
        if let Some(audit) = &self.audit {
            audit.record(AuditEvent::transfer(
                requester,
                &parsed.chat.to_string(),
                destination.0,
                &result,
            ));
        }
        info!(link, succeeded = result.succeeded, "batch finished");
        Ok(result)
    }
}

#[async_trait]
impl BatchRunner for RangeBatchRunner {
    async fn invoke(&self, call: RunnerCall<'_>) -> std::result::Result<TransferResult, InvokeError> {
        let (primary, requester, link, count) = match call {
            RunnerCall::WithRequester {
                primary,
                requester,
                link,
                count,
            } => (primary, requester, link, count),
            RunnerCall::WithContext {
                primary,
                context,
                link,
                count,
            } => (primary, context.requester, link, count),
            _ => return Err(InvokeError::SignatureMismatch),
        };
        Ok(self.run(primary, requester, link, count).await?)
    }
}
