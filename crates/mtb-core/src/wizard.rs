//! Slot collection wizard.
//!
//! One question at a time: how many slots, then a link and a message count per slot.
//! The state machine is pure ([`SlotWizard`]); [`collect_slots`] drives it over the
//! chat platform, waiting for each answer with a timeout.

use std::fmt;

use tracing::info;

use crate::{
    config::TransferTiming,
    domain::{ChatId, UserId},
    messaging::port::ChatPlatform,
    orchestrator::OrchestratorState,
    replies::{Reply, ReplySource},
    Result,
};

/// One booked batch: a start link and how many consecutive messages to copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    link: String,
    count: u32,
}

impl Slot {
    /// `None` when `count` is zero.
    pub fn new(link: impl Into<String>, count: u32) -> Option<Self> {
        if count == 0 {
            return None;
        }
        Some(Self {
            link: link.into(),
            count,
        })
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    SlotCountNotNumber,
    SlotCountOutOfRange { max: u32 },
    MessageCountNotNumber,
    MessageCountTooSmall,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::SlotCountNotNumber => {
                write!(f, "❌ Please send a number (example: 3). Run /multibatch again.")
            }
            RejectReason::SlotCountOutOfRange { max } => {
                write!(f, "❌ Slots must be between 1 and {max}. Run /multibatch again.")
            }
            RejectReason::MessageCountNotNumber => {
                write!(f, "❌ Message count must be a number. Run /multibatch again.")
            }
            RejectReason::MessageCountTooSmall => {
                write!(f, "❌ Message count must be >= 1. Run /multibatch again.")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WizardState {
    AwaitingSlotCount,
    AwaitingLink { index: u32, total: u32 },
    AwaitingCount { index: u32, total: u32, link: String },
    Collected,
    TimedOut,
    Cancelled,
    Rejected(RejectReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WizardOutcome {
    Collected(Vec<Slot>),
    TimedOut,
    Cancelled,
    Rejected(RejectReason),
}

#[derive(Debug)]
pub struct SlotWizard {
    max_slots: u32,
    state: WizardState,
    slots: Vec<Slot>,
}

impl SlotWizard {
    pub fn new(max_slots: u32) -> Self {
        Self {
            max_slots,
            state: WizardState::AwaitingSlotCount,
            slots: Vec::new(),
        }
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    /// Question for the current state; `None` once terminal.
    pub fn prompt(&self) -> Option<String> {
        match &self.state {
            WizardState::AwaitingSlotCount => Some(format!(
                "How many slots do you want to book? (1-{})\n\nSend /cancelmultibatch to stop anytime.",
                self.max_slots
            )),
            WizardState::AwaitingLink { index, .. } => {
                Some(format!("Slot {index}: ✅ Send batch link"))
            }
            WizardState::AwaitingCount { index, .. } => {
                Some(format!("Slot {index}: ✅ How many messages?"))
            }
            _ => None,
        }
    }

    pub fn accept(&mut self, reply: &str) {
        let reply = reply.trim();
        if self.prompt().is_none() {
            return;
        }
        // Any command aborts the wizard.
        if reply.starts_with('/') {
            self.cancel();
            return;
        }

        let next = match std::mem::replace(&mut self.state, WizardState::Collected) {
            WizardState::AwaitingSlotCount => match reply.parse::<i64>() {
                Err(_) => WizardState::Rejected(RejectReason::SlotCountNotNumber),
                Ok(n) if n < 1 || n > i64::from(self.max_slots) => {
                    WizardState::Rejected(RejectReason::SlotCountOutOfRange {
                        max: self.max_slots,
                    })
                }
                Ok(n) => WizardState::AwaitingLink {
                    index: 1,
                    total: n as u32,
                },
            },
            WizardState::AwaitingLink { index, total } => WizardState::AwaitingCount {
                index,
                total,
                link: reply.to_string(),
            },
            WizardState::AwaitingCount { index, total, link } => {
                match parse_message_count(reply) {
                    Err(reason) => WizardState::Rejected(reason),
                    Ok(count) => {
                        if let Some(slot) = Slot::new(link, count) {
                            self.slots.push(slot);
                        }
                        if index >= total {
                            WizardState::Collected
                        } else {
                            WizardState::AwaitingLink {
                                index: index + 1,
                                total,
                            }
                        }
                    }
                }
            }
            terminal => terminal,
        };
        if matches!(next, WizardState::Rejected(_)) {
            self.slots.clear();
        }
        self.state = next;
    }

    pub fn time_out(&mut self) {
        if self.prompt().is_some() {
            self.state = WizardState::TimedOut;
            self.slots.clear();
        }
    }

    pub fn cancel(&mut self) {
        if self.prompt().is_some() {
            self.state = WizardState::Cancelled;
            self.slots.clear();
        }
    }

    pub fn into_outcome(self) -> WizardOutcome {
        match self.state {
            WizardState::Collected => WizardOutcome::Collected(self.slots),
            WizardState::Rejected(r) => WizardOutcome::Rejected(r),
            WizardState::Cancelled => WizardOutcome::Cancelled,
            // Unfinished counts as timed out.
            _ => WizardOutcome::TimedOut,
        }
    }
}

fn parse_message_count(reply: &str) -> std::result::Result<u32, RejectReason> {
    let n = reply
        .parse::<i64>()
        .map_err(|_| RejectReason::MessageCountNotNumber)?;
    if n < 1 {
        return Err(RejectReason::MessageCountTooSmall);
    }
    u32::try_from(n).map_err(|_| RejectReason::MessageCountNotNumber)
}

/// Ask the requester for their slots, one question at a time.
///
/// A cancellation request for the requester is honoured before each link question.
pub async fn collect_slots(
    platform: &dyn ChatPlatform,
    replies: &dyn ReplySource,
    state: &OrchestratorState,
    requester: UserId,
    chat: ChatId,
    timing: &TransferTiming,
) -> Result<WizardOutcome> {
    let mut wizard = SlotWizard::new(timing.max_slots);

    while let Some(prompt) = wizard.prompt() {
        if matches!(wizard.state(), WizardState::AwaitingLink { .. })
            && state.is_cancelled(requester)
        {
            wizard.cancel();
            break;
        }

        let pending = replies.subscribe(requester);
        platform.send_text(chat, &prompt).await?;
        match pending.wait(timing.ask_timeout).await {
            Reply::Text(text) => wizard.accept(&text),
            Reply::TimedOut => {
                info!(user = requester.0, "slot wizard timed out");
                wizard.time_out();
            }
        }
    }

    Ok(wizard.into_outcome())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePlatform, ScriptedReplies};
    use std::time::Duration;
    use tokio::time::Instant;

    fn drive(answers: &[&str]) -> SlotWizard {
        let mut w = SlotWizard::new(10);
        for a in answers {
            w.accept(a);
        }
        w
    }

    #[test]
    fn slot_count_bounds() {
        for bad in ["0", "11", "abc", "-3", ""] {
            let w = drive(&[bad]);
            assert!(
                matches!(w.state(), WizardState::Rejected(_)),
                "input {bad:?} should be rejected"
            );
            assert!(w.prompt().is_none());
        }
        assert_eq!(
            *drive(&["10"]).state(),
            WizardState::AwaitingLink { index: 1, total: 10 }
        );
        assert_eq!(
            *drive(&[" 1 "]).state(),
            WizardState::AwaitingLink { index: 1, total: 1 }
        );
    }

    #[test]
    fn collects_slots_in_order() {
        let w = drive(&["2", "t.me/a/1", "5", "not-even-a-link", "3"]);
        assert_eq!(
            w.into_outcome(),
            WizardOutcome::Collected(vec![
                Slot::new("t.me/a/1", 5).unwrap(),
                Slot::new("not-even-a-link", 3).unwrap(),
            ])
        );
    }

    #[test]
    fn command_reply_cancels_at_any_step() {
        for answers in [
            vec!["/stop"],
            vec!["2", "/cancelmultibatch"],
            vec!["2", "t.me/a/1", "/x"],
            vec!["2", "t.me/a/1", "4", "/multicancel"],
        ] {
            let w = drive(&answers);
            assert_eq!(w.into_outcome(), WizardOutcome::Cancelled);
        }
    }

    #[test]
    fn bad_message_counts_are_rejected() {
        assert_eq!(
            drive(&["1", "t.me/a/1", "0"]).into_outcome(),
            WizardOutcome::Rejected(RejectReason::MessageCountTooSmall)
        );
        assert_eq!(
            drive(&["1", "t.me/a/1", "many"]).into_outcome(),
            WizardOutcome::Rejected(RejectReason::MessageCountNotNumber)
        );
        // A rejection in slot 2 discards slot 1 as well.
        assert_eq!(
            drive(&["2", "t.me/a/1", "4", "t.me/a/9", "-1"]).into_outcome(),
            WizardOutcome::Rejected(RejectReason::MessageCountTooSmall)
        );
    }

    #[test]
    fn terminal_states_ignore_further_input() {
        let mut w = drive(&["abc"]);
        w.accept("3");
        w.time_out();
        assert_eq!(
            w.into_outcome(),
            WizardOutcome::Rejected(RejectReason::SlotCountNotNumber)
        );
    }

    #[test]
    fn reject_messages_mention_the_limit() {
        let text = RejectReason::SlotCountOutOfRange { max: 10 }.to_string();
        assert!(text.contains("between 1 and 10"));
    }

    #[tokio::test]
    async fn drives_prompts_over_the_platform() {
        let platform = FakePlatform::new();
        let replies = ScriptedReplies::new(&["1", "https://t.me/c/123/4", "7"]);
        let state = OrchestratorState::new();

        let out = collect_slots(
            &platform,
            &replies,
            &state,
            UserId(5),
            ChatId(5),
            &TransferTiming::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            out,
            WizardOutcome::Collected(vec![Slot::new("https://t.me/c/123/4", 7).unwrap()])
        );
        let sent = platform.sent_texts();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].starts_with("How many slots"));
        assert_eq!(sent[1], "Slot 1: ✅ Send batch link");
        assert_eq!(sent[2], "Slot 1: ✅ How many messages?");
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out_after_the_ask_window() {
        let platform = FakePlatform::new();
        let replies = ScriptedReplies::new(&["2", "t.me/a/1"]);
        let state = OrchestratorState::new();

        let started = Instant::now();
        let out = collect_slots(
            &platform,
            &replies,
            &state,
            UserId(5),
            ChatId(5),
            &TransferTiming::default(),
        )
        .await
        .unwrap();

        assert_eq!(out, WizardOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn cancel_flag_stops_collection_before_next_link() {
        let platform = FakePlatform::new();
        let replies = ScriptedReplies::new(&["3", "t.me/a/1", "2"]);
        let state = OrchestratorState::new();
        state.request_cancel(UserId(5));

        let out = collect_slots(
            &platform,
            &replies,
            &state,
            UserId(5),
            ChatId(5),
            &TransferTiming::default(),
        )
        .await
        .unwrap();

        assert_eq!(out, WizardOutcome::Cancelled);
        // Only the slot-count question went out.
        assert_eq!(platform.sent_texts().len(), 1);
    }
}
