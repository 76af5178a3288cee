//! User-facing status texts (Telegram HTML subset).

use crate::domain::TransferResult;
use crate::wizard::Slot;

/// Escape HTML special characters.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn progress_text(processed: u32, total: u32, succeeded: u32) -> String {
    format!("🔄 <b>Progress:</b> {processed}/{total}\n✅ Copied: {succeeded}")
}

pub fn transfer_summary(result: &TransferResult) -> String {
    let head = if result.cancelled {
        "🛑 <b>Transfer stopped</b>"
    } else {
        "✅ <b>Task completed!</b>"
    };
    format!(
        "{head}\n\n🎯 Requested: {}\n📂 Copied: {}\n⏩ Skipped: {}\n❌ Failed: {}",
        result.requested, result.succeeded, result.skipped, result.failed
    )
}

pub fn slot_queue_summary(slots: &[Slot]) -> String {
    let lines = slots
        .iter()
        .enumerate()
        .map(|(idx, slot)| format!("• Slot {}: {} msgs", idx + 1, slot.count()))
        .collect::<Vec<_>>()
        .join("\n");
    format!("✅ Multi-batch queued!\n\n{lines}\n\n▶️ Starting Slot 1 now...")
}

pub fn slot_start_text(index: usize, total: usize, slot: &Slot) -> String {
    format!(
        "▶️ Starting Slot {index}/{total}\n• Link: {}\n• Messages: {}",
        escape_html(slot.link()),
        slot.count()
    )
}
