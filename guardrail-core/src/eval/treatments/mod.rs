//! Built-in treatments

mod baseline;
mod tool_calling;

pub use baseline::BaselineTreatment;
pub use tool_calling::ToolCallingTreatment;

/// Cut `text` to `max` characters, marking the cut
pub(crate) fn truncate_chars(mut text: String, max: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max) {
        text.truncate(idx);
        text.push_str("...[truncated]");
    }
    text
}
