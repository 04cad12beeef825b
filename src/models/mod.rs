//! Domain model module declarations.

pub mod execution;
pub mod intent;
pub mod message;
pub mod task;

/// Truncate `text` to at most `max_chars` characters, appending `...` when cut.
///
/// Operates on `char` boundaries so multi-byte content never splits.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
