// Raw signal classification: reaction emoji and reply keywords.
//
// Chat adapters see reactions and short reply messages; this module turns
// them into scoring directions. Magnitudes come from the impact policy,
// never from here.

use crate::scoring::ScoreEventKind;

pub const POSITIVE_EMOJIS: [&str; 6] = ["👍", "❤", "🔥", "❤‍🔥", "😁", "🤣"];
pub const NEGATIVE_EMOJIS: [&str; 3] = ["👎", "🤡", "💩"];

pub const POSITIVE_KEYWORDS: [&str; 6] =
    ["+", "➕", "👍", "спасибо", "дякую", "спасибо большое"];
pub const NEGATIVE_KEYWORDS: [&str; 3] = ["-", "➖", "👎"];

/// Classify a reaction emoji. Emoji outside both sets carry no score.
pub fn classify_reaction(emoji: &str) -> Option<ScoreEventKind> {
    if POSITIVE_EMOJIS.contains(&emoji) {
        Some(ScoreEventKind::Positive)
    } else if NEGATIVE_EMOJIS.contains(&emoji) {
        Some(ScoreEventKind::Negative)
    } else {
        None
    }
}

/// Classify a reply message. Only exact keyword matches count, compared
/// case-insensitively after trimming; free text never scores.
pub fn classify_reply(text: &str) -> Option<ScoreEventKind> {
    let normalized = text.trim().to_lowercase();
    if POSITIVE_KEYWORDS.contains(&normalized.as_str()) {
        Some(ScoreEventKind::Positive)
    } else if NEGATIVE_KEYWORDS.contains(&normalized.as_str()) {
        Some(ScoreEventKind::Negative)
    } else {
        None
    }
}
