use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::TagId;

/// Colours handed out to new tags, picked by tag id.
pub const TAG_PALETTE: &[&str] = &[
    "#3b82f6", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#ec4899", "#14b8a6", "#f97316",
];

/// A tag that questions can be filed under.
///
/// Names are unique case-insensitively; `usage_count` caches how many
/// questions link to the tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub usage_count: i64,
    pub color: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Normalises a user-entered tag name.
///
/// Trims, lowercases and joins internal whitespace runs with a single `-`.
///
/// # Examples
///
/// ```
/// use qna::normalize_tag;
///
/// assert_eq!(normalize_tag("  Machine   Learning "), "machine-learning");
/// assert_eq!(normalize_tag("Rust"), "rust");
/// ```
pub fn normalize_tag(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Colour assigned to the tag with the given id.
pub fn palette_color(id: TagId) -> &'static str {
    let index = id.get().rem_euclid(TAG_PALETTE.len() as i64) as usize;
    TAG_PALETTE[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize_tag("Rust"), "rust");
        assert_eq!(normalize_tag(" async  Await\t"), "async-await");
        assert_eq!(normalize_tag("   "), "");
    }

    #[test]
    fn normalize_keeps_existing_separators() {
        assert_eq!(normalize_tag("machine-learning"), "machine-learning");
        assert_eq!(normalize_tag("C++"), "c++");
    }

    #[test]
    fn palette_color_cycles_by_id() {
        assert_eq!(palette_color(TagId::new(0)), TAG_PALETTE[0]);
        assert_eq!(
            palette_color(TagId::new(TAG_PALETTE.len() as i64 + 1)),
            TAG_PALETTE[1]
        );
    }
}
