//! Article invariants shared by the read and write paths.

use time::OffsetDateTime;

pub const WORDS_PER_MINUTE: usize = 200;

/// Estimated reading time in whole minutes, rounded up.
///
/// Empty text reads in zero minutes; any non-empty text takes at least one.
pub fn reading_time_minutes(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    let minutes = words.div_ceil(WORDS_PER_MINUTE);
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

/// Resolve `published_at` for a write.
///
/// An explicit value always wins. Otherwise the timestamp is stamped exactly
/// once, on the transition from unpublished to published, and kept as-is on
/// every later write.
pub fn resolve_published_at(
    was_published: bool,
    now_published: bool,
    existing: Option<OffsetDateTime>,
    explicit: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> Option<OffsetDateTime> {
    if explicit.is_some() {
        return explicit;
    }
    if now_published && !was_published && existing.is_none() {
        return Some(now);
    }
    existing
}
