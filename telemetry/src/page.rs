//! Pagination over the completed arrays.

/// Half-open index window into an append-only list, newest entries last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    /// Entries older than the window remain unread.
    pub fn has_more(&self) -> bool {
        self.start > 0
    }
}

pub const DEFAULT_LAST_N: usize = 20;

/// Compute the `{start, end}` window for a `lastN`/`offset` request:
/// `offset` skips entries from the tail, then `lastN` bounds how many are
/// taken walking backwards.
pub fn window(total: usize, last_n: Option<usize>, offset: Option<usize>) -> Window {
    let end = total.saturating_sub(offset.unwrap_or(0));
    let start = end.saturating_sub(last_n.unwrap_or(DEFAULT_LAST_N));
    Window { start, end }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn window_takes_the_tail() {
        let w = window(100, Some(10), None);
        assert_eq!(Window { start: 90, end: 100 }, w);
        assert!(w.has_more());
    }

    #[test]
    fn offset_skips_from_the_tail() {
        let w = window(100, Some(10), Some(30));
        assert_eq!(Window { start: 60, end: 70 }, w);
    }

    #[test]
    fn window_clamps_to_available_entries() {
        let w = window(5, Some(10), None);
        assert_eq!(Window { start: 0, end: 5 }, w);
        assert!(!w.has_more());

        let w = window(5, Some(10), Some(20));
        assert_eq!(Window { start: 0, end: 0 }, w);
        assert!(!w.has_more());
    }
}
