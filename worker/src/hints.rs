//! Usage-pattern detector for `cdp_call`.
//!
//! Raw CDP passthrough is a power tool; when a client keeps reaching for
//! the same low-level method, a one-line hint points at the higher-level
//! command that covers it. Hints only start once a method crosses its
//! pattern threshold and stop after a fixed number of repeats, so they
//! taper off instead of spamming every call.

use std::collections::HashMap;

struct HintPattern {
    method: &'static str,
    threshold: u32,
    hint: &'static str,
}

const PATTERNS: &[HintPattern] = &[
    HintPattern {
        method: "Runtime.evaluate",
        threshold: 5,
        hint: "repeated Runtime.evaluate calls; `pagetap query <selector>` covers most DOM lookups",
    },
    HintPattern {
        method: "Network.getResponseBody",
        threshold: 3,
        hint: "`pagetap details <id>` already includes fetched response bodies",
    },
    HintPattern {
        method: "DOM.getDocument",
        threshold: 3,
        hint: "`pagetap query <selector>` handles document traversal for you",
    },
];

const MAX_REPEATS_PER_PATTERN: u32 = 2;

#[derive(Default)]
pub struct UsageHints {
    counts: HashMap<&'static str, u32>,
    emitted: HashMap<&'static str, u32>,
}

impl UsageHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one use of `method`; returns the hint to attach to this
    /// response, if any.
    pub fn observe(&mut self, method: &str) -> Option<&'static str> {
        let pattern = PATTERNS.iter().find(|p| p.method == method)?;
        let count = self.counts.entry(pattern.method).or_insert(0);
        *count += 1;
        if *count < pattern.threshold {
            return None;
        }
        let emitted = self.emitted.entry(pattern.method).or_insert(0);
        if *emitted >= MAX_REPEATS_PER_PATTERN {
            return None;
        }
        *emitted += 1;
        Some(pattern.hint)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn hints_start_at_the_threshold_and_stop_at_the_cap() {
        let mut hints = UsageHints::new();
        let mut emitted = Vec::new();
        for _ in 0..10 {
            emitted.push(hints.observe("Network.getResponseBody").is_some());
        }
        // Threshold 3, repeat cap 2: calls 3 and 4 hint, nothing after.
        assert_eq!(
            vec![false, false, true, true, false, false, false, false, false, false],
            emitted
        );
    }

    #[test]
    fn unpatterned_methods_never_hint() {
        let mut hints = UsageHints::new();
        for _ in 0..50 {
            assert_eq!(None, hints.observe("Page.navigate"));
        }
    }

    #[test]
    fn patterns_count_independently() {
        let mut hints = UsageHints::new();
        for _ in 0..4 {
            hints.observe("Runtime.evaluate");
        }
        // Runtime.evaluate threshold is 5; a different pattern crossing
        // its own threshold does not bleed over.
        assert!(hints.observe("DOM.getDocument").is_none());
        assert!(hints.observe("DOM.getDocument").is_none());
        assert!(hints.observe("DOM.getDocument").is_some());
        assert!(hints.observe("Runtime.evaluate").is_some());
    }
}
