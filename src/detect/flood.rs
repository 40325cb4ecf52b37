//! Message-flood tracking, isolated per (guild, author) pair.

use super::window::SlidingWindow;
use std::collections::HashMap;
use std::sync::Mutex;

/// Map size at which idle pairs are swept out.
const PRUNE_HIGH_WATER: usize = 4096;

/// One sliding window per (guild, author). A trigger resets only the
/// firing pair; other authors' windows are untouched.
pub struct FloodTracker {
    window_ms: u64,
    threshold: u32,
    pairs: Mutex<HashMap<(String, String), SlidingWindow>>,
}

impl FloodTracker {
    pub fn new(threshold: u32, window_ms: u64) -> Self {
        Self {
            window_ms,
            threshold,
            pairs: Mutex::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record one message and report whether the author crossed the
    /// flood threshold within the window.
    pub fn observe(&self, guild_id: &str, author_id: &str) -> bool {
        self.observe_at(
            guild_id,
            author_id,
            chrono::Utc::now().timestamp_millis() as u64,
        )
    }

    pub(crate) fn observe_at(&self, guild_id: &str, author_id: &str, now: u64) -> bool {
        let mut pairs = self.pairs.lock().expect("flood lock poisoned");

        if pairs.len() >= PRUNE_HIGH_WATER {
            pairs.retain(|_, w| w.count_at(now) > 0);
        }

        let w = pairs
            .entry((guild_id.to_string(), author_id.to_string()))
            .or_insert_with(|| SlidingWindow::new(self.window_ms));
        w.record_at(now);
        if w.count_at(now) >= self.threshold as usize {
            w.reset();
            true
        } else {
            false
        }
    }

    /// Number of pairs with at least one in-window message.
    pub fn active_pairs(&self) -> usize {
        let mut pairs = self.pairs.lock().expect("flood lock poisoned");
        let now = chrono::Utc::now().timestamp_millis() as u64;
        pairs
            .values_mut()
            .map(|w| w.count_at(now))
            .filter(|&c| c > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_are_isolated() {
        let t = FloodTracker::new(25, 10_000);
        let mut fired_a = false;
        for i in 0..25 {
            fired_a |= t.observe_at("g", "alice", 1_000 + i);
        }
        // 24 messages from bob in the same window: no trigger.
        let mut fired_b = false;
        for i in 0..24 {
            fired_b |= t.observe_at("g", "bob", 1_000 + i);
        }
        assert!(fired_a);
        assert!(!fired_b);
    }

    #[test]
    fn test_trigger_resets_only_firing_pair() {
        let t = FloodTracker::new(3, 10_000);
        t.observe_at("g", "a", 1);
        t.observe_at("g", "a", 2);
        t.observe_at("g", "b", 3);
        assert!(t.observe_at("g", "a", 4));
        // a starts over; b keeps its in-window message.
        assert!(!t.observe_at("g", "a", 5));
        assert!(!t.observe_at("g", "b", 6));
        assert!(t.observe_at("g", "b", 7));
    }

    #[test]
    fn test_active_pairs_counts_only_in_window_authors() {
        let t = FloodTracker::new(25, 10_000);
        let now = chrono::Utc::now().timestamp_millis() as u64;
        t.observe_at("g", "a", now);
        t.observe_at("g", "b", now);
        // c's only message has already fallen out of the window.
        t.observe_at("g", "c", now.saturating_sub(60_000));
        assert_eq!(t.active_pairs(), 2);
    }

    #[test]
    fn test_same_author_different_guilds_are_distinct() {
        let t = FloodTracker::new(2, 10_000);
        assert!(!t.observe_at("g1", "a", 1));
        assert!(!t.observe_at("g2", "a", 2));
        assert!(t.observe_at("g1", "a", 3));
    }
}
