//! Sliding-window event counter with prune-on-read semantics.

use super::RaidKind;
use std::sync::Mutex;

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Ordered timestamps (ms since epoch) within a trailing window.
/// After pruning, every entry is strictly newer than `now - window`;
/// an entry exactly at the boundary is dropped.
pub struct SlidingWindow {
    window_ms: u64,
    stamps: Vec<u64>,
}

impl SlidingWindow {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            stamps: Vec::new(),
        }
    }

    pub fn record(&mut self) {
        self.record_at(now_ms());
    }

    pub fn count(&mut self) -> usize {
        self.count_at(now_ms())
    }

    pub fn record_at(&mut self, now: u64) {
        self.stamps.push(now);
    }

    pub fn count_at(&mut self, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.window_ms);
        self.stamps.retain(|&t| t > cutoff);
        self.stamps.len()
    }

    pub fn reset(&mut self) {
        self.stamps.clear();
    }
}

/// One detector: a window, a threshold, and the raid kind it reports.
/// All window access happens under a single lock so record, count,
/// compare, and reset-on-trigger act as one unit even if events are
/// dispatched in parallel.
pub struct RaidDetector {
    kind: RaidKind,
    threshold: u32,
    window: Mutex<SlidingWindow>,
}

impl RaidDetector {
    pub fn new(kind: RaidKind, threshold: u32, window_ms: u64) -> Self {
        Self {
            kind,
            threshold,
            window: Mutex::new(SlidingWindow::new(window_ms)),
        }
    }

    pub fn kind(&self) -> RaidKind {
        self.kind
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record one event and report whether the threshold fired. On
    /// trigger the window is cleared, so the next trigger needs a fresh
    /// accumulation from zero.
    pub fn observe(&self) -> bool {
        self.observe_at(now_ms())
    }

    pub(crate) fn observe_at(&self, now: u64) -> bool {
        let mut w = self.window.lock().expect("detector lock poisoned");
        w.record_at(now);
        if w.count_at(now) >= self.threshold as usize {
            w.reset();
            true
        } else {
            false
        }
    }

    /// Current in-window count, for status reporting.
    pub fn in_window_count(&self) -> usize {
        self.window.lock().expect("detector lock poisoned").count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_prunes_strictly_older_entries() {
        let mut w = SlidingWindow::new(1000);
        w.record_at(1_000);
        w.record_at(1_500);
        w.record_at(2_000);
        // cutoff at 2000 - 1000 = 1000: the entry exactly at the
        // boundary is excluded.
        assert_eq!(w.count_at(2_000), 2);
        assert_eq!(w.count_at(2_600), 1);
        assert_eq!(w.count_at(3_100), 0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut w = SlidingWindow::new(60_000);
        for t in 0..10 {
            w.record_at(100 + t);
        }
        w.reset();
        assert_eq!(w.count_at(200), 0);
    }

    #[test]
    fn test_detector_fires_once_then_requires_fresh_accumulation() {
        let d = RaidDetector::new(RaidKind::ChannelDelete, 5, 10_000);
        let mut fired = 0;
        for i in 0..5 {
            if d.observe_at(1_000 + i) {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert_eq!(d.in_window_count(), 0);

        // A sixth event shortly after must not re-trigger.
        assert!(!d.observe_at(1_010));
        // Four more complete a fresh accumulation of five.
        for i in 0..3 {
            assert!(!d.observe_at(1_020 + i));
        }
        assert!(d.observe_at(1_030));
    }

    #[test]
    fn test_detector_ignores_events_outside_window() {
        let d = RaidDetector::new(RaidKind::Ban, 3, 1_000);
        assert!(!d.observe_at(1_000));
        assert!(!d.observe_at(1_100));
        // Third event arrives after the first two expired.
        assert!(!d.observe_at(5_000));
    }
}
