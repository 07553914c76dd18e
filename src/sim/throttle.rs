use std::collections::HashMap;

/// Sliding-window admission log, one list of instants per restaurant.
///
/// The unit of an "instant" is the caller's: the creation path feeds
/// wall-clock milliseconds, the in-tick planner feeds tick counts. Both
/// share the same limit. Every read compacts the log to the instants
/// within `[now - window, now]`; admission succeeds iff the compacted
/// count is under the limit, and the caller records the new instant once
/// the admitted work is persisted.
pub struct SlidingWindow {
    limit: usize,
    window: u64,
    log: HashMap<i64, Vec<u64>>,
}

impl SlidingWindow {
    pub fn new(limit: usize, window: u64) -> Self {
        Self {
            limit,
            window,
            log: HashMap::new(),
        }
    }

    /// Admissions for `key` within the window ending at `now`.
    pub fn count(&mut self, key: i64, now: u64) -> usize {
        let window = self.window;
        let entries = self.log.entry(key).or_default();
        entries.retain(|&t| now.saturating_sub(t) <= window && t <= now);
        entries.len()
    }

    /// Whether `key` still has budget at `now`.
    pub fn has_budget(&mut self, key: i64, now: u64) -> bool {
        self.count(key, now) < self.limit
    }

    /// Appends an admission. The limit was already enforced against a
    /// snapshot of the counts by the caller.
    pub fn record(&mut self, key: i64, instant: u64) {
        self.log.entry(key).or_default().push(instant);
    }

    /// Compacted per-key counts, for phases that work on a plain map.
    pub fn counts(&mut self, now: u64) -> HashMap<i64, usize> {
        let keys: Vec<i64> = self.log.keys().copied().collect();
        keys.into_iter()
            .map(|k| (k, self.count(k, now)))
            .filter(|&(_, n)| n > 0)
            .collect()
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admit(w: &mut SlidingWindow, key: i64, now: u64) -> bool {
        if !w.has_budget(key, now) {
            return false;
        }
        w.record(key, now);
        true
    }

    #[test]
    fn admits_up_to_limit_within_window() {
        let mut w = SlidingWindow::new(3, 30);
        assert!(admit(&mut w, 1, 10));
        assert!(admit(&mut w, 1, 11));
        assert!(admit(&mut w, 1, 12));
        assert!(!admit(&mut w, 1, 13), "fourth admission must be denied");
    }

    #[test]
    fn window_slides_and_old_admissions_expire() {
        let mut w = SlidingWindow::new(3, 30);
        for t in [1, 2, 3] {
            assert!(admit(&mut w, 7, t));
        }
        assert!(!admit(&mut w, 7, 20));

        // t=1 is 31 units old at now=32: outside [now-30, now].
        assert!(admit(&mut w, 7, 32));
        assert_eq!(w.count(7, 32), 3);
    }

    #[test]
    fn boundary_instant_is_still_inside_window() {
        let mut w = SlidingWindow::new(1, 30);
        w.record(5, 0);
        assert_eq!(w.count(5, 30), 1, "t=0 at now=30 is exactly on the edge");
        assert_eq!(w.count(5, 31), 0);
    }

    #[test]
    fn restaurants_are_throttled_independently() {
        let mut w = SlidingWindow::new(1, 30);
        assert!(admit(&mut w, 1, 5));
        assert!(admit(&mut w, 2, 5), "other key has its own budget");
        assert!(!admit(&mut w, 1, 6));
    }

    #[test]
    fn counts_reports_only_live_keys() {
        let mut w = SlidingWindow::new(3, 10);
        w.record(1, 0);
        w.record(2, 50);
        let counts = w.counts(55);
        assert_eq!(counts.get(&2), Some(&1));
        assert_eq!(counts.get(&1), None, "expired key is dropped");
    }

    #[test]
    fn clear_resets_all_logs() {
        let mut w = SlidingWindow::new(1, 30);
        w.record(1, 5);
        w.clear();
        assert!(w.has_budget(1, 5));
    }
}
