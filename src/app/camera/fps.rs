use std::collections::HashMap;

pub fn stream_key(device_id: &str, stream_id: u32) -> String {
    format!("device_{device_id}_stream_{stream_id}")
}

/// Frames per second between two counter readings.
///
/// A counter that went backwards or a non-positive interval yields 0.
pub fn compute_fps(prev_frames: u64, prev_ms: i64, frames: u64, now_ms: i64) -> f64 {
    if frames < prev_frames {
        return 0.0;
    }
    let elapsed_ms = now_ms.saturating_sub(prev_ms);
    if elapsed_ms <= 0 {
        return 0.0;
    }
    (frames - prev_frames) as f64 * 1000.0 / elapsed_ms as f64
}

#[derive(Debug, Clone, Copy)]
struct FrameSample {
    frames: u64,
    at_ms: i64,
    last_poll: u64,
}

/// Last frame counter seen per stream, kept across polls.
///
/// Every parse is one poll. Keys not observed for more than `max_idle_polls` polls are
/// dropped by [`FpsTracker::evict_idle`].
#[derive(Debug, Clone)]
pub struct FpsTracker {
    samples: HashMap<String, FrameSample>,
    poll: u64,
    max_idle_polls: u32,
}

impl Default for FpsTracker {
    fn default() -> Self {
        Self::new(10)
    }
}

impl FpsTracker {
    pub fn new(max_idle_polls: u32) -> Self {
        Self {
            samples: HashMap::new(),
            poll: 0,
            max_idle_polls: max_idle_polls.max(1),
        }
    }

    pub fn begin_poll(&mut self) {
        self.poll = self.poll.saturating_add(1);
    }

    /// Records `frames` for `key` and returns the rate since the previous reading (0 on first sight).
    pub fn observe(&mut self, key: &str, frames: u64, now_ms: i64) -> f64 {
        let sample = FrameSample {
            frames,
            at_ms: now_ms,
            last_poll: self.poll,
        };
        match self.samples.insert(key.to_string(), sample) {
            Some(prev) => compute_fps(prev.frames, prev.at_ms, frames, now_ms),
            None => 0.0,
        }
    }

    /// Drops streams that disappeared. Returns how many entries were removed.
    pub fn evict_idle(&mut self) -> usize {
        let before = self.samples.len();
        let poll = self.poll;
        let limit = u64::from(self.max_idle_polls);
        self.samples
            .retain(|_, sample| poll.saturating_sub(sample.last_poll) <= limit);
        before - self.samples.len()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.samples.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_rate_from_deltas() {
        assert_eq!(compute_fps(100, 1_000, 160, 3_000), 30.0);
        assert_eq!(compute_fps(100, 1_000, 100, 3_000), 0.0);
        assert_eq!(compute_fps(100, 1_000, 90, 3_000), 0.0);
        assert_eq!(compute_fps(100, 3_000, 200, 3_000), 0.0);
        assert_eq!(compute_fps(100, 3_000, 200, 2_000), 0.0);
    }

    #[test]
    fn first_observation_is_zero_then_rate() {
        let mut tracker = FpsTracker::new(5);
        let key = stream_key("0", 1);
        assert_eq!(key, "device_0_stream_1");

        tracker.begin_poll();
        assert_eq!(tracker.observe(&key, 300, 10_000), 0.0);
        tracker.begin_poll();
        assert_eq!(tracker.observe(&key, 390, 13_000), 30.0);
        // Counter reset: zero, and the new reading becomes the baseline.
        tracker.begin_poll();
        assert_eq!(tracker.observe(&key, 10, 16_000), 0.0);
        tracker.begin_poll();
        assert_eq!(tracker.observe(&key, 70, 18_000), 30.0);
    }

    #[test]
    fn evicts_streams_that_stop_reporting() {
        let mut tracker = FpsTracker::new(2);
        tracker.begin_poll();
        tracker.observe("device_0_stream_0", 1, 0);
        tracker.observe("device_0_stream_1", 1, 0);

        for step in 1..=3 {
            tracker.begin_poll();
            tracker.observe("device_0_stream_0", 1 + step, step as i64 * 1000);
            tracker.evict_idle();
        }
        assert!(tracker.contains("device_0_stream_0"));
        assert!(!tracker.contains("device_0_stream_1"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn separate_trackers_do_not_share_state() {
        let mut a = FpsTracker::default();
        let mut b = FpsTracker::default();
        a.begin_poll();
        a.observe("k", 10, 0);
        b.begin_poll();
        assert_eq!(b.observe("k", 40, 1000), 0.0);
        assert!(!FpsTracker::default().contains("k"));
    }
}
