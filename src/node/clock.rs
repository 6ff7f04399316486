use rand::Rng;

/// Maximum magnitude of the fixed drift sampled at startup
pub const MAX_DRIFT_MS: i64 = 10;

/// Current wall-clock time in Unix milliseconds.
pub fn wall_clock_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A simulated clock: wall clock plus a fixed drift plus an injected offset.
#[derive(Clone, Debug)]
pub struct VirtualClock {
    drift_ms: i64,
    offset_ms: i64,
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualClock {
    /// Sample the fixed drift uniformly from [-10, 10] ms.
    pub fn new() -> Self {
        let drift_ms = rand::thread_rng().gen_range(-MAX_DRIFT_MS..=MAX_DRIFT_MS);
        Self::with_drift(drift_ms)
    }

    pub fn with_drift(drift_ms: i64) -> Self {
        Self {
            drift_ms,
            offset_ms: 0,
        }
    }

    pub fn now_millis(&self) -> i64 {
        wall_clock_millis() + self.drift_ms + self.offset_ms
    }

    pub fn drift_ms(&self) -> i64 {
        self.drift_ms
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    pub fn set_offset(&mut self, offset_ms: i64) {
        self.offset_ms = offset_ms;
    }

    pub fn clear_offset(&mut self) {
        self.offset_ms = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drift_is_bounded() {
        for _ in 0..200 {
            let clock = VirtualClock::new();
            assert!(clock.drift_ms().abs() <= MAX_DRIFT_MS);
            assert_eq!(clock.offset_ms(), 0);
        }
    }

    #[test]
    fn test_offset_shifts_reading() {
        let mut clock = VirtualClock::with_drift(0);
        clock.set_offset(60_000);
        let delta = clock.now_millis() - wall_clock_millis();
        // allow for the wall clock ticking between the two reads
        assert!((59_990..=60_010).contains(&delta), "delta was {}", delta);

        clock.clear_offset();
        let delta = clock.now_millis() - wall_clock_millis();
        assert!(delta.abs() <= 10, "delta was {}", delta);
    }
}
