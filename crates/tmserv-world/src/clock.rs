//! Fixed-step tick accounting and the world day/night clock.

/// Report for one executed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Monotonic tick counter.
    pub tick_index: u64,
    /// How late this tick ran relative to its scheduled time.
    pub drift_ms: u64,
    /// Scheduled ticks dropped to catch up since the last report.
    pub skipped: u64,
}

/// Fixed-step tick scheduler state.
///
/// [`Self::poll`] fires at most one tick per call. If processing fell
/// behind by more than a full period, the missed targets are skipped, never
/// compressed: the simulation runs at most one step per poll and the
/// skipped count is surfaced as a metric.
#[derive(Debug)]
pub struct TickClock {
    tick_ms: u64,
    next_at_ms: u64,
    tick_index: u64,
    total_skipped: u64,
    last_drift_ms: u64,
}

impl TickClock {
    /// Create a clock with the given step, starting at `now_ms`.
    #[must_use]
    pub fn new(tick_ms: u64, now_ms: u64) -> Self {
        Self {
            tick_ms: tick_ms.max(1),
            next_at_ms: now_ms + tick_ms.max(1),
            tick_index: 0,
            total_skipped: 0,
            last_drift_ms: 0,
        }
    }

    /// Step duration in milliseconds.
    #[must_use]
    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    /// When the next tick is due.
    #[must_use]
    pub fn next_at_ms(&self) -> u64 {
        self.next_at_ms
    }

    /// Total ticks skipped for catch-up since start.
    #[must_use]
    pub fn total_skipped(&self) -> u64 {
        self.total_skipped
    }

    /// Drift of the most recent tick.
    #[must_use]
    pub fn last_drift_ms(&self) -> u64 {
        self.last_drift_ms
    }

    /// Fire the tick if due. Returns `None` when it is not time yet.
    pub fn poll(&mut self, now_ms: u64) -> Option<TickReport> {
        if now_ms < self.next_at_ms {
            return None;
        }

        let drift_ms = now_ms - self.next_at_ms;
        self.last_drift_ms = drift_ms;
        self.tick_index += 1;

        // Skip whole missed periods; the next target is always in the
        // future relative to `now_ms`.
        let mut skipped = 0;
        self.next_at_ms += self.tick_ms;
        while self.next_at_ms <= now_ms {
            self.next_at_ms += self.tick_ms;
            skipped += 1;
        }
        self.total_skipped += skipped;

        Some(TickReport { tick_index: self.tick_index, drift_ms, skipped })
    }
}

/// Phase of the in-game day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DayPhase {
    /// Daytime; day-gated spawn groups are active.
    Day,
    /// Nighttime; night-gated spawn groups are active.
    Night,
}

/// In-game day/night cycle derived from wall-clock time.
///
/// One game day lasts `day_len_secs` real seconds; the first two thirds
/// are day, the rest night.
#[derive(Debug, Clone, Copy)]
pub struct WorldClock {
    day_len_secs: u64,
}

impl WorldClock {
    /// Default game-day length: two real hours.
    pub const DEFAULT_DAY_LEN_SECS: u64 = 7200;

    /// Create a clock with the given game-day length.
    #[must_use]
    pub fn new(day_len_secs: u64) -> Self {
        Self { day_len_secs: day_len_secs.max(3) }
    }

    /// Phase at the given wall-clock time.
    #[must_use]
    pub fn phase(&self, wall_secs: u64) -> DayPhase {
        let at = wall_secs % self.day_len_secs;
        if at < self.day_len_secs * 2 / 3 { DayPhase::Day } else { DayPhase::Night }
    }
}

impl Default for WorldClock {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DAY_LEN_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_fire_on_schedule() {
        let mut clock = TickClock::new(100, 0);

        assert_eq!(clock.poll(50), None);
        let report = clock.poll(100).expect("due at 100");
        assert_eq!(report.tick_index, 1);
        assert_eq!(report.drift_ms, 0);
        assert_eq!(report.skipped, 0);

        assert_eq!(clock.poll(150), None);
        assert!(clock.poll(200).is_some());
    }

    #[test]
    fn late_tick_reports_drift() {
        let mut clock = TickClock::new(100, 0);
        let report = clock.poll(130).expect("due");
        assert_eq!(report.drift_ms, 30);
        assert_eq!(clock.next_at_ms(), 200);
    }

    #[test]
    fn missed_periods_are_skipped_not_compressed() {
        let mut clock = TickClock::new(100, 0);

        // Stalled for 450 ms: targets 100, 200, 300, 400 all passed. One
        // tick fires, targets 200..400 are skipped, next is 500.
        let report = clock.poll(450).expect("due");
        assert_eq!(report.tick_index, 1);
        assert_eq!(report.skipped, 3);
        assert_eq!(clock.next_at_ms(), 500);

        // Only one more fires at 500, not a burst.
        assert!(clock.poll(500).is_some());
        assert_eq!(clock.poll(510), None);
        assert_eq!(clock.total_skipped(), 3);
    }

    #[test]
    fn day_night_split_is_two_thirds() {
        let clock = WorldClock::new(900);
        assert_eq!(clock.phase(0), DayPhase::Day);
        assert_eq!(clock.phase(599), DayPhase::Day);
        assert_eq!(clock.phase(600), DayPhase::Night);
        assert_eq!(clock.phase(899), DayPhase::Night);
        assert_eq!(clock.phase(900), DayPhase::Day);
    }
}
