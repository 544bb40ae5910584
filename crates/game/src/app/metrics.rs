use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct TickMetricsSnapshot {
    pub(crate) tps: f32,
    pub(crate) tick_time_ms: f32,
    pub(crate) max_tick_time_ms: f32,
    pub(crate) events_per_tick: f32,
}

/// Rolling per-interval tick statistics for the headless loop.
#[derive(Debug)]
pub(crate) struct TickMetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    ticks: u32,
    events: u32,
    tick_time_sum: Duration,
    tick_time_max: Duration,
}

impl TickMetricsAccumulator {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval_start: now,
            interval,
            ticks: 0,
            events: 0,
            tick_time_sum: Duration::ZERO,
            tick_time_max: Duration::ZERO,
        }
    }

    pub(crate) fn record_tick(&mut self, tick_time: Duration, events: u32) {
        self.ticks = self.ticks.saturating_add(1);
        self.events = self.events.saturating_add(events);
        self.tick_time_sum = self.tick_time_sum.saturating_add(tick_time);
        self.tick_time_max = self.tick_time_max.max(tick_time);
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<TickMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }
        Some(self.take_snapshot(now, elapsed))
    }

    /// Snapshot whatever has accumulated, regardless of interval.
    pub(crate) fn flush(&mut self, now: Instant) -> Option<TickMetricsSnapshot> {
        if self.ticks == 0 {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.interval_start);
        Some(self.take_snapshot(now, elapsed))
    }

    fn take_snapshot(&mut self, now: Instant, elapsed: Duration) -> TickMetricsSnapshot {
        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let (tick_time_ms, events_per_tick) = if self.ticks == 0 {
            (0.0, 0.0)
        } else {
            (
                (self.tick_time_sum.as_secs_f32() / self.ticks as f32) * 1000.0,
                self.events as f32 / self.ticks as f32,
            )
        };

        let snapshot = TickMetricsSnapshot {
            tps: self.ticks as f32 / elapsed_seconds,
            tick_time_ms,
            max_tick_time_ms: self.tick_time_max.as_secs_f32() * 1000.0,
            events_per_tick,
        };

        self.interval_start = now;
        self.ticks = 0;
        self.events = 0;
        self.tick_time_sum = Duration::ZERO;
        self.tick_time_max = Duration::ZERO;

        snapshot
    }
}
