//! Per-client health telemetry.
//!
//! Three small state holders, all driven by caller-supplied [`Instant`]s so
//! their behaviour is exactly reproducible in tests:
//!
//! - [`EventRateWindow`] – events routed to a client, counted in fixed windows.
//! - [`LatencyTracker`] – round-trip times of successful liveness probes.
//! - [`ProbeTracker`] – the outstanding probe and the consecutive-miss counter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of round trips averaged into the published latency.
pub const LATENCY_SAMPLES: usize = 8;

/// Fixed-window event counter.
///
/// Events are added to the *current* window.  The published rate is the count
/// of the *just-completed* window, so it only changes at window boundaries.
/// No smoothing is applied.
#[derive(Debug, Clone)]
pub struct EventRateWindow {
    window: Duration,
    window_start: Instant,
    current: u32,
    last_completed: u32,
}

impl EventRateWindow {
    /// Creates a counter whose first window starts at `now`.
    ///
    /// A zero `window` is bumped to one millisecond.
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window: window.max(Duration::from_millis(1)),
            window_start: now,
            current: 0,
            last_completed: 0,
        }
    }

    /// Adds `count` events observed at `now`.
    pub fn record(&mut self, count: u32, now: Instant) {
        self.advance(now);
        self.current = self.current.saturating_add(count);
    }

    /// Returns the count of the window that completed most recently before `now`.
    pub fn rate(&self, now: Instant) -> u32 {
        match self.windows_elapsed(now) {
            0 => self.last_completed,
            1 => self.current,
            _ => 0,
        }
    }

    /// Discards all counts and restarts the window at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.window_start = now;
        self.current = 0;
        self.last_completed = 0;
    }

    fn advance(&mut self, now: Instant) {
        let elapsed = self.windows_elapsed(now);
        if elapsed == 0 {
            return;
        }
        self.last_completed = if elapsed == 1 { self.current } else { 0 };
        self.current = 0;
        self.window_start += self.window * elapsed;
    }

    fn windows_elapsed(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.window_start);
        let n = elapsed.as_nanos() / self.window.as_nanos();
        u32::try_from(n).unwrap_or(u32::MAX)
    }
}

/// Rolling round-trip-time tracker.
///
/// Keeps the last [`LATENCY_SAMPLES`] round trips and publishes their mean, so
/// a single slow probe does not make the UI figure jump.
#[derive(Debug, Clone, Default)]
pub struct LatencyTracker {
    samples: VecDeque<Duration>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one successful round trip.
    pub fn record(&mut self, rtt: Duration) {
        if self.samples.len() == LATENCY_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(rtt);
    }

    /// The most recent round trip, if any.
    pub fn last(&self) -> Option<Duration> {
        self.samples.back().copied()
    }

    /// Mean of the retained samples in milliseconds, `0.0` when empty.
    pub fn rolling_ms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: Duration = self.samples.iter().sum();
        (total.as_secs_f64() * 1000.0 / self.samples.len() as f64) as f32
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// A probe that has been sent and not yet answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutstandingProbe {
    pub seq: u64,
    pub sent_at: Instant,
}

/// Liveness probe bookkeeping for one client.
///
/// At most one probe is outstanding at a time.  A probe that is not answered
/// within the timeout counts as one miss; any matching reply resets the miss
/// counter to zero.
#[derive(Debug, Clone, Default)]
pub struct ProbeTracker {
    next_seq: u64,
    outstanding: Option<OutstandingProbe>,
    consecutive_misses: u32,
}

impl ProbeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new probe sent at `now` and returns its sequence number.
    ///
    /// Returns `None` while a previous probe is still outstanding.
    pub fn start(&mut self, now: Instant) -> Option<u64> {
        if self.outstanding.is_some() {
            return None;
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.outstanding = Some(OutstandingProbe { seq, sent_at: now });
        Some(seq)
    }

    /// Counts the outstanding probe as missed when it is older than `timeout`.
    ///
    /// Returns `true` when a miss was recorded.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> bool {
        match self.outstanding {
            Some(probe) if now.saturating_duration_since(probe.sent_at) >= timeout => {
                self.outstanding = None;
                self.consecutive_misses = self.consecutive_misses.saturating_add(1);
                true
            }
            _ => false,
        }
    }

    /// Matches a reply against the outstanding probe.
    ///
    /// Returns the round-trip time for a matching reply.  Replies for unknown
    /// or already-expired sequence numbers are ignored and return `None`.
    pub fn complete(&mut self, seq: u64, now: Instant) -> Option<Duration> {
        match self.outstanding {
            Some(probe) if probe.seq == seq => {
                self.outstanding = None;
                self.consecutive_misses = 0;
                Some(now.saturating_duration_since(probe.sent_at))
            }
            _ => None,
        }
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    pub fn outstanding(&self) -> Option<OutstandingProbe> {
        self.outstanding
    }

    /// Forgets any outstanding probe and zeroes the miss counter.
    /// Sequence numbers keep increasing so late replies never match.
    pub fn reset(&mut self) {
        self.outstanding = None;
        self.consecutive_misses = 0;
    }
}
