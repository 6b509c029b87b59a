//! Fixed-rate tick clock for Gatehold.
//!
//! Every login in progress is driven by a periodic tick, the same way the
//! game server drives everything else. The tick is where a state machine
//! checks whether its background work finished, and where the login
//! timeout is counted. The timeout is expressed in *ticks*, not seconds,
//! so a server that falls behind gives slow clients proportionally more
//! wall-clock time instead of kicking them.
//!
//! # Integration
//!
//! The scheduler sits inside a connection driver's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         packet = conn.recv() => { /* machine.handle_packet(..) */ }
//!         _ = scheduler.wait_for_tick() => {
//!             machine.tick();
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the tick clock.
///
/// Deserializable so it can sit in the server's config file; every field
/// has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Ticks per second. The reference game server runs at 20.
    pub tick_rate_hz: u32,

    /// Random delay (0 to this many µs) added before the *first* tick so
    /// that connections accepted in the same instant do not all tick in
    /// lockstep.
    pub initial_jitter_us: u64,

    /// Fraction of the tick budget (0.0 to 1.0) above which a tick's work
    /// is logged as slow.
    pub budget_warn_threshold: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: Self::DEFAULT_TICK_RATE_HZ,
            initial_jitter_us: 2_000,
            budget_warn_threshold: 0.80,
        }
    }
}

impl TickConfig {
    /// Tick rate of the reference game server.
    pub const DEFAULT_TICK_RATE_HZ: u32 = 20;

    /// Maximum supported tick rate.
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    /// Create a config for a specific tick rate with the other defaults.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// A login clock must tick, so a rate of 0 becomes 1 Hz rather than
    /// the event-driven mode a game room might want.
    pub fn validated(mut self) -> Self {
        if self.tick_rate_hz == 0 {
            warn!("tick_rate_hz of 0 would never time out a login; using 1");
            self.tick_rate_hz = 1;
        } else if self.tick_rate_hz > Self::MAX_TICK_RATE_HZ {
            warn!(
                rate = self.tick_rate_hz,
                max = Self::MAX_TICK_RATE_HZ,
                "tick_rate_hz exceeds maximum, clamping"
            );
            self.tick_rate_hz = Self::MAX_TICK_RATE_HZ;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Duration of a single tick.
    ///
    /// Assumes a validated (non-zero) rate.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz.max(1) as f64)
    }

    /// Wall-clock time `ticks` take at this rate when nothing overruns.
    pub fn ticks_to_duration(&self, ticks: u32) -> Duration {
        self.tick_duration() * ticks
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Information about a tick, returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// `true` if this tick fired noticeably late.
    pub overrun: bool,
    /// Ticks that were skipped because the clock fell behind.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-rate tick clock. One per connection driver.
///
/// When the driver falls behind, missed ticks are skipped rather than
/// replayed: the next tick is scheduled one period after *now*. Replaying
/// missed ticks would burn through a slow client's timeout budget in a
/// single burst.
#[derive(Debug)]
pub struct TickScheduler {
    config: TickConfig,
    tick_duration: Duration,
    tick_count: u64,
    next_tick: TokioInstant,
    tick_start: Option<Instant>,
}

impl TickScheduler {
    /// Create a new scheduler from config.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();

        let jitter = if config.initial_jitter_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..config.initial_jitter_us))
        } else {
            Duration::ZERO
        };

        trace!(
            rate_hz = config.tick_rate_hz,
            jitter_us = jitter.as_micros() as u64,
            "tick scheduler created"
        );

        Self {
            next_tick: TokioInstant::now() + tick_duration + jitter,
            config,
            tick_duration,
            tick_count: 0,
            tick_start: None,
        }
    }

    /// Create a scheduler for a specific tick rate with default settings.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Wait until the next tick is due.
    ///
    /// Cancel-safe: dropping the future before it resolves (for example
    /// because another `select!` branch won) leaves the schedule intact.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let due = self.next_tick;
        time::sleep_until(due).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > self.tick_duration / 10;
        let ticks_skipped = if overrun {
            (late_by.as_nanos() / self.tick_duration.as_nanos()) as u64
        } else {
            0
        };

        if ticks_skipped > 0 {
            debug!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick clock fell behind, skipping ahead"
            );
        }

        self.next_tick = now + self.tick_duration;

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    /// Record that the work for the current tick has finished.
    ///
    /// Logs a warning when the work used more than the configured share of
    /// the tick budget. Returns the elapsed time, or `None` if no tick was
    /// in progress.
    pub fn record_tick_end(&mut self) -> Option<Duration> {
        let start = self.tick_start.take()?;
        let elapsed = start.elapsed();

        let utilization = elapsed.as_secs_f64() / self.tick_duration.as_secs_f64();
        if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = self.tick_duration.as_secs_f64() * 1000.0,
                "login tick approaching budget limit"
            );
        }

        Some(elapsed)
    }

    /// Number of ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The configured tick rate in Hz.
    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    /// The fixed tick period.
    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }
}
