//! Integration tests for the login tick clock.
//!
//! Uses `start_paused = true` so Tokio auto-advances the clock whenever
//! every task is idle, which makes `sleep_until` resolve instantly and
//! deterministically.

use std::time::Duration;

use gatehold_tick::{TickConfig, TickScheduler};
use tokio::time::Instant;

/// Tokio's timer wheel has millisecond resolution, so a deadline can fire
/// up to a millisecond after the exact instant.
fn assert_elapsed(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual <= expected + Duration::from_millis(1),
        "expected ~{expected:?}, got {actual:?}"
    );
}

fn no_jitter(rate: u32) -> TickConfig {
    TickConfig {
        tick_rate_hz: rate,
        initial_jitter_us: 0,
        ..Default::default()
    }
}

// =========================================================================
// Construction
// =========================================================================

#[test]
fn test_scheduler_initial_state() {
    let s = TickScheduler::new(no_jitter(20));
    assert_eq!(s.tick_count(), 0);
    assert_eq!(s.tick_rate_hz(), 20);
    assert_eq!(s.tick_duration(), Duration::from_millis(50));
}

#[test]
fn test_with_rate_constructor() {
    let s = TickScheduler::with_rate(10);
    assert_eq!(s.tick_rate_hz(), 10);
    assert_eq!(s.tick_duration(), Duration::from_millis(100));
}

#[test]
fn test_zero_rate_still_ticks() {
    let s = TickScheduler::with_rate(0);
    assert_eq!(s.tick_rate_hz(), 1);
    assert_eq!(s.tick_duration(), Duration::from_secs(1));
}

// =========================================================================
// Tick firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_ticks_fire_at_fixed_period() {
    let mut s = TickScheduler::new(no_jitter(20));
    let start = Instant::now();

    let first = s.wait_for_tick().await;
    assert_eq!(first.tick, 1);
    assert!(!first.overrun);
    assert_elapsed(Instant::now() - start, Duration::from_millis(50));

    let second = s.wait_for_tick().await;
    assert_eq!(second.tick, 2);
    assert!(Instant::now() - start >= Duration::from_millis(100));
    assert_eq!(s.tick_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_six_hundred_ticks_take_thirty_seconds() {
    let mut s = TickScheduler::new(no_jitter(20));
    let start = Instant::now();

    for _ in 0..600 {
        s.wait_for_tick().await;
    }

    assert_eq!(s.tick_count(), 600);
    let elapsed = Instant::now() - start;
    assert!(elapsed >= Duration::from_secs(30));
    assert!(elapsed < Duration::from_secs(31));
}

#[tokio::test(start_paused = true)]
async fn test_late_tick_skips_ahead_instead_of_bursting() {
    let mut s = TickScheduler::new(no_jitter(20));
    s.wait_for_tick().await;

    // Stall the driver for five tick periods.
    tokio::time::advance(Duration::from_millis(250)).await;

    let late = s.wait_for_tick().await;
    assert!(late.overrun);
    assert!((3..=4).contains(&late.ticks_skipped));

    // The next tick is one period after the late one, not immediate.
    let before = Instant::now();
    let next = s.wait_for_tick().await;
    assert!(!next.overrun);
    assert_elapsed(Instant::now() - before, Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_wait_keeps_schedule() {
    let mut s = TickScheduler::new(no_jitter(20));
    let start = Instant::now();

    // Lose a select! race against a shorter sleep.
    tokio::select! {
        _ = s.wait_for_tick() => panic!("tick should not win"),
        _ = tokio::time::sleep(Duration::from_millis(10)) => {}
    }
    assert_eq!(s.tick_count(), 0);

    let info = s.wait_for_tick().await;
    assert_eq!(info.tick, 1);
    assert_elapsed(Instant::now() - start, Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_jitter_only_delays_first_tick() {
    let mut s = TickScheduler::new(TickConfig {
        tick_rate_hz: 20,
        initial_jitter_us: 5_000,
        ..Default::default()
    });
    let start = Instant::now();

    s.wait_for_tick().await;
    let first = Instant::now() - start;
    assert!(first >= Duration::from_millis(50));
    assert!(first <= Duration::from_millis(56));

    let before = Instant::now();
    s.wait_for_tick().await;
    assert_elapsed(Instant::now() - before, Duration::from_millis(50));
}

// =========================================================================
// Budget recording
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_without_tick_is_none() {
    let mut s = TickScheduler::new(no_jitter(20));
    assert!(s.record_tick_end().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_consumes_start() {
    let mut s = TickScheduler::new(no_jitter(20));
    s.wait_for_tick().await;

    assert!(s.record_tick_end().is_some());
    assert!(s.record_tick_end().is_none(), "second call has nothing to record");
}
