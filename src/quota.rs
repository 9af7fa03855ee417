//! Daily and burst quota bookkeeping.
//!
//! Both policies are evaluated lazily on every admission: the daily counter
//! rolls over when the calendar date changes, and burst timestamps older than
//! the window are pruned before the occupancy check. No timers are involved.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::NaiveDate;

use crate::clock::Clock;
use crate::config::QuotaConfig;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot was taken; the call may proceed.
    Allowed,
    /// The burst window is full until the given instant. Nothing was consumed.
    MustWaitUntil(Instant),
    /// The daily quota is spent. Waiting will not help before the next day.
    DailyLimitExceeded { used: u32, limit: u32 },
}

/// Point-in-time view of the quota state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub day: NaiveDate,
    pub daily_count: u32,
    pub daily_limit: u32,
    pub burst_in_window: usize,
    pub burst_limit: u32,
}

struct QuotaState {
    daily_count: u32,
    day: NaiveDate,
    burst: VecDeque<Instant>,
}

pub struct QuotaTracker {
    limits: QuotaConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<QuotaState>,
}

impl QuotaTracker {
    pub fn with_clock(limits: QuotaConfig, clock: Arc<dyn Clock>) -> Self {
        let state = QuotaState {
            daily_count: 0,
            day: clock.today(),
            burst: VecDeque::with_capacity(limits.burst_limit as usize),
        };
        Self {
            limits,
            clock,
            state: Mutex::new(state),
        }
    }

    /// Decide whether one more call may go out now.
    ///
    /// On `Allowed` the call is counted against both quotas. The lock is
    /// released before returning, so callers sleep on `MustWaitUntil` without
    /// holding it and must call `admit` again afterwards.
    pub fn admit(&self) -> Admission {
        let mut state = self.lock();
        let now = self.clock.now();

        self.roll_over(&mut state);
        self.prune(&mut state, now);

        let limits = &self.limits;
        if state.daily_count >= limits.daily_limit {
            tracing::error!(
                "Daily rate limit reached: {} / {}",
                state.daily_count,
                limits.daily_limit
            );
            return Admission::DailyLimitExceeded {
                used: state.daily_count,
                limit: limits.daily_limit,
            };
        }

        if f64::from(state.daily_count) >= limits.daily_warn_ratio * f64::from(limits.daily_limit)
        {
            tracing::warn!(
                "Daily rate limit threshold reached: {} / {}",
                state.daily_count,
                limits.daily_limit
            );
        }

        let occupancy = state.burst.len();
        if occupancy >= limits.burst_limit as usize {
            let until = match state.burst.front() {
                Some(oldest) => (*oldest + limits.burst_window).max(now),
                None => now + limits.burst_window,
            };
            tracing::debug!(
                "Burst limit reached ({} / {}). Waiting {:.2}s",
                occupancy,
                limits.burst_limit,
                until.saturating_duration_since(now).as_secs_f64()
            );
            return Admission::MustWaitUntil(until);
        }

        state.daily_count += 1;
        state.burst.push_back(now);

        if occupancy as f64 >= limits.burst_warn_ratio * f64::from(limits.burst_limit) {
            tracing::warn!(
                "Burst limit threshold reached: {} / {}",
                occupancy,
                limits.burst_limit
            );
        }

        Admission::Allowed
    }

    /// Read-only view; does not roll over or prune.
    pub fn snapshot(&self) -> QuotaSnapshot {
        let state = self.lock();
        let now = self.clock.now();
        let today = self.clock.today();
        let in_window = state
            .burst
            .iter()
            .filter(|t| !is_expired(**t, now, &self.limits))
            .count();
        QuotaSnapshot {
            day: today,
            daily_count: if today == state.day { state.daily_count } else { 0 },
            daily_limit: self.limits.daily_limit,
            burst_in_window: in_window,
            burst_limit: self.limits.burst_limit,
        }
    }

    fn roll_over(&self, state: &mut QuotaState) {
        let today = self.clock.today();
        if today != state.day {
            tracing::info!(
                "Resetting daily counter ({} calls on {}, now {})",
                state.daily_count,
                state.day,
                today
            );
            state.day = today;
            state.daily_count = 0;
        }
    }

    fn prune(&self, state: &mut QuotaState, now: Instant) {
        while let Some(oldest) = state.burst.front() {
            if !is_expired(*oldest, now, &self.limits) {
                break;
            }
            state.burst.pop_front();
        }
    }

    fn lock(&self) -> MutexGuard<'_, QuotaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn burst_timestamps(&self) -> Vec<Instant> {
        self.lock().burst.iter().copied().collect()
    }
}

/// Strictly older than the trailing window.
fn is_expired(at: Instant, now: Instant, limits: &QuotaConfig) -> bool {
    match now.checked_sub(limits.burst_window) {
        Some(window_start) => at < window_start,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn tracker(daily: u32, burst: u32, window_secs: u64) -> (QuotaTracker, ManualClock) {
        let clock = ManualClock::new(day(18));
        let limits = QuotaConfig {
            daily_limit: daily,
            burst_limit: burst,
            burst_window: Duration::from_secs(window_secs),
            ..QuotaConfig::default()
        };
        (QuotaTracker::with_clock(limits, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn burst_window_scenario() {
        let (tracker, clock) = tracker(1_000, 2, 60);

        assert_eq!(tracker.admit(), Admission::Allowed);
        clock.advance(Duration::from_secs(1));
        assert_eq!(tracker.admit(), Admission::Allowed);
        clock.advance(Duration::from_secs(1));
        assert_eq!(tracker.admit(), Admission::MustWaitUntil(clock.at(60)));

        clock.advance(Duration::from_secs(59));
        assert_eq!(tracker.admit(), Admission::Allowed);
        // t=0 pruned; t=1 is still inside the window (61 - 60 = 1).
        assert_eq!(tracker.burst_timestamps(), vec![clock.at(1), clock.at(61)]);
    }

    #[test]
    fn wait_does_not_consume_daily_quota() {
        let (tracker, clock) = tracker(1_000, 1, 60);
        assert_eq!(tracker.admit(), Admission::Allowed);
        for _ in 0..5 {
            assert!(matches!(tracker.admit(), Admission::MustWaitUntil(_)));
        }
        clock.advance(Duration::from_secs(61));
        assert_eq!(tracker.admit(), Admission::Allowed);
        assert_eq!(tracker.snapshot().daily_count, 2);
    }

    #[test]
    fn burst_limit_holds_in_every_trailing_window() {
        let (tracker, clock) = tracker(10_000, 3, 10);
        let mut admitted = Vec::new();

        for _ in 0..200 {
            match tracker.admit() {
                Admission::Allowed => admitted.push(clock.now()),
                Admission::MustWaitUntil(until) => assert!(until >= clock.now()),
                Admission::DailyLimitExceeded { .. } => unreachable!(),
            }
            assert!(tracker.burst_timestamps().len() <= 3);
            clock.advance(Duration::from_millis(700));
        }

        for (i, start) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|t| **t < *start + Duration::from_secs(10))
                .count();
            assert!(in_window <= 3, "{in_window} admissions within one window");
        }
    }

    #[test]
    fn daily_limit_rejects_without_waiting() {
        let (tracker, clock) = tracker(3, 100, 1);
        for _ in 0..3 {
            assert_eq!(tracker.admit(), Admission::Allowed);
            clock.advance(Duration::from_secs(2));
        }
        assert_eq!(
            tracker.admit(),
            Admission::DailyLimitExceeded { used: 3, limit: 3 }
        );
        // Still rejected later the same day.
        clock.advance(Duration::from_secs(3600));
        assert!(matches!(
            tracker.admit(),
            Admission::DailyLimitExceeded { .. }
        ));
    }

    #[test]
    fn daily_limit_wins_over_burst_wait() {
        let (tracker, _clock) = tracker(1, 1, 60);
        assert_eq!(tracker.admit(), Admission::Allowed);
        assert_eq!(
            tracker.admit(),
            Admission::DailyLimitExceeded { used: 1, limit: 1 }
        );
    }

    #[test]
    fn day_rollover_resets_exhausted_tracker() {
        let (tracker, clock) = tracker(2, 100, 1);
        tracker.admit();
        tracker.admit();
        assert!(matches!(
            tracker.admit(),
            Admission::DailyLimitExceeded { .. }
        ));

        clock.set_date(day(19));
        assert_eq!(tracker.snapshot().daily_count, 0);
        assert_eq!(tracker.admit(), Admission::Allowed);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.daily_count, 1);
        assert_eq!(snapshot.day, day(19));
    }

    #[test]
    fn rollover_happens_once_per_day() {
        let (tracker, clock) = tracker(100, 100, 1);
        clock.set_date(day(19));
        tracker.admit();
        tracker.admit();
        tracker.admit();
        assert_eq!(tracker.snapshot().daily_count, 3);
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let (tracker, clock) = tracker(100, 2, 60);
        tracker.admit();
        tracker.admit();
        clock.advance(Duration::from_secs(120));

        assert_eq!(tracker.snapshot().burst_in_window, 0);
        assert_eq!(tracker.burst_timestamps().len(), 2);
    }
}
