use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};

/// Time source for quota bookkeeping.
///
/// `now` drives the burst window, `today` drives the daily rollover. Both are
/// injectable so tests can move time without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn today(&self) -> NaiveDate;
}

/// Wall clock: monotonic instants and the local calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Hand-driven clock for deterministic tests.
///
/// Starts at the moment of construction on the given date and only moves
/// when `advance` or `set_date` is called. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    origin: Instant,
    offset: Duration,
    date: NaiveDate,
}

impl ManualClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                origin: Instant::now(),
                offset: Duration::ZERO,
                date,
            })),
        }
    }

    /// Instant corresponding to `secs` seconds after construction.
    pub fn at(&self, secs: u64) -> Instant {
        self.lock().origin + Duration::from_secs(secs)
    }

    pub fn advance(&self, by: Duration) {
        self.lock().offset += by;
    }

    pub fn set_date(&self, date: NaiveDate) {
        self.lock().date = date;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let state = self.lock();
        state.origin + state.offset
    }

    fn today(&self) -> NaiveDate {
        self.lock().date
    }
}
