use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Source of "now" for deadlines and phase timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock that never runs backwards: a step back (NTP, VM resume) is held
/// at the last returned instant until real time catches up.
#[derive(Debug, Default)]
pub struct SystemClock {
    high_water: Mutex<Option<DateTime<Utc>>>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn observe(&self, reading: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self.high_water.lock().expect("clock mutex poisoned");
        let now = match *last {
            Some(previous) if previous > reading => previous,
            _ => reading,
        };
        *last = Some(now);
        now
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        self.observe(Utc::now())
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) -> DateTime<Utc> {
        let mut current = self.current.lock().expect("clock mutex poisoned");
        *current += by;
        *current
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.current.lock().expect("clock mutex poisoned") = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().expect("clock mutex poisoned")
    }
}
