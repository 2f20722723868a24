use chrono::{Local, NaiveDateTime, Timelike};

/// Source of the timestamps written to `created_at`, `updated_at` and `deleted_at`.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time truncated to whole seconds, matching the column format.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now = Local::now().naive_local();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
