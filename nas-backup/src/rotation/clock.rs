//! Time source for backup naming.

use chrono::{Local, NaiveDate, Utc};

pub trait Clock: Send + Sync {
    /// Calendar date stamped into new backup names.
    fn today(&self) -> NaiveDate;

    /// Seconds since the Unix epoch, used to disambiguate same-day names.
    fn epoch_seconds(&self) -> u64;
}

/// Local wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn epoch_seconds(&self) -> u64 {
        Utc::now().timestamp().max(0) as u64
    }
}

/// Clock pinned to a given date and epoch second.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub date: NaiveDate,
    pub epoch_seconds: u64,
}

impl FixedClock {
    pub fn new(date: NaiveDate, epoch_seconds: u64) -> Self {
        Self {
            date,
            epoch_seconds,
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.date
    }

    fn epoch_seconds(&self) -> u64 {
        self.epoch_seconds
    }
}
