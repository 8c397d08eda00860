//! Calendar-day source for day tokens.

use chrono::{Local, NaiveDate, Utc};

use crate::settings::TokenTimezone;

/// Source of the current calendar day.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall clock in the configured timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    timezone: TokenTimezone,
}

impl SystemClock {
    pub fn new(timezone: TokenTimezone) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        match self.timezone {
            TokenTimezone::Utc => Utc::now().date_naive(),
            TokenTimezone::Local => Local::now().date_naive(),
        }
    }
}

/// Clock pinned to one day.
#[cfg(test)]
#[derive(Debug)]
pub struct FixedClock(std::sync::RwLock<NaiveDate>);

#[cfg(test)]
impl FixedClock {
    pub fn new(day: NaiveDate) -> Self {
        Self(std::sync::RwLock::new(day))
    }

    pub fn set(&self, day: NaiveDate) {
        *self.0.write().unwrap() = day;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.0.read().unwrap()
    }
}
