use chrono::{Datelike, Utc};
use time::{Date, Month};

/// Source of "today" for past-date validation.
pub trait Clock: Send + Sync + 'static {
    fn today(&self) -> Date;
}

/// Wall clock in the dealership's time zone.
#[derive(Debug, Clone, Copy)]
pub struct ZonedClock {
    tz: chrono_tz::Tz,
}

impl ZonedClock {
    pub fn new(tz: chrono_tz::Tz) -> Self {
        Self { tz }
    }
}

impl Clock for ZonedClock {
    fn today(&self) -> Date {
        let local = Utc::now().with_timezone(&self.tz).date_naive();
        to_time_date(local)
    }
}

/// A clock pinned to one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Date);

impl Clock for FixedClock {
    fn today(&self) -> Date {
        self.0
    }
}

fn to_time_date(d: chrono::NaiveDate) -> Date {
    // chrono's calendar range is a subset of time's, so the conversion holds
    // for any date chrono can produce.
    Month::try_from(d.month() as u8)
        .ok()
        .and_then(|m| Date::from_calendar_date(d.year(), m, d.day() as u8).ok())
        .unwrap_or(Date::MIN)
}
