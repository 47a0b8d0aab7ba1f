//! Local wall-clock time in the configured timezone.
//!
//! Every "today", "local midnight" and row timestamp in the pipeline is
//! interpreted through a [`Clock`], so tests can pin the current instant.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Source of the current local time
pub trait Clock: Send + Sync {
    /// Current instant in the clock's timezone
    fn now(&self) -> DateTime<Tz>;

    /// Timezone the clock reports in
    fn tz(&self) -> Tz;

    /// Today's local calendar date
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    fn tz(&self) -> Tz {
        self.tz
    }
}

/// Interpret a naive wall-clock time in `tz`.
///
/// Ambiguous times (DST fold) resolve to the earlier instant; times inside a
/// DST gap yield `None`.
pub fn localize(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive).earliest()
}

/// Local midnight that starts the day after `at`
pub fn next_local_midnight(at: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let tomorrow = at.date_naive().checked_add_days(Days::new(1))?;
    localize(at.timezone(), tomorrow.and_hms_opt(0, 0, 0)?)
}

/// 8-digit `YYYYMMDD` rendering used in URL templates
pub fn date_stamp(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}
