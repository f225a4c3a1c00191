use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Last representable instant of a day (23:59:59.999999999).
pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN))
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Run-wide notion of "now" in the broker's local timezone.
///
/// Captured once per run so that every component stamps and clips
/// against the same day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    offset: FixedOffset,
    now: NaiveDateTime,
}

impl Clock {
    /// Capture the current instant.
    pub fn system(offset: FixedOffset) -> Self {
        Self::at(offset, Utc::now())
    }

    pub fn at(offset: FixedOffset, instant: DateTime<Utc>) -> Self {
        Self {
            offset,
            now: instant.with_timezone(&offset).naive_local(),
        }
    }

    /// Pin "now" to a local timestamp (tests, replays).
    pub fn fixed(offset: FixedOffset, now: NaiveDateTime) -> Self {
        Self { offset, now }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }

    /// Interpret a local timestamp as an instant.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        (local - Duration::seconds(self.offset.local_minus_utc() as i64)).and_utc()
    }

    pub fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset).naive_local()
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.to_local(instant).date()
    }
}
