//! Deduplication lookback periods such as `"-7 days"`.

use std::str::FromStr;

use annalist_core::{AppError, AppResult};
use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Signed lookback period; only strictly negative periods are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    offset: Duration,
}

impl Period {
    /// Parses a period of the form `[+|-]<amount> <unit>[s] [ago]`.
    ///
    /// Units are second, minute, hour, day, week, month (30 days) and year
    /// (365 days). A period that does not point into the past is rejected.
    pub fn parse(value: &str) -> AppResult<Self> {
        let offset = parse_offset(value)?;
        if offset >= Duration::zero() {
            return Err(AppError::Validation(format!(
                "period should modify date into past, '{value}' given"
            )));
        }

        Ok(Self { offset })
    }

    /// Returns the signed offset of the period.
    #[must_use]
    pub fn offset(&self) -> Duration {
        self.offset
    }

    /// Returns the window from the start of the day the period reaches back
    /// to until the end of the current day.
    #[must_use]
    pub fn window(&self, now: DateTime<Utc>) -> DateWindow {
        let start = (now + self.offset)
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();
        let end = now.date_naive().and_time(NaiveTime::MIN).and_utc() + Duration::days(1);

        DateWindow { start, end }
    }
}

impl FromStr for Period {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

fn parse_offset(value: &str) -> AppResult<Duration> {
    let invalid = || AppError::Validation(format!("period '{value}' is not a valid duration"));
    let normalized = value.trim().to_ascii_lowercase();
    let mut words: Vec<&str> = normalized.split_whitespace().collect();

    let ago = words.last() == Some(&"ago");
    if ago {
        words.pop();
    }

    let (amount, unit) = match words.as_slice() {
        [amount, unit] => (*amount, *unit),
        [joined] => {
            let split = joined
                .find(|character: char| character.is_ascii_alphabetic())
                .ok_or_else(invalid)?;
            joined.split_at(split)
        }
        _ => return Err(invalid()),
    };

    let amount: i64 = amount
        .strip_prefix('+')
        .unwrap_or(amount)
        .parse()
        .map_err(|_| invalid())?;
    let seconds_per_unit = match unit.trim_end_matches('s') {
        "sec" | "second" => 1,
        "min" | "minute" => 60,
        "hour" => 3_600,
        "day" => 86_400,
        "week" => 604_800,
        "month" => 2_592_000,
        "year" => 31_536_000,
        _ => return Err(invalid()),
    };

    let seconds = amount.checked_mul(seconds_per_unit).ok_or_else(invalid)?;
    let seconds = if ago { -seconds } else { seconds };
    Duration::try_seconds(seconds).ok_or_else(invalid)
}

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound.
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// Returns whether the instant falls inside the window.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}
