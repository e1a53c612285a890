//! Calendar expression format.
//!
//! A schedule is a list of `key=value` entries separated by newlines or
//! semicolons:
//!
//! ```text
//! second=0
//! minute=*/15
//! hour=8-18
//! dayOfWeek=Mon,Tue,Wed,Thu,Fri
//! timezone=+02:00
//! start=2024/01/01
//! ```
//!
//! Recognized keys: `second`, `minute`, `hour`, `dayOfWeek`, `dayOfMonth`,
//! `month`, `year`, `timezone`, `start`, `end`. The parser is whitespace
//! tolerant and ignores unknown keys. Field values support `*`, `*/n`
//! increments, comma lists, `a-b` ranges and day-of-week names; absent
//! time fields default to 0, absent date fields to `*`.
//!
//! Timezones are fixed offsets (`+HH:MM`); named zones fall back to UTC.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Timelike, Utc};
use tracing::warn;

use crate::error::{codes, SchedulerError};

const CONTEXT: &str = "CalendarExpression";

/// Search horizon for the next timeout; an expression that cannot fire
/// within this window is treated as never firing.
const HORIZON_DAYS: i64 = 366 * 6;

#[derive(Debug, Clone, PartialEq)]
enum FieldSpec {
    Any,
    Step(u32),
    Values(Vec<u32>),
}

impl FieldSpec {
    fn matches(&self, value: u32) -> bool {
        match self {
            FieldSpec::Any => true,
            FieldSpec::Step(step) => *step > 0 && value % step == 0,
            FieldSpec::Values(values) => values.contains(&value),
        }
    }
}

/// A parsed calendar expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarExpression {
    second: FieldSpec,
    minute: FieldSpec,
    hour: FieldSpec,
    day_of_week: FieldSpec,
    day_of_month: FieldSpec,
    month: FieldSpec,
    year: FieldSpec,
    offset: FixedOffset,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl Default for CalendarExpression {
    fn default() -> Self {
        Self {
            second: FieldSpec::Values(vec![0]),
            minute: FieldSpec::Values(vec![0]),
            hour: FieldSpec::Values(vec![0]),
            day_of_week: FieldSpec::Any,
            day_of_month: FieldSpec::Any,
            month: FieldSpec::Any,
            year: FieldSpec::Any,
            offset: FixedOffset::east_opt(0).expect("zero offset"),
            start: None,
            end: None,
        }
    }
}

impl CalendarExpression {
    /// Parses an expression from its text form; entries may also be given
    /// as individual lines of a multi-value item.
    pub fn parse(text: &str) -> Result<Self, SchedulerError> {
        Self::parse_entries(text.split(['\n', ';']))
    }

    pub fn parse_entries<'a>(
        entries: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, SchedulerError> {
        let mut expression = Self::default();
        for entry in entries {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((key, value)) = entry.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if value.is_empty() {
                continue;
            }
            match key.to_lowercase().as_str() {
                "second" => expression.second = parse_field(key, value, 0, 59)?,
                "minute" => expression.minute = parse_field(key, value, 0, 59)?,
                "hour" => expression.hour = parse_field(key, value, 0, 23)?,
                "dayofweek" => expression.day_of_week = parse_day_of_week(value)?,
                "dayofmonth" => expression.day_of_month = parse_field(key, value, 1, 31)?,
                "month" => expression.month = parse_field(key, value, 1, 12)?,
                "year" => expression.year = parse_field(key, value, 1970, 9999)?,
                "timezone" => expression.offset = parse_offset(value),
                "start" => expression.start = Some(parse_date(key, value)?),
                "end" => expression.end = Some(parse_date(key, value)?),
                _ => {
                    // unknown keys are ignored, the format is forward
                    // compatible
                }
            }
        }
        Ok(expression)
    }

    /// The next instant after `after` matching the expression, or `None`
    /// when no match exists before the end date / search horizon.
    pub fn next_timeout(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut local = after.with_timezone(&self.offset) + chrono::Duration::seconds(1);

        if let Some(start) = self.start {
            let start = self
                .offset
                .from_local_datetime(&start.and_hms_opt(0, 0, 0)?)
                .single()?;
            if local < start {
                local = start;
            }
        }
        let horizon = local + chrono::Duration::days(HORIZON_DAYS);

        let mut candidate = local.with_nanosecond(0)?;
        loop {
            if candidate > horizon {
                return None;
            }
            if let Some(end) = self.end {
                if candidate.date_naive() > end {
                    return None;
                }
            }
            let date_matches = self.year.matches(candidate.year() as u32)
                && self.month.matches(candidate.month())
                && self.day_of_month.matches(candidate.day())
                && self
                    .day_of_week
                    .matches(candidate.weekday().num_days_from_sunday())
                && self.hour.matches(candidate.hour())
                && self.minute.matches(candidate.minute());

            if date_matches {
                // scan the remaining seconds of this minute
                let mut second = candidate.second();
                while second <= 59 {
                    if self.second.matches(second) {
                        let hit = candidate.with_second(second)?;
                        return Some(hit.with_timezone(&Utc));
                    }
                    second += 1;
                }
            }
            // advance to the start of the next minute
            candidate = (candidate + chrono::Duration::seconds(60 - i64::from(candidate.second())))
                .with_second(0)?;
        }
    }
}

fn parse_field(key: &str, value: &str, min: u32, max: u32) -> Result<FieldSpec, SchedulerError> {
    if value == "*" {
        return Ok(FieldSpec::Any);
    }
    if let Some(step) = value.strip_prefix("*/") {
        let step: u32 = step.parse().map_err(|_| invalid(key, value))?;
        if step == 0 {
            return Err(invalid(key, value));
        }
        return Ok(FieldSpec::Step(step));
    }
    let mut values = Vec::new();
    for part in value.split(',') {
        let part = part.trim();
        if let Some((low, high)) = part.split_once('-') {
            let low: u32 = low.trim().parse().map_err(|_| invalid(key, value))?;
            let high: u32 = high.trim().parse().map_err(|_| invalid(key, value))?;
            if low > high || low < min || high > max {
                return Err(invalid(key, value));
            }
            values.extend(low..=high);
        } else {
            let single: u32 = part.parse().map_err(|_| invalid(key, value))?;
            if single < min || single > max {
                return Err(invalid(key, value));
            }
            values.push(single);
        }
    }
    Ok(FieldSpec::Values(values))
}

fn parse_day_of_week(value: &str) -> Result<FieldSpec, SchedulerError> {
    if value == "*" {
        return Ok(FieldSpec::Any);
    }
    let mut values = Vec::new();
    for part in value.split(',') {
        let part = part.trim().to_lowercase();
        let day = match part.as_str() {
            "sun" => 0,
            "mon" => 1,
            "tue" => 2,
            "wed" => 3,
            "thu" => 4,
            "fri" => 5,
            "sat" => 6,
            other => {
                let number: u32 = other
                    .parse()
                    .map_err(|_| invalid("dayOfWeek", value))?;
                if number > 7 {
                    return Err(invalid("dayOfWeek", value));
                }
                // both 0 and 7 mean Sunday
                number % 7
            }
        };
        values.push(day);
    }
    Ok(FieldSpec::Values(values))
}

fn parse_offset(value: &str) -> FixedOffset {
    let parse = || -> Option<FixedOffset> {
        let (sign, rest) = match value.split_at_checked(1)? {
            ("+", rest) => (1, rest),
            ("-", rest) => (-1, rest),
            _ => return None,
        };
        let (hours, minutes) = rest.split_once(':')?;
        let seconds = sign * (hours.parse::<i32>().ok()? * 3600 + minutes.parse::<i32>().ok()? * 60);
        FixedOffset::east_opt(seconds)
    };
    if value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).expect("zero offset");
    }
    match parse() {
        Some(offset) => offset,
        None => {
            warn!(timezone = value, "unsupported timezone, evaluating in UTC");
            FixedOffset::east_opt(0).expect("zero offset")
        }
    }
}

fn parse_date(key: &str, value: &str) -> Result<NaiveDate, SchedulerError> {
    NaiveDate::parse_from_str(value, "%Y/%m/%d").map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> SchedulerError {
    SchedulerError::new(
        CONTEXT,
        codes::INVALID_CALENDAR_EXPRESSION,
        format!("invalid field '{key}={value}'"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn every_minute() {
        let expr = CalendarExpression::parse("minute=*; hour=*").unwrap();
        let next = expr.next_timeout(at(2024, 6, 1, 10, 30, 15)).unwrap();
        assert_eq!(next, at(2024, 6, 1, 10, 31, 0));
    }

    #[test]
    fn every_second() {
        let expr = CalendarExpression::parse("second=*; minute=*; hour=*").unwrap();
        let next = expr.next_timeout(at(2024, 6, 1, 10, 30, 15)).unwrap();
        assert_eq!(next, at(2024, 6, 1, 10, 30, 16));
    }

    #[test]
    fn daily_at_hour() {
        let expr = CalendarExpression::parse("hour=3").unwrap();
        let next = expr.next_timeout(at(2024, 6, 1, 10, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 6, 2, 3, 0, 0));
    }

    #[test]
    fn step_minutes() {
        let expr = CalendarExpression::parse("minute=*/15; hour=*").unwrap();
        let next = expr.next_timeout(at(2024, 6, 1, 10, 16, 0)).unwrap();
        assert_eq!(next, at(2024, 6, 1, 10, 30, 0));
    }

    #[test]
    fn weekday_names_and_ranges() {
        // 2024-06-01 is a Saturday
        let expr = CalendarExpression::parse("hour=9\ndayOfWeek=Mon,Tue").unwrap();
        let next = expr.next_timeout(at(2024, 6, 1, 0, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 6, 3, 9, 0, 0));

        let expr = CalendarExpression::parse("hour=8-10").unwrap();
        let next = expr.next_timeout(at(2024, 6, 1, 8, 30, 0)).unwrap();
        assert_eq!(next, at(2024, 6, 1, 9, 0, 0));
    }

    #[test]
    fn start_and_end_bound_the_schedule() {
        let expr =
            CalendarExpression::parse("hour=0\nstart=2024/07/01\nend=2024/07/02").unwrap();
        let next = expr.next_timeout(at(2024, 6, 1, 0, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 7, 1, 0, 0, 0));

        let expr = CalendarExpression::parse("hour=0\nend=2024/05/01").unwrap();
        assert!(expr.next_timeout(at(2024, 6, 1, 0, 0, 0)).is_none());
    }

    #[test]
    fn fixed_offset_timezone() {
        // 02:00 local at +02:00 is midnight UTC
        let expr = CalendarExpression::parse("hour=2\ntimezone=+02:00").unwrap();
        let next = expr.next_timeout(at(2024, 6, 1, 10, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 6, 2, 0, 0, 0));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let expr = CalendarExpression::parse("minute=30\nfancy=yes").unwrap();
        let next = expr.next_timeout(at(2024, 6, 1, 10, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 6, 1, 10, 30, 0));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = CalendarExpression::parse("minute=61").unwrap_err();
        assert_eq!(err.code, codes::INVALID_CALENDAR_EXPRESSION);
        assert!(CalendarExpression::parse("hour=x").is_err());
        assert!(CalendarExpression::parse("minute=*/0").is_err());
        assert!(CalendarExpression::parse("start=01.07.2024").is_err());
    }
}
