//! Five-field cron expressions.
//!
//! Format: `MIN HOUR DOM MON DOW`. Each field accepts `*`, single values,
//! ranges (`1-5`), steps (`*/15`, `10-40/10`, `5/20`) and comma lists.
//! Months and weekdays also accept three-letter names (`JAN`, `mon`), and
//! weekday `7` is Sunday. The `@yearly`, `@annually`, `@monthly`,
//! `@weekly`, `@daily`, `@midnight` and `@hourly` shortcuts are supported.
//!
//! When both day-of-month and day-of-week are restricted a day matches if
//! either one does, as in Vixie cron.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike,
};

use crate::error::SchedulerError;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// How far ahead `next_after` searches before giving up.
const SEARCH_YEARS: i64 = 8;

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days: u64,
    months: u64,
    weekdays: u64,
    any_day: bool,
    any_weekday: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, SchedulerError> {
        let trimmed = expression.trim();
        let expanded = expand_macro(trimmed).unwrap_or(trimmed);
        let fields: Vec<&str> = expanded.split_whitespace().collect();
        let invalid = |reason: String| SchedulerError::InvalidCron {
            expression: expression.to_owned(),
            reason,
        };

        if fields.len() != 5 {
            return Err(invalid(format!(
                "expected 5 fields (MIN HOUR DOM MON DOW), found {}",
                fields.len()
            )));
        }

        let minutes = parse_field(fields[0], 0, 59, &[]).map_err(|r| invalid(format!("minute: {r}")))?;
        let hours = parse_field(fields[1], 0, 23, &[]).map_err(|r| invalid(format!("hour: {r}")))?;
        let days = parse_field(fields[2], 1, 31, &[]).map_err(|r| invalid(format!("day of month: {r}")))?;
        let months = parse_field(fields[3], 1, 12, &MONTH_NAMES).map_err(|r| invalid(format!("month: {r}")))?;
        let mut weekdays =
            parse_field(fields[4], 0, 7, &WEEKDAY_NAMES).map_err(|r| invalid(format!("day of week: {r}")))?;
        // 7 is an alias for Sunday.
        if weekdays & (1 << 7) != 0 {
            weekdays = (weekdays & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: trimmed.to_owned(),
            minutes,
            hours,
            days,
            months,
            weekdays,
            any_day: fields[2].starts_with('*'),
            any_weekday: fields[4].starts_with('*'),
        })
    }

    /// The expression as written (macros are not expanded).
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first fire time strictly after `after`, evaluated in `after`'s
    /// timezone.
    ///
    /// Wall-clock times skipped by a DST jump are not fired; times repeated
    /// by a DST fold fire once, at the earlier instant. Returns `None` when
    /// nothing matches within the search horizon.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let local = after.naive_local();
        let limit = local + Duration::days(366 * SEARCH_YEARS);
        let mut candidate = local.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);

        while candidate <= limit {
            if !has(self.months, candidate.month()) {
                candidate = start_of_next_month(candidate.date())?;
                continue;
            }
            if !self.day_matches(candidate.date()) {
                candidate = candidate.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !has(self.hours, candidate.hour()) {
                candidate = candidate.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !has(self.minutes, candidate.minute()) {
                candidate += Duration::minutes(1);
                continue;
            }

            match tz.from_local_datetime(&candidate) {
                LocalResult::Single(at) if at > *after => return Some(at),
                LocalResult::Ambiguous(earliest, _) if earliest > *after => return Some(earliest),
                _ => {}
            }
            candidate += Duration::minutes(1);
        }

        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let day = has(self.days, date.day());
        let weekday = has(self.weekdays, date.weekday().num_days_from_sunday());
        if self.any_day || self.any_weekday {
            day && weekday
        } else {
            day || weekday
        }
    }
}

impl FromStr for CronSchedule {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn expand_macro(expression: &str) -> Option<&'static str> {
    let expanded = match expression.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => "0 0 1 1 *",
        "@monthly" => "0 0 1 * *",
        "@weekly" => "0 0 * * 0",
        "@daily" | "@midnight" => "0 0 * * *",
        "@hourly" => "0 * * * *",
        _ => return None,
    };
    Some(expanded)
}

fn has(mask: u64, value: u32) -> bool {
    mask & (1 << value) != 0
}

fn start_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

/// Parse one field into a bitmask of matching values.
fn parse_field(field: &str, min: u32, max: u32, names: &[&str]) -> Result<u64, String> {
    let mut mask = 0u64;

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{step}'"))?;
                if step == 0 {
                    return Err("step must be greater than zero".to_owned());
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (value(lo, min, max, names)?, value(hi, min, max, names)?)
        } else {
            let start = value(range, min, max, names)?;
            // `5/20` means "from 5 to the end, every 20".
            (start, if step.is_some() { max } else { start })
        };

        if start > end {
            return Err(format!("range {start}-{end} is reversed"));
        }

        let step = step.unwrap_or(1) as usize;
        for v in (start..=end).step_by(step) {
            mask |= 1 << v;
        }
    }

    Ok(mask)
}

fn value(token: &str, min: u32, max: u32, names: &[&str]) -> Result<u32, String> {
    let parsed = match token.parse::<u32>() {
        Ok(v) => v,
        Err(_) => names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(token))
            .map(|idx| idx as u32 + min)
            .ok_or_else(|| format!("invalid value '{token}'"))?,
    };
    if parsed < min || parsed > max {
        return Err(format!("{parsed} is outside {min}-{max}"));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chrono_tz::Tz;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn next(expr: &str, after: DateTime<Utc>) -> DateTime<Utc> {
        CronSchedule::parse(expr).unwrap().next_after(&after).unwrap()
    }

    #[test]
    fn every_minute_is_strictly_after() {
        let after = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(next("* * * * *", after), utc(2024, 3, 1, 10, 1));

        let mid_minute = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 42).unwrap();
        assert_eq!(next("* * * * *", mid_minute), utc(2024, 3, 1, 10, 1));
    }

    #[test]
    fn hourly_and_daily_times() {
        assert_eq!(next("0 * * * *", utc(2026, 2, 22, 10, 30)), utc(2026, 2, 22, 11, 0));
        assert_eq!(next("0 8 * * *", utc(2026, 2, 22, 7, 0)), utc(2026, 2, 22, 8, 0));
        assert_eq!(next("0 8 * * *", utc(2026, 2, 22, 8, 0)), utc(2026, 2, 23, 8, 0));
    }

    #[test]
    fn steps_ranges_and_lists() {
        assert_eq!(next("*/15 * * * *", utc(2026, 2, 22, 10, 2)), utc(2026, 2, 22, 10, 15));
        assert_eq!(next("10-40/10 * * * *", utc(2026, 2, 22, 10, 41)), utc(2026, 2, 22, 11, 10));
        assert_eq!(next("5/20 * * * *", utc(2026, 2, 22, 10, 26)), utc(2026, 2, 22, 10, 45));
        assert_eq!(next("0 9,17 * * *", utc(2026, 2, 22, 10, 0)), utc(2026, 2, 22, 17, 0));
    }

    #[test]
    fn month_rollover_and_names() {
        assert_eq!(next("0 0 1 * *", utc(2024, 12, 15, 0, 0)), utc(2025, 1, 1, 0, 0));
        assert_eq!(next("30 6 * jun *", utc(2024, 7, 1, 0, 0)), utc(2025, 6, 1, 6, 30));
    }

    #[test]
    fn weekdays_with_names_and_sunday_alias() {
        // 2024-03-01 is a Friday.
        assert_eq!(next("0 9 * * MON-FRI", utc(2024, 3, 1, 10, 0)), utc(2024, 3, 4, 9, 0));
        assert_eq!(next("0 0 * * 7", utc(2024, 3, 1, 0, 0)), utc(2024, 3, 3, 0, 0));
        assert_eq!(next("0 0 * * sun", utc(2024, 3, 1, 0, 0)), utc(2024, 3, 3, 0, 0));
    }

    #[test]
    fn day_of_month_or_day_of_week() {
        // The 13th or any Friday: from Sat 2024-03-02 the 8th (Fri) comes first.
        assert_eq!(next("0 0 13 * 5", utc(2024, 3, 2, 0, 0)), utc(2024, 3, 8, 0, 0));
        // With a wildcard weekday only the 13th matches.
        assert_eq!(next("0 0 13 * *", utc(2024, 3, 2, 0, 0)), utc(2024, 3, 13, 0, 0));
    }

    #[test]
    fn leap_day() {
        assert_eq!(next("0 0 29 2 *", utc(2024, 3, 1, 0, 0)), utc(2028, 2, 29, 0, 0));
    }

    #[test]
    fn macros() {
        assert_eq!(next("@hourly", utc(2024, 3, 1, 10, 5)), utc(2024, 3, 1, 11, 0));
        assert_eq!(next("@daily", utc(2024, 3, 1, 10, 5)), utc(2024, 3, 2, 0, 0));
        assert_eq!(next("@yearly", utc(2024, 3, 1, 10, 5)), utc(2025, 1, 1, 0, 0));
        assert_eq!(CronSchedule::parse("@weekly").unwrap().expression(), "@weekly");
    }

    #[test]
    fn impossible_dates_never_fire() {
        let schedule = CronSchedule::parse("0 0 30 2 *").unwrap();
        assert!(schedule.next_after(&utc(2024, 1, 1, 0, 0)).is_none());
    }

    #[test]
    fn invalid_expressions_are_rejected() {
        for bad in [
            "invalid cron",
            "* * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "*/0 * * * *",
            "5-1 * * * *",
            "* * * foo *",
            "",
        ] {
            let err = CronSchedule::parse(bad).unwrap_err();
            assert!(
                matches!(err, SchedulerError::InvalidCron { .. }),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn evaluated_in_local_time() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // 12:00 UTC on 2024-01-15 is 07:00 EST.
        let after = utc(2024, 1, 15, 12, 0).with_timezone(&tz);
        let fire = CronSchedule::parse("0 9 * * *").unwrap().next_after(&after).unwrap();
        assert_eq!(fire.with_timezone(&Utc), utc(2024, 1, 15, 14, 0));
    }

    #[test]
    fn skipped_wall_clock_time_is_not_fired() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // 2024-03-10 02:30 does not exist in New York.
        let after = utc(2024, 3, 10, 5, 0).with_timezone(&tz);
        let fire = CronSchedule::parse("30 2 * * *").unwrap().next_after(&after).unwrap();
        assert_eq!(fire.naive_local().date(), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
    }

    #[test]
    fn repeated_wall_clock_time_fires_once() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let schedule = CronSchedule::parse("30 1 * * *").unwrap();
        // 2024-11-03 01:30 happens twice; 04:00 UTC is 00:00 EDT.
        let after = utc(2024, 11, 3, 4, 0).with_timezone(&tz);
        let first = schedule.next_after(&after).unwrap();
        assert_eq!(first.with_timezone(&Utc), utc(2024, 11, 3, 5, 30));

        let second = schedule.next_after(&first).unwrap();
        assert_eq!(second.naive_local().date(), NaiveDate::from_ymd_opt(2024, 11, 4).unwrap());
    }
}
