/// Five-field schedule expressions (`minute hour day month weekday`)
///
/// Each field is `*`, `*/n`, `a-b`, a comma list of values or ranges, or a bare
/// integer, within 0-59, 0-23, 1-31, 1-12 and 0-7 (0 and 7 are both Sunday).
/// Evaluation is done in UTC.

use crate::error::TriggerError;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

const FIELD_NAMES: [&str; 5] = ["minute", "hour", "day of month", "month", "day of week"];
const FIELD_BOUNDS: [(u32, u32); 5] = [(0, 59), (0, 23), (1, 31), (1, 12), (0, 7)];
const DAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];
const DAY_TITLES: [&str; 8] = [
    "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

/// Upper bound on calendar steps taken by `next_fire_after`
const MAX_SEARCH_STEPS: usize = 100_000;

/// One parsed field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronField {
    raw: String,
    values: BTreeSet<u32>,
}

impl CronField {
    fn parse(raw: &str, index: usize, expression: &str) -> Result<Self, TriggerError> {
        let (min, max) = FIELD_BOUNDS[index];
        let invalid = |reason: String| TriggerError::InvalidSchedule {
            expression: expression.to_string(),
            reason: format!("{} field '{}' {}", FIELD_NAMES[index], raw, reason),
        };
        let number = |text: &str| -> Result<u32, TriggerError> {
            let value: u32 = text
                .parse()
                .map_err(|_| invalid(format!("has non-numeric value '{}'", text)))?;
            if value < min || value > max {
                return Err(invalid(format!("is out of range {}-{}", min, max)));
            }
            Ok(value)
        };

        let mut values = BTreeSet::new();
        if raw == "*" {
            values.extend(min..=max);
        } else if let Some(step) = raw.strip_prefix("*/") {
            let step: u32 = step
                .parse()
                .map_err(|_| invalid("has a non-numeric step".to_string()))?;
            if step == 0 || step > max {
                return Err(invalid(format!("step must be between 1 and {}", max)));
            }
            values.extend((min..=max).step_by(step as usize));
        } else {
            for item in raw.split(',') {
                match item.split_once('-') {
                    Some((start, end)) => {
                        let (start, end) = (number(start)?, number(end)?);
                        if start > end {
                            return Err(invalid(format!("has a descending range {}-{}", start, end)));
                        }
                        values.extend(start..=end);
                    }
                    None => {
                        values.insert(number(item)?);
                    }
                }
            }
        }

        // Sunday is 0 for evaluation
        if index == 4 && values.remove(&7) {
            values.insert(0);
        }

        Ok(Self {
            raw: raw.to_string(),
            values,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn contains(&self, value: u32) -> bool {
        self.values.contains(&value)
    }

    /// Fields not starting with `*` restrict the calendar
    fn is_restricted(&self) -> bool {
        !self.raw.starts_with('*')
    }

    fn step(&self) -> Option<u32> {
        self.raw.strip_prefix("*/").and_then(|s| s.parse().ok())
    }

    fn single(&self) -> Option<u32> {
        self.raw.parse().ok()
    }
}

/// A validated schedule expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleExpression {
    expression: String,
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl ScheduleExpression {
    pub fn parse(expression: &str) -> Result<Self, TriggerError> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(TriggerError::InvalidSchedule {
                expression: expression.to_string(),
                reason: format!("expected 5 fields, got {}", parts.len()),
            });
        }

        let field = |index: usize| CronField::parse(parts[index], index, expression);
        Ok(Self {
            expression: parts.join(" "),
            minute: field(0)?,
            hour: field(1)?,
            day_of_month: field(2)?,
            month: field(3)?,
            day_of_week: field(4)?,
        })
    }

    pub fn validate(expression: &str) -> Result<(), TriggerError> {
        Self::parse(expression).map(|_| ())
    }

    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// Human-readable description
    pub fn describe(&self) -> String {
        let (m, h, dom, mon, dow) = (
            &self.minute,
            &self.hour,
            &self.day_of_month,
            &self.month,
            &self.day_of_week,
        );
        let every_day = dom.raw == "*" && mon.raw == "*" && dow.raw == "*";

        if every_day && h.raw == "*" {
            if m.raw == "*" || m.step() == Some(1) {
                return "Every minute".to_string();
            }
            if let Some(n) = m.step() {
                return format!("Every {} minutes", n);
            }
            if m.raw == "0" {
                return "Every hour".to_string();
            }
            if let Some(minute) = m.single() {
                return format!("At minute {} of every hour", minute);
            }
        }

        if every_day && m.raw == "0" {
            if let Some(n) = h.step() {
                return if n == 1 {
                    "Every hour".to_string()
                } else {
                    format!("Every {} hours", n)
                };
            }
        }

        if let (Some(minute), Some(hour)) = (m.single(), h.single()) {
            let at = if minute == 0 && hour == 0 {
                "midnight".to_string()
            } else {
                format!("{:02}:{:02}", hour, minute)
            };

            if every_day {
                return format!("Every day at {}", at);
            }
            if dom.raw == "*" && mon.raw == "*" {
                if dow.raw == "1-5" {
                    return format!("Every weekday at {}", at);
                }
                if let Some(day) = dow.single() {
                    return format!("Every {} at {}", DAY_TITLES[day as usize], at);
                }
            }
            if mon.raw == "*" && dow.raw == "*" {
                if let Some(day) = dom.single() {
                    return format!("On day {} of every month at {}", day, at);
                }
            }
        }

        let part = |field: &CronField| {
            if field.raw == "*" {
                "every".to_string()
            } else {
                field.raw.clone()
            }
        };
        format!(
            "Runs at minute {}, hour {}, day-of-month {}, month {}, day-of-week {}",
            part(m),
            part(h),
            part(dom),
            part(mon),
            part(dow)
        )
    }

    /// Coarse cadence used when the cron engine can't evaluate the expression
    ///
    /// Only the cadence is approximated; ticks don't line up with wall-clock boundaries.
    pub fn approximate_interval(&self) -> Duration {
        if self.minute.raw == "*" {
            return Duration::from_secs(60);
        }
        if let Some(n) = self.minute.step() {
            return Duration::from_secs(60 * u64::from(n));
        }
        if self.hour.raw == "*" {
            return Duration::from_secs(3_600);
        }
        if let Some(n) = self.hour.step() {
            return Duration::from_secs(3_600 * u64::from(n));
        }
        Duration::from_secs(86_400)
    }

    /// Six-field form for the cron engine, with weekdays as a list of day names
    ///
    /// Weekdays are listed from the parsed set, so ranges ending at 7 (`5-7`) come out
    /// in ascending Sunday-first order.
    pub fn to_cron6(&self) -> String {
        let weekdays = if self.day_of_week.raw == "*" {
            "*".to_string()
        } else {
            self.day_of_week
                .values
                .iter()
                .filter_map(|&day| DAY_NAMES.get(day as usize))
                .copied()
                .collect::<Vec<_>>()
                .join(",")
        };

        format!(
            "0 {} {} {} {} {}",
            self.minute.raw,
            self.hour.raw,
            self.day_of_month.raw,
            self.month.raw,
            weekdays
        )
    }

    /// Whether a minute-aligned instant matches every field
    pub fn matches(&self, at: &DateTime<Utc>) -> bool {
        self.month.contains(at.month())
            && self.day_matches(at)
            && self.hour.contains(at.hour())
            && self.minute.contains(at.minute())
    }

    /// Best-effort next fire time strictly after `after`
    ///
    /// Walks forward minute by minute, skipping whole months, days and hours that can't
    /// match. Returns `None` if nothing matches within the search bound.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = after.with_second(0)?.with_nanosecond(0)? + ChronoDuration::minutes(1);

        for _ in 0..MAX_SEARCH_STEPS {
            if !self.month.contains(t.month()) {
                let (year, month) = if t.month() == 12 {
                    (t.year() + 1, 1)
                } else {
                    (t.year(), t.month() + 1)
                };
                t = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()?;
                continue;
            }
            if !self.day_matches(&t) {
                let next_day = t.date_naive().succ_opt()?.and_hms_opt(0, 0, 0)?;
                t = Utc.from_utc_datetime(&next_day);
                continue;
            }
            if !self.hour.contains(t.hour()) {
                t = t.with_minute(0)? + ChronoDuration::hours(1);
                continue;
            }
            if !self.minute.contains(t.minute()) {
                t += ChronoDuration::minutes(1);
                continue;
            }
            return Some(t);
        }

        None
    }

    /// Day-of-month and day-of-week: either matches when both are restricted
    fn day_matches(&self, at: &DateTime<Utc>) -> bool {
        let dom = self.day_of_month.contains(at.day());
        let dow = self.day_of_week.contains(at.weekday().num_days_from_sunday());

        if self.day_of_month.is_restricted() && self.day_of_week.is_restricted() {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl fmt::Display for ScheduleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_validation_bounds() {
        assert!(ScheduleExpression::validate("61 * * * *").is_err());
        assert!(ScheduleExpression::validate("*/5 * * * *").is_ok());
        assert!(ScheduleExpression::validate("* * * *").is_err());
        assert!(ScheduleExpression::validate("* * * * * *").is_err());
        assert!(ScheduleExpression::validate("0 24 * * *").is_err());
        assert!(ScheduleExpression::validate("0 0 0 * *").is_err());
        assert!(ScheduleExpression::validate("0 0 * 13 *").is_err());
        assert!(ScheduleExpression::validate("0 0 * * 8").is_err());
        assert!(ScheduleExpression::validate("*/0 * * * *").is_err());
        assert!(ScheduleExpression::validate("5-1 * * * *").is_err());
        assert!(ScheduleExpression::validate("0,15,30,45 9-17 * * 1-5").is_ok());
        assert!(ScheduleExpression::validate("0 0 * * 7").is_ok());

        let err = ScheduleExpression::parse("61 * * * *").unwrap_err();
        assert!(err.to_string().contains("minute field '61'"));
    }

    #[test]
    fn test_describe_canonical_expressions() {
        let describe = |e: &str| ScheduleExpression::parse(e).unwrap().describe();

        assert_eq!(describe("*/5 * * * *"), "Every 5 minutes");
        assert_eq!(describe("* * * * *"), "Every minute");
        assert_eq!(describe("0 * * * *"), "Every hour");
        assert_eq!(describe("0 */6 * * *"), "Every 6 hours");
        assert_eq!(describe("0 0 * * *"), "Every day at midnight");
        assert_eq!(describe("30 9 * * *"), "Every day at 09:30");
        assert_eq!(describe("0 9 * * 1-5"), "Every weekday at 09:00");
        assert_eq!(describe("0 0 * * 0"), "Every Sunday at midnight");
        assert_eq!(describe("15 8 1 * *"), "On day 1 of every month at 08:15");
        assert!(describe("0 0 1 1 *").starts_with("Runs at minute 0"));
    }

    #[test]
    fn test_approximate_interval() {
        let interval = |e: &str| ScheduleExpression::parse(e).unwrap().approximate_interval();

        assert_eq!(interval("* * * * *"), Duration::from_secs(60));
        assert_eq!(interval("*/15 * * * *"), Duration::from_secs(900));
        assert_eq!(interval("5 * * * *"), Duration::from_secs(3_600));
        assert_eq!(interval("0 9 * * *"), Duration::from_secs(86_400));
    }

    #[test]
    fn test_cron6_uses_day_names() {
        let cron = |e: &str| ScheduleExpression::parse(e).unwrap().to_cron6();

        assert_eq!(cron("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(cron("0 9 * * 1-5"), "0 0 9 * * MON,TUE,WED,THU,FRI");
        assert_eq!(cron("0 9 * * 0,6"), "0 0 9 * * SUN,SAT");
        assert_eq!(cron("0 9 * * 7"), "0 0 9 * * SUN");
        assert_eq!(cron("0 9 * * 6-7"), "0 0 9 * * SUN,SAT");
        assert_eq!(cron("0 9 * * 5-7"), "0 0 9 * * SUN,FRI,SAT");
        assert_eq!(cron("0 9 * * */2"), "0 0 9 * * SUN,TUE,THU,SAT");
    }

    #[test]
    fn test_next_fire_after() {
        let every_five = ScheduleExpression::parse("*/5 * * * *").unwrap();
        assert_eq!(
            every_five.next_fire_after(at(2024, 1, 1, 10, 2)),
            Some(at(2024, 1, 1, 10, 5))
        );
        assert_eq!(
            every_five.next_fire_after(at(2024, 1, 1, 10, 5)),
            Some(at(2024, 1, 1, 10, 10))
        );

        // 2024-01-01 is a Monday
        let mondays = ScheduleExpression::parse("0 9 * * 1").unwrap();
        assert_eq!(
            mondays.next_fire_after(at(2024, 1, 1, 10, 0)),
            Some(at(2024, 1, 8, 9, 0))
        );

        let monthly = ScheduleExpression::parse("30 8 1 * *").unwrap();
        assert_eq!(
            monthly.next_fire_after(at(2024, 12, 15, 0, 0)),
            Some(at(2025, 1, 1, 8, 30))
        );

        let leap_day = ScheduleExpression::parse("0 0 29 2 *").unwrap();
        assert_eq!(
            leap_day.next_fire_after(at(2024, 3, 1, 0, 0)),
            Some(at(2028, 2, 29, 0, 0))
        );
        assert!(leap_day.matches(&at(2028, 2, 29, 0, 0)));
    }
}
