//! Cron Expressions
//!
//! Parser and evaluator for cron expressions:
//!
//! - Standard five fields: `minute hour day-of-month month day-of-week`
//! - An optional leading seconds field (six fields total)
//! - Descriptors: `@hourly`, `@daily`, `@midnight`, `@weekly`, `@monthly`,
//!   `@yearly`, `@annually`
//!
//! Day-of-month and day-of-week are combined with AND: both must match for
//! the expression to fire. Next-fire computation walks real instants in the
//! schedule's timezone, so DST transitions are handled by the timezone
//! rules rather than by naive field arithmetic.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CronError {
    #[error("invalid cron expression '{0}': {1}")]
    InvalidExpression(String, String),
}

/// One field of a cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronField {
    /// `*`
    Any,
    /// A single value, e.g. `5`
    Value(u32),
    /// A comma list, e.g. `1,15,30`
    List(Vec<u32>),
    /// An inclusive range, e.g. `9-17`
    Range(u32, u32),
    /// A stepped range: `*/5` or `10-50/10`
    Step { start: u32, end: u32, step: u32 },
}

impl CronField {
    fn matches(&self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::Value(v) => *v == value,
            CronField::List(values) => values.contains(&value),
            CronField::Range(start, end) => value >= *start && value <= *end,
            CronField::Step { start, end, step } => {
                value >= *start && value <= *end && (value - start) % step == 0
            }
        }
    }

    fn parse(text: &str, min: u32, max: u32) -> Result<Self, String> {
        if text == "*" {
            return Ok(CronField::Any);
        }

        if let Some((base, step)) = text.split_once('/') {
            let step: u32 = step
                .parse()
                .map_err(|_| format!("invalid step '{}'", step))?;
            if step == 0 {
                return Err("step must be at least 1".to_string());
            }

            let (start, end) = if base == "*" {
                (min, max)
            } else if let Some((lo, hi)) = base.split_once('-') {
                (
                    parse_bounded(lo, min, max)?,
                    parse_bounded(hi, min, max)?,
                )
            } else {
                (parse_bounded(base, min, max)?, max)
            };

            if start > end {
                return Err(format!("range {}-{} is inverted", start, end));
            }
            return Ok(CronField::Step { start, end, step });
        }

        if let Some((lo, hi)) = text.split_once('-') {
            let start = parse_bounded(lo, min, max)?;
            let end = parse_bounded(hi, min, max)?;
            if start > end {
                return Err(format!("range {}-{} is inverted", start, end));
            }
            return Ok(CronField::Range(start, end));
        }

        if text.contains(',') {
            let values = text
                .split(',')
                .map(|item| parse_bounded(item, min, max))
                .collect::<Result<Vec<u32>, String>>()?;
            return Ok(CronField::List(values));
        }

        Ok(CronField::Value(parse_bounded(text, min, max)?))
    }
}

fn parse_bounded(text: &str, min: u32, max: u32) -> Result<u32, String> {
    let value: u32 = text
        .parse()
        .map_err(|_| format!("invalid value '{}'", text))?;
    if value < min || value > max {
        return Err(format!("value {} outside {}..={}", value, min, max));
    }
    Ok(value)
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    source: String,
    second: CronField,
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl CronExpression {
    /// Parses a cron expression, descriptor or field form.
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let trimmed = expr.trim();
        let invalid =
            |reason: String| CronError::InvalidExpression(trimmed.to_string(), reason);

        let normalized = match trimmed {
            "@hourly" => "0 * * * *",
            "@daily" | "@midnight" => "0 0 * * *",
            "@weekly" => "0 0 * * 0",
            "@monthly" => "0 0 1 * *",
            "@yearly" | "@annually" => "0 0 1 1 *",
            other if other.starts_with('@') => {
                return Err(invalid(format!("unknown descriptor '{}'", other)));
            }
            other => other,
        };

        let fields: Vec<&str> = normalized.split_whitespace().collect();
        let (second, rest) = match fields.len() {
            5 => (CronField::Value(0), &fields[..]),
            6 => (
                CronField::parse(fields[0], 0, 59).map_err(invalid)?,
                &fields[1..],
            ),
            n => {
                return Err(invalid(format!("expected 5 or 6 fields, got {}", n)));
            }
        };

        Ok(Self {
            source: trimmed.to_string(),
            second,
            minute: CronField::parse(rest[0], 0, 59).map_err(invalid)?,
            hour: CronField::parse(rest[1], 0, 23).map_err(invalid)?,
            day_of_month: CronField::parse(rest[2], 1, 31).map_err(invalid)?,
            month: CronField::parse(rest[3], 1, 12).map_err(invalid)?,
            day_of_week: CronField::parse(rest[4], 0, 7).map_err(invalid)?,
        })
    }

    /// The expression as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the expression fires at the given instant.
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        self.minute_matches(at) && self.second.matches(at.second())
    }

    fn minute_matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        // Sunday is both 0 and 7
        let weekday = at.weekday().num_days_from_sunday();
        let dow = self.day_of_week.matches(weekday) || (weekday == 0 && self.day_of_week.matches(7));

        self.minute.matches(at.minute())
            && self.hour.matches(at.hour())
            && self.day_of_month.matches(at.day())
            && self.month.matches(at.month())
            && dow
    }

    /// The next instant strictly after `after` at which the expression
    /// fires, in the same timezone.
    ///
    /// Returns `None` if no match is found within roughly five years,
    /// which only happens for impossible dates (e.g. February 30th).
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut t = after.clone() + Duration::seconds(1);

        // Walk minute by minute, then pick the matching second inside
        let limit = 60 * 24 * 366 * 5;
        for _ in 0..limit {
            if self.minute_matches(&t) {
                let from_second = t.second();
                for second in from_second..60 {
                    if self.second.matches(second) {
                        return Some(t.clone() + Duration::seconds((second - from_second) as i64));
                    }
                }
            }
            // Jump to the start of the next minute
            t = t.clone() + Duration::seconds(60 - t.second() as i64);
        }
        None
    }

    /// The next `count` fire instants strictly after `after`.
    pub fn next_run_times<Tz: TimeZone>(
        &self,
        after: &DateTime<Tz>,
        count: usize,
    ) -> Vec<DateTime<Tz>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = after.clone();
        for _ in 0..count {
            match self.next_after(&cursor) {
                Some(next) => {
                    cursor = next.clone();
                    times.push(next);
                }
                None => break,
            }
        }
        times
    }
}

/// Frequently used expressions, for help output and admin UIs.
pub fn common_presets() -> &'static [(&'static str, &'static str)] {
    &[
        ("every minute", "* * * * *"),
        ("every 5 minutes", "*/5 * * * *"),
        ("every 15 minutes", "*/15 * * * *"),
        ("every 30 minutes", "*/30 * * * *"),
        ("hourly", "0 * * * *"),
        ("daily at midnight", "0 0 * * *"),
        ("daily at 2am", "0 2 * * *"),
        ("weekdays at 9am", "0 9 * * 1-5"),
        ("weekly on Sunday", "0 0 * * 0"),
        ("monthly on the 1st", "0 0 1 * *"),
    ]
}
