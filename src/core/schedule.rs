//! Cron schedule parsing and next occurrence calculation.
//!
//! Supports standard 5-field cron expressions and the usual shortcuts
//! (@daily, @hourly, etc.). All evaluation happens in UTC.

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing or using schedules.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// No more occurrences.
    #[error("no more occurrences")]
    NoMoreOccurrences,
}

/// A parsed cron schedule.
///
/// Day-of-month and day-of-week combine the way classic cron does: when
/// both are restricted a day matches if either field matches. That case is
/// held as two schedules whose occurrences are merged.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// The original expression string.
    expression: String,
    /// One schedule, or two when both day fields are restricted.
    schedules: Vec<CronSchedule>,
}

/// Weekday names in standard cron order, Sunday = 0.
const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

impl Schedule {
    /// Parse a cron expression.
    ///
    /// Supports:
    /// - Standard 5-field cron: `minute hour day month weekday`, with
    ///   weekdays `0-7` (0 and 7 are Sunday) or `SUN`..`SAT`
    /// - Shortcuts: `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`,
    ///   `@midnight`, `@hourly`
    pub fn new(expression: impl Into<String>) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        let schedules = Self::parse_expression(&expression)?;
        Ok(Self {
            expression,
            schedules,
        })
    }

    fn parse_expression(expression: &str) -> Result<Vec<CronSchedule>, ScheduleError> {
        let trimmed = expression.trim();

        if trimmed.starts_with('@') {
            return Self::parse_shortcut(trimmed);
        }

        Self::parse_cron(trimmed)
    }

    fn parse_shortcut(expression: &str) -> Result<Vec<CronSchedule>, ScheduleError> {
        match expression.to_lowercase().as_str() {
            "@yearly" | "@annually" => Self::parse_cron("0 0 1 1 *"),
            "@monthly" => Self::parse_cron("0 0 1 * *"),
            "@weekly" => Self::parse_cron("0 0 * * 0"),
            "@daily" | "@midnight" => Self::parse_cron("0 0 * * *"),
            "@hourly" => Self::parse_cron("0 * * * *"),
            _ => Err(ScheduleError::InvalidCron(format!(
                "unknown shortcut: {}",
                expression
            ))),
        }
    }

    fn parse_cron(expression: &str) -> Result<Vec<CronSchedule>, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let &[minute, hour, day, month, weekday] = fields.as_slice() else {
            return Err(ScheduleError::InvalidCron(format!(
                "expected 5 fields, got {}",
                fields.len()
            )));
        };

        let day_restricted = !is_wildcard(day);
        let weekday = if is_wildcard(weekday) {
            None
        } else {
            Some(translate_weekdays(weekday)?)
        };

        // The cron crate wants a leading seconds field.
        let build = |day: &str, weekday: &str| {
            let cron_expr = format!("0 {} {} {} {} {}", minute, hour, day, month, weekday);
            CronSchedule::from_str(&cron_expr)
                .map_err(|e| ScheduleError::InvalidCron(e.to_string()))
        };

        match weekday {
            Some(weekday) if day_restricted => {
                Ok(vec![build(day, "*")?, build("*", weekday.as_str())?])
            }
            Some(weekday) => Ok(vec![build("*", weekday.as_str())?]),
            None => Ok(vec![build(day, "*")?]),
        }
    }

    /// Get the next occurrence strictly after the given time.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(&after).find(|next| *next > after))
            .min()
            .ok_or(ScheduleError::NoMoreOccurrences)
    }

    /// Get the next N occurrences after the given time.
    pub fn next_n_after(&self, after: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
        let mut occurrences: Vec<DateTime<Utc>> = self
            .schedules
            .iter()
            .flat_map(|schedule| {
                schedule
                    .after(&after)
                    .filter(|next| *next > after)
                    .take(n)
            })
            .collect();
        occurrences.sort();
        occurrences.dedup();
        occurrences.truncate(n);
        occurrences
    }

    /// Get the original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

fn is_wildcard(field: &str) -> bool {
    field == "*" || field == "?"
}

/// Rewrite a standard weekday field (Sunday = 0 or 7) as the list of
/// day numbers the cron crate expects (Sunday = 1).
fn translate_weekdays(field: &str) -> Result<String, ScheduleError> {
    let mut days = [false; 7];

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u8 = step
                    .parse()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| invalid_weekday(part))?;
                (range, Some(step))
            }
            None => (part, None),
        };

        let (first, last) = match range.split_once('-') {
            _ if is_wildcard(range) => (0, 6),
            Some((first, last)) => (parse_weekday(first)?, parse_weekday(last)?),
            // `N/step` runs from N to the end of the week.
            None if step.is_some() => (parse_weekday(range)?, 6),
            None => {
                let day = parse_weekday(range)?;
                (day, day)
            }
        };
        if first > last {
            return Err(invalid_weekday(part));
        }

        for day in (first..=last).step_by(usize::from(step.unwrap_or(1))) {
            days[usize::from(day % 7)] = true;
        }
    }

    let list: Vec<String> = (0u8..7)
        .filter(|day| days[usize::from(*day)])
        .map(|day| (day + 1).to_string())
        .collect();
    Ok(list.join(","))
}

fn parse_weekday(value: &str) -> Result<u8, ScheduleError> {
    if let Ok(day) = value.parse::<u8>() {
        return if day <= 7 {
            Ok(day)
        } else {
            Err(invalid_weekday(value))
        };
    }
    WEEKDAY_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(value))
        .map(|day| day as u8)
        .ok_or_else(|| invalid_weekday(value))
}

fn invalid_weekday(value: &str) -> ScheduleError {
    ScheduleError::InvalidCron(format!("invalid day of week: {}", value))
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Compute the next due instant of `expression` strictly after `after`.
pub fn next_due(expression: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    Schedule::new(expression)?.next_after(after)
}
