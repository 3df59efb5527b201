//! CF time units: `<unit> since <reference date>`.

use crate::error::{FlowError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn seconds(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86400.0,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "second" | "seconds" | "sec" | "secs" | "s" => Ok(TimeUnit::Seconds),
            "minute" | "minutes" | "min" | "mins" => Ok(TimeUnit::Minutes),
            "hour" | "hours" | "hr" | "hrs" | "h" => Ok(TimeUnit::Hours),
            "day" | "days" | "d" => Ok(TimeUnit::Days),
            other => Err(FlowError::InvalidTimeUnits(format!("unknown unit '{}'", other))),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        };
        write!(f, "{}", name)
    }
}

/// Parsed CF time units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub reference: NaiveDateTime,
}

impl TimeUnits {
    pub fn days_since(reference: NaiveDate) -> Self {
        TimeUnits {
            unit: TimeUnit::Days,
            reference: reference.and_time(NaiveTime::MIN),
        }
    }

    /// Converts an offset into a timestamp.
    pub fn decode(&self, offset: f64) -> Result<NaiveDateTime> {
        if !offset.is_finite() {
            return Err(FlowError::InvalidTimeUnits(format!(
                "cannot decode non-finite offset {}",
                offset
            )));
        }
        let millis = (offset * self.unit.seconds() * 1000.0).round() as i64;
        self.reference
            .checked_add_signed(Duration::milliseconds(millis))
            .ok_or_else(|| FlowError::InvalidTimeUnits(format!("offset {} out of range", offset)))
    }

    /// Converts a timestamp back into an offset in these units.
    pub fn encode(&self, time: NaiveDateTime) -> f64 {
        let delta = time - self.reference;
        delta.num_milliseconds() as f64 / 1000.0 / self.unit.seconds()
    }

    pub fn decode_all(&self, offsets: &[f64]) -> Result<Vec<NaiveDateTime>> {
        offsets.iter().map(|o| self.decode(*o)).collect()
    }
}

impl FromStr for TimeUnits {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim();
        let (unit, reference) = lower
            .split_once(" since ")
            .ok_or_else(|| FlowError::InvalidTimeUnits(s.to_string()))?;
        let unit: TimeUnit = unit.trim().parse()?;
        let reference = parse_reference(reference.trim())
            .ok_or_else(|| FlowError::InvalidTimeUnits(s.to_string()))?;
        Ok(TimeUnits { unit, reference })
    }
}

impl fmt::Display for TimeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} since {}",
            self.unit,
            self.reference.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

fn parse_reference(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim_end_matches('Z').trim_end_matches(" UTC").trim();
    let text = text.strip_suffix("+00:00").unwrap_or(text).trim();
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    // Date-only references, with or without zero padding
    let mut parts = text.split('-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u32>().ok()?;
    let day = parts.next()?.parse::<u32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.and_time(NaiveTime::MIN))
}
