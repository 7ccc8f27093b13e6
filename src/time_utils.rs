use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;
use thiserror::Error;

/// Time units written to interpolated station files
pub const STATION_TIME_UNITS: &str = "hours since 1900-01-01 00:00:0.0";
/// Time units written to scaled output files
pub const SCALED_TIME_UNITS: &str = "seconds since 1900-01-01 00:00:00";
/// Calendar attribute written to every output file
pub const OUTPUT_CALENDAR: &str = "gregorian";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeError {
    #[error("Invalid time units '{0}'")]
    InvalidUnits(String),

    #[error("Unsupported calendar '{0}'")]
    UnsupportedCalendar(String),

    #[error("Time value {value} is out of range for '{units}'")]
    OutOfRange { value: f64, units: String },
}

/// CF calendars that map onto the proleptic Gregorian timeline used by chrono
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    /// `standard` / `gregorian`
    Standard,
    ProlepticGregorian,
}

impl Calendar {
    pub fn parse(name: &str) -> Result<Self, TimeError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "standard" | "gregorian" => Ok(Calendar::Standard),
            "proleptic_gregorian" => Ok(Calendar::ProlepticGregorian),
            other => Err(TimeError::UnsupportedCalendar(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Calendar::Standard => "gregorian",
            Calendar::ProlepticGregorian => "proleptic_gregorian",
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Some(TimeUnit::Seconds),
            "min" | "mins" | "minute" | "minutes" => Some(TimeUnit::Minutes),
            "h" | "hr" | "hrs" | "hour" | "hours" => Some(TimeUnit::Hours),
            "d" | "day" | "days" => Some(TimeUnit::Days),
            _ => None,
        }
    }

    /// Length of one unit in seconds
    pub fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86400.0,
        }
    }
}

/// Parsed CF time encoding: `<unit> since <epoch>` plus calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeEncoding {
    pub unit: TimeUnit,
    pub epoch: NaiveDateTime,
    pub calendar: Calendar,
    units: String,
}

impl TimeEncoding {
    /// Parse `units` (e.g. `hours since 1900-01-01 00:00:0.0`) and `calendar`
    pub fn parse(units: &str, calendar: &str) -> Result<Self, TimeError> {
        let calendar = Calendar::parse(calendar)?;
        let invalid = || TimeError::InvalidUnits(units.to_string());

        let lower = units.trim().to_ascii_lowercase();
        let (unit, reference) = lower.split_once(" since ").ok_or_else(invalid)?;
        let unit = TimeUnit::parse(unit.trim()).ok_or_else(invalid)?;
        let epoch = parse_reference(reference.trim()).ok_or_else(invalid)?;

        Ok(Self {
            unit,
            epoch,
            calendar,
            units: units.trim().to_string(),
        })
    }

    /// The units string this encoding was parsed from
    pub fn units(&self) -> &str {
        &self.units
    }

    /// Convert a raw time value into an absolute timestamp
    pub fn decode(&self, value: f64) -> Result<NaiveDateTime, TimeError> {
        let out_of_range = || TimeError::OutOfRange {
            value,
            units: self.units.clone(),
        };
        if !value.is_finite() {
            return Err(out_of_range());
        }
        let millis = (value * self.unit.seconds() * 1000.0).round();
        if millis.abs() > i64::MAX as f64 {
            return Err(out_of_range());
        }
        self.epoch
            .checked_add_signed(Duration::milliseconds(millis as i64))
            .ok_or_else(out_of_range)
    }

    /// Convert an absolute timestamp back into a raw value in these units
    pub fn encode(&self, time: NaiveDateTime) -> f64 {
        let millis = (time - self.epoch).num_milliseconds() as f64;
        millis / 1000.0 / self.unit.seconds()
    }

    /// Whether two encodings describe the same time axis convention
    pub fn is_compatible(&self, other: &TimeEncoding) -> bool {
        self.unit == other.unit && self.epoch == other.epoch && self.calendar == other.calendar
    }
}

fn parse_reference(reference: &str) -> Option<NaiveDateTime> {
    let mut parts = reference.split(|c: char| c == ' ' || c == 't').filter(|p| !p.is_empty());
    let date = NaiveDate::parse_from_str(parts.next()?, "%Y-%m-%d").ok()?;

    let time = match parts.next() {
        None => NaiveTime::MIN,
        Some(clock) => {
            let fields: Vec<&str> = clock.trim_end_matches('z').split(':').collect();
            let hour: u32 = fields.first()?.parse().ok()?;
            let minute: u32 = fields.get(1).map_or(Some(0), |m| m.parse().ok())?;
            let seconds: f64 = fields.get(2).map_or(Some(0.0), |s| s.parse().ok())?;
            let whole = seconds.trunc() as u32;
            let milli = ((seconds - seconds.trunc()) * 1000.0).round() as u32;
            NaiveTime::from_hms_milli_opt(hour, minute, whole, milli)?
        }
    };
    Some(date.and_time(time))
}

/// Midnight on 1900-01-01, the epoch of all output files
pub fn epoch_1900() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN)
}

/// Seconds elapsed since 1900-01-01
pub fn seconds_since_1900(time: NaiveDateTime) -> f64 {
    (time - epoch_1900()).num_milliseconds() as f64 / 1000.0
}
