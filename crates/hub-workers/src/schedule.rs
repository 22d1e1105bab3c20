//! Capture scheduling

use chrono::{DateTime, TimeDelta, TimeZone, Timelike};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize a value, mapping anything of the wrong shape to `None`
///
/// Camera settings fall back to safe defaults instead of failing startup.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient<T> {
        Valid(T),
        Invalid(IgnoredAny),
    }

    Ok(match Lenient::<T>::deserialize(deserializer)? {
        Lenient::Valid(value) => Some(value),
        Lenient::Invalid(_) => None,
    })
}

fn zero() -> Option<i64> {
    Some(0)
}

/// Delay between scheduled units of work
///
/// A missing field counts as zero; a field that is present but not an
/// integer is `None` and makes the whole delay unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayConfig {
    #[serde(default = "zero", deserialize_with = "lenient")]
    pub hours: Option<i64>,
    #[serde(default = "zero", deserialize_with = "lenient")]
    pub minutes: Option<i64>,
    #[serde(default = "zero", deserialize_with = "lenient")]
    pub seconds: Option<i64>,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

impl DelayConfig {
    pub fn new(hours: i64, minutes: i64, seconds: i64) -> Self {
        Self {
            hours: Some(hours),
            minutes: Some(minutes),
            seconds: Some(seconds),
        }
    }

    /// The delay as a duration, if it is positive and representable
    pub fn to_delta(&self) -> Option<TimeDelta> {
        let (hours, minutes, seconds) = (self.hours?, self.minutes?, self.seconds?);
        if hours < 0 || minutes < 0 || seconds < 0 {
            return None;
        }
        let total = hours
            .checked_mul(3600)?
            .checked_add(minutes.checked_mul(60)?)?
            .checked_add(seconds)?;
        if total == 0 {
            return None;
        }
        TimeDelta::try_seconds(total)
    }
}

/// Image resolution
///
/// Dimensions that are zero or not a valid unsigned integer fall back to
/// 1920x1080.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    #[serde(default = "default_width", deserialize_with = "lenient_dimension")]
    pub x: u32,
    #[serde(default = "default_height", deserialize_with = "lenient_dimension")]
    pub y: u32,
}

fn lenient_dimension<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(lenient(deserializer)?.unwrap_or(0))
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            x: default_width(),
            y: default_height(),
        }
    }
}

impl Resolution {
    /// Replace zero dimensions with the defaults
    pub fn sanitized(self) -> Self {
        Self {
            x: if self.x == 0 { default_width() } else { self.x },
            y: if self.y == 0 { default_height() } else { self.y },
        }
    }
}

/// Next time a unit of work is due
///
/// `now + delay` truncated to whole seconds. A missing or unusable delay
/// schedules the top of the next hour.
pub fn next_scheduled_time<Tz: TimeZone>(
    now: DateTime<Tz>,
    delay: Option<&DelayConfig>,
) -> DateTime<Tz> {
    let scheduled = delay
        .and_then(DelayConfig::to_delta)
        .and_then(|delta| now.clone().checked_add_signed(delta));

    match scheduled {
        Some(at) => at.with_nanosecond(0).unwrap_or(at),
        None => top_of_next_hour(now),
    }
}

/// Start of the hour after `now`
pub fn top_of_next_hour<Tz: TimeZone>(now: DateTime<Tz>) -> DateTime<Tz> {
    let next = now + TimeDelta::hours(1);
    next.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(next)
}

/// Time left until `at`, zero if it has passed
pub fn duration_until<Tz: TimeZone>(at: &DateTime<Tz>, now: &DateTime<Tz>) -> std::time::Duration {
    at.clone()
        .signed_duration_since(now.clone())
        .to_std()
        .unwrap_or_default()
}
