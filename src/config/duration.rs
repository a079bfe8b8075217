//! Human readable durations for config files
//!
//! Accepts strings like `"2s"`, `"1500ms"`, `"1m30s"`, `"1h"`, `"2d"`. A
//! bare number is read as seconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

use super::ConfigError;

/// Parse a duration string like "1h30m", "500ms", "2d"
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ConfigError::InvalidDuration("empty string".to_string()));
    }

    let mut total = Duration::ZERO;
    let mut current_num = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            current_num.push(c);
            continue;
        }
        if c.is_whitespace() {
            continue;
        }

        if current_num.is_empty() {
            return Err(ConfigError::InvalidDuration(format!(
                "expected number before unit '{}' in '{}'",
                c, s
            )));
        }

        let num: f64 = current_num.parse().map_err(|_| {
            ConfigError::InvalidDuration(format!("invalid number: {}", current_num))
        })?;
        current_num.clear();

        let millis = match c {
            'd' => num * 24.0 * 60.0 * 60.0 * 1000.0,
            'h' => num * 60.0 * 60.0 * 1000.0,
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                num
            }
            'm' => num * 60.0 * 1000.0,
            's' => num * 1000.0,
            _ => {
                return Err(ConfigError::InvalidDuration(format!(
                    "unknown unit '{}' in '{}'",
                    c, s
                )))
            }
        };

        total = add(total, Duration::from_millis(millis.round() as u64), s)?;
    }

    // Trailing number without a unit is seconds
    if !current_num.is_empty() {
        let num: f64 = current_num.parse().map_err(|_| {
            ConfigError::InvalidDuration(format!("invalid number: {}", current_num))
        })?;
        let secs = Duration::try_from_secs_f64(num)
            .map_err(|_| ConfigError::InvalidDuration(format!("out of range: {}", s)))?;
        total = add(total, secs, s)?;
    }

    Ok(total)
}

fn add(total: Duration, part: Duration, s: &str) -> Result<Duration, ConfigError> {
    total
        .checked_add(part)
        .ok_or_else(|| ConfigError::InvalidDuration(format!("out of range: {}", s)))
}

/// Render a duration in the shortest form `parse_duration` reads back
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis % 1000 != 0 {
        format!("{}ms", millis)
    } else {
        format!("{}s", millis / 1000)
    }
}

/// serde adapter: `#[serde(with = "crate::config::duration::human")]`
pub mod human {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Seconds(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        }
    }
}
