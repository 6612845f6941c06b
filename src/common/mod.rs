//! Common utilities shared across the crate

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

use std::time::Duration;

pub use error::{Error, Result};

/// Parse a humanized duration such as `10s`, `500ms`, `1m30s` or `2h`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(Error::Config("empty duration".to_string()));
    }
    if let Ok(secs) = s.parse::<f64>() {
        return duration_from_secs(secs, input);
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| Error::Config(format!("missing unit in duration '{}'", input)))?;
        let (num, tail) = rest.split_at(num_len);
        let value: f64 = num
            .parse()
            .map_err(|_| Error::Config(format!("invalid duration '{}'", input)))?;
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => {
                return Err(Error::Config(format!(
                    "unknown unit '{}' in duration '{}'",
                    unit, input
                )))
            }
        };
        total += value * scale;
        rest = next;
    }
    duration_from_secs(total, input)
}

fn duration_from_secs(secs: f64, input: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| Error::Config(format!("invalid duration '{}'", input)))
}
