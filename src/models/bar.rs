use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, Result};

/// One OHLCV observation. The timestamp is the UTC instant of the bar open;
/// the bar duration is implied by the request's bar size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self { time, open, high, low, close, volume }
    }
}

/// Bar size accepted by the upstream history API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarSize {
    /// 1-minute bars
    Min1,
    /// 5-minute bars
    Min5,
    /// 15-minute bars
    Min15,
    /// 30-minute bars
    Min30,
    /// 1-hour bars
    Hour1,
    /// Daily bars
    Day1,
    /// Weekly bars
    Week1,
    /// Monthly bars
    Month1,
}

impl BarSize {
    /// Parse the wire form ("1 day") and the short aliases the chart client
    /// sends ("1D", "daily", "5min").
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        let size = match normalized.as_str() {
            "1 min" | "1min" | "1m" => BarSize::Min1,
            "5 mins" | "5min" | "5m" => BarSize::Min5,
            "15 mins" | "15min" | "15m" => BarSize::Min15,
            "30 mins" | "30min" | "30m" => BarSize::Min30,
            "1 hour" | "1h" => BarSize::Hour1,
            "1 day" | "1d" | "daily" => BarSize::Day1,
            "1 week" | "1w" | "weekly" => BarSize::Week1,
            "1 month" | "monthly" => BarSize::Month1,
            _ => {
                return Err(AppError::UnsupportedParameter(format!(
                    "bar_size '{}' (use e.g. '1 min', '1 hour', '1 day', '1 week')",
                    raw
                )))
            }
        };
        Ok(size)
    }

    /// Upstream wire representation.
    pub fn to_wire(&self) -> &'static str {
        match self {
            BarSize::Min1 => "1 min",
            BarSize::Min5 => "5 mins",
            BarSize::Min15 => "15 mins",
            BarSize::Min30 => "30 mins",
            BarSize::Hour1 => "1 hour",
            BarSize::Day1 => "1 day",
            BarSize::Week1 => "1 week",
            BarSize::Month1 => "1 month",
        }
    }

    /// Nominal bar duration in seconds. Weeks and months use calendar
    /// approximations, which is fine for spacing checks and window math.
    pub fn seconds(&self) -> i64 {
        match self {
            BarSize::Min1 => 60,
            BarSize::Min5 => 5 * 60,
            BarSize::Min15 => 15 * 60,
            BarSize::Min30 => 30 * 60,
            BarSize::Hour1 => 3600,
            BarSize::Day1 => 24 * 3600,
            BarSize::Week1 => 7 * 24 * 3600,
            BarSize::Month1 => 30 * 24 * 3600,
        }
    }

    pub fn is_intraday(&self) -> bool {
        matches!(
            self,
            BarSize::Min1 | BarSize::Min5 | BarSize::Min15 | BarSize::Min30 | BarSize::Hour1
        )
    }

    /// Coarseness rank; the evaluator requires one size per request and the
    /// caller picks the coarsest when legs disagree.
    pub fn rank(&self) -> u8 {
        match self {
            BarSize::Min1 => 0,
            BarSize::Min5 => 1,
            BarSize::Min15 => 2,
            BarSize::Min30 => 3,
            BarSize::Hour1 => 4,
            BarSize::Day1 => 5,
            BarSize::Week1 => 6,
            BarSize::Month1 => 7,
        }
    }
}

impl Default for BarSize {
    fn default() -> Self {
        BarSize::Day1
    }
}

impl fmt::Display for BarSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

/// Check the strict-ordering invariant: timestamps strictly increasing and
/// spaced by an integer multiple of the bar size (gaps allowed).
pub fn validate_spacing(bars: &[Bar], size: BarSize) -> Result<()> {
    let step = size.seconds();
    for pair in bars.windows(2) {
        let delta = (pair[1].time - pair[0].time).num_seconds();
        if delta <= 0 {
            return Err(AppError::Invariant(format!(
                "bars out of order at {}",
                pair[1].time
            )));
        }
        // Calendar-sized bars (weekly/monthly) do not land on fixed multiples.
        if step <= 24 * 3600 && delta % step != 0 {
            return Err(AppError::Invariant(format!(
                "bar spacing {}s is not a multiple of {}s at {}",
                delta, step, pair[1].time
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_wire_and_aliases() {
        assert_eq!(BarSize::parse("1 day").unwrap(), BarSize::Day1);
        assert_eq!(BarSize::parse("1D").unwrap(), BarSize::Day1);
        assert_eq!(BarSize::parse("daily").unwrap(), BarSize::Day1);
        assert_eq!(BarSize::parse("5 mins").unwrap(), BarSize::Min5);
        assert_eq!(BarSize::parse("1 hour").unwrap(), BarSize::Hour1);
        assert!(BarSize::parse("2 days").is_err());
    }

    #[test]
    fn wire_round_trip() {
        for size in [
            BarSize::Min1,
            BarSize::Min5,
            BarSize::Min15,
            BarSize::Min30,
            BarSize::Hour1,
            BarSize::Day1,
            BarSize::Week1,
            BarSize::Month1,
        ] {
            assert_eq!(BarSize::parse(size.to_wire()).unwrap(), size);
        }
    }

    #[test]
    fn spacing_validation() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
        let mk = |offset_days: i64| Bar::new(t0 + chrono::Duration::days(offset_days), 1.0, 1.0, 1.0, 1.0, 0.0);

        // Gap of 3 days on daily bars is a valid multiple.
        let bars = vec![mk(0), mk(1), mk(4)];
        assert!(validate_spacing(&bars, BarSize::Day1).is_ok());

        let unordered = vec![mk(1), mk(0)];
        assert!(validate_spacing(&unordered, BarSize::Day1).is_err());
    }
}
