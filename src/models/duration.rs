use chrono::{DateTime, Datelike, Duration, Utc, Weekday};

use crate::error::{AppError, Result};
use crate::models::BarSize;

/// A lookback request: `"<N> <U>"` with U in {D, W, M, Y}, or the MTD/YTD
/// presets. `D` counts business days; the rest are calendar spans ending at
/// request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationToken {
    BusinessDays(u32),
    Weeks(u32),
    Months(u32),
    Years(u32),
    MonthToDate,
    YearToDate,
}

impl DurationToken {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "MTD" => return Ok(DurationToken::MonthToDate),
            "YTD" => return Ok(DurationToken::YearToDate),
            _ => {}
        }

        let mut parts = trimmed.split_whitespace();
        let (n_str, unit) = match (parts.next(), parts.next(), parts.next()) {
            (Some(n), Some(u), None) => (n, u),
            _ => {
                return Err(AppError::UnsupportedParameter(format!(
                    "duration '{}' (use like '5 D', '3 M', '2 Y', 'YTD')",
                    raw
                )))
            }
        };

        let n: u32 = n_str.parse().map_err(|_| {
            AppError::UnsupportedParameter(format!("duration count '{}' is not a number", n_str))
        })?;
        if n == 0 {
            return Err(AppError::EmptyRange(format!("duration '{}' spans nothing", raw)));
        }

        match unit.to_ascii_uppercase().as_str() {
            "D" => Ok(DurationToken::BusinessDays(n)),
            "W" => Ok(DurationToken::Weeks(n)),
            "M" => Ok(DurationToken::Months(n)),
            "Y" => Ok(DurationToken::Years(n)),
            other => Err(AppError::UnsupportedParameter(format!(
                "duration unit '{}' (use D, W, M or Y)",
                other
            ))),
        }
    }

    /// Resolve into a half-open `[start, end)` range ending at `end`.
    pub fn resolve(&self, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = match self {
            DurationToken::BusinessDays(n) => subtract_business_days(end, *n),
            DurationToken::Weeks(n) => end - Duration::weeks(*n as i64),
            DurationToken::Months(n) => shift_months(end, -(*n as i32)),
            DurationToken::Years(n) => shift_months(end, -(*n as i32) * 12),
            DurationToken::MonthToDate => end
                .date_naive()
                .with_day(1)
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc())
                .unwrap_or(end),
            DurationToken::YearToDate => end
                .date_naive()
                .with_day(1)
                .and_then(|d| d.with_month(1))
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc())
                .unwrap_or(end),
        };
        (start, end)
    }
}

fn subtract_business_days(end: DateTime<Utc>, n: u32) -> DateTime<Utc> {
    let mut date = end.date_naive();
    let mut remaining = n;
    while remaining > 0 {
        date = date.pred_opt().expect("date underflow");
        match date.weekday() {
            Weekday::Sat | Weekday::Sun => {}
            _ => remaining -= 1,
        }
    }
    date.and_hms_opt(0, 0, 0).unwrap().and_utc()
}

fn shift_months(ts: DateTime<Utc>, months: i32) -> DateTime<Utc> {
    let date = ts.date_naive();
    let zero_based = date.year() * 12 + date.month0() as i32 + months;
    let (year, month0) = (zero_based.div_euclid(12), zero_based.rem_euclid(12) as u32);
    // Clamp the day for short months.
    let day = date.day();
    let mut result = None;
    for d in (1..=day).rev() {
        if let Some(nd) = chrono::NaiveDate::from_ymd_opt(year, month0 + 1, d) {
            result = Some(nd);
            break;
        }
    }
    result
        .map(|d| d.and_time(ts.time()).and_utc())
        .unwrap_or(ts)
}

/// Rolling-window tokens like `10d`, `3w`, `2m`, `5y`, converted to a bar
/// count for the request's bar size. Intraday sizes scale by a 390-minute
/// trading day; the result is never below 2 bars.
pub fn window_to_bars(raw: &str, size: BarSize) -> Result<usize> {
    let trimmed = raw.trim().to_ascii_lowercase();
    let split = trimmed
        .char_indices()
        .find(|(_, c)| c.is_ascii_alphabetic())
        .map(|(i, _)| i)
        .ok_or_else(|| {
            AppError::UnsupportedParameter(format!("window '{}' (use like 10d, 3w, 2m, 5y)", raw))
        })?;
    let (num, unit) = trimmed.split_at(split);
    let n: f64 = num.trim().parse().map_err(|_| {
        AppError::UnsupportedParameter(format!("window count '{}' is not a number", num))
    })?;

    let days = match unit.trim() {
        "d" => n,
        "w" => n * 7.0,
        "m" => n * 30.0,
        "y" => n * 365.0,
        other => {
            return Err(AppError::UnsupportedParameter(format!(
                "window unit '{}' (use d, w, m or y)",
                other
            )))
        }
    };

    let days_per_bar = match size {
        BarSize::Min1 => 1.0 / 390.0,
        BarSize::Min5 => 5.0 / 390.0,
        BarSize::Min15 => 15.0 / 390.0,
        BarSize::Min30 => 30.0 / 390.0,
        BarSize::Hour1 => 60.0 / 390.0,
        BarSize::Day1 => 1.0,
        BarSize::Week1 => 7.0,
        BarSize::Month1 => 30.0,
    };

    Ok(((days / days_per_bar).round() as usize).max(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_duration_tokens() {
        assert_eq!(DurationToken::parse("5 D").unwrap(), DurationToken::BusinessDays(5));
        assert_eq!(DurationToken::parse("3 m").unwrap(), DurationToken::Months(3));
        assert_eq!(DurationToken::parse("ytd").unwrap(), DurationToken::YearToDate);
        assert!(DurationToken::parse("5D").is_err());
        assert!(DurationToken::parse("0 D").is_err());
        assert!(DurationToken::parse("5 Q").is_err());
    }

    #[test]
    fn business_days_skip_weekends() {
        // Monday 2025-06-09; 5 business days back lands on the prior Monday.
        let end = Utc.with_ymd_and_hms(2025, 6, 9, 12, 0, 0).unwrap();
        let (start, _) = DurationToken::BusinessDays(5).resolve(end);
        assert_eq!(start.date_naive(), chrono::NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
    }

    #[test]
    fn mtd_and_ytd_anchor_at_period_start() {
        let end = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let (mtd, _) = DurationToken::MonthToDate.resolve(end);
        assert_eq!(mtd.date_naive(), chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        let (ytd, _) = DurationToken::YearToDate.resolve(end);
        assert_eq!(ytd.date_naive(), chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn month_shift_clamps_short_months() {
        let end = Utc.with_ymd_and_hms(2025, 3, 31, 0, 0, 0).unwrap();
        let (start, _) = DurationToken::Months(1).resolve(end);
        assert_eq!(start.date_naive(), chrono::NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    }

    #[test]
    fn window_bar_counts() {
        assert_eq!(window_to_bars("10d", BarSize::Day1).unwrap(), 10);
        assert_eq!(window_to_bars("2m", BarSize::Day1).unwrap(), 60);
        assert_eq!(window_to_bars("1d", BarSize::Hour1).unwrap(), 7); // 390/60 rounded
        assert_eq!(window_to_bars("1d", BarSize::Month1).unwrap(), 2); // floor of 2
        assert!(window_to_bars("10", BarSize::Day1).is_err());
    }
}
