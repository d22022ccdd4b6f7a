//! Returns, annualization and rolling risk metrics.

use crate::constants::{TRADING_DAYS_PER_YEAR, TRADING_SECONDS_PER_DAY};
use crate::models::BarSize;

/// Simple returns between consecutive defined values, positioned at the
/// later value's index.
pub fn simple_returns(values: &[Option<f64>]) -> Vec<Option<f64>> {
    returns_with(values, |prev, cur| cur / prev - 1.0)
}

/// Log returns between consecutive defined values.
pub fn log_returns(values: &[Option<f64>]) -> Vec<Option<f64>> {
    returns_with(values, |prev, cur| (cur / prev).ln())
}

fn returns_with(values: &[Option<f64>], f: impl Fn(f64, f64) -> f64) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let mut prev: Option<f64> = None;
    for (i, v) in values.iter().enumerate() {
        if let Some(cur) = v {
            if let Some(p) = prev {
                if p > 0.0 && *cur > 0.0 {
                    out[i] = Some(f(p, *cur));
                }
            }
            prev = Some(*cur);
        }
    }
    out
}

/// Returns-per-year factor for a bar size: 252 for daily, scaled by
/// trading seconds per day for intraday, calendar counts above daily.
pub fn periods_per_year(size: BarSize) -> f64 {
    match size {
        BarSize::Day1 => TRADING_DAYS_PER_YEAR,
        BarSize::Week1 => 52.0,
        BarSize::Month1 => 12.0,
        intraday => {
            let bars_per_day = TRADING_SECONDS_PER_DAY / intraday.seconds() as f64;
            TRADING_DAYS_PER_YEAR * bars_per_day
        }
    }
}

/// Rolling annualized Sharpe over `window` return observations
/// (`mean / sample stdev * sqrt(periods_per_year)`), positioned like the
/// other rolling indicators: undefined until the window is full of defined
/// returns.
pub fn rolling_sharpe(returns: &[Option<f64>], window: usize, size: BarSize) -> Vec<Option<f64>> {
    rolling_moment(returns, window, |xs| {
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
        let sd = var.sqrt();
        if sd == 0.0 || !sd.is_finite() {
            None
        } else {
            Some(mean / sd * periods_per_year(size).sqrt())
        }
    })
}

/// Rolling annualized volatility: sample stdev of returns scaled by
/// `sqrt(periods_per_year)`.
pub fn rolling_volatility(returns: &[Option<f64>], window: usize, size: BarSize) -> Vec<Option<f64>> {
    rolling_moment(returns, window, |xs| {
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
        Some(var.sqrt() * periods_per_year(size).sqrt())
    })
}

fn rolling_moment(
    values: &[Option<f64>],
    window: usize,
    f: impl Fn(&[f64]) -> Option<f64>,
) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window < 2 || values.len() < window {
        return out;
    }
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().all(|v| v.is_some()) {
            let xs: Vec<f64> = slice.iter().map(|v| v.expect("checked")).collect();
            out[i] = f(&xs);
        }
    }
    out
}
