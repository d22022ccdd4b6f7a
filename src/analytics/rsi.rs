//! Wilder's RSI with band presets.

use crate::error::{AppError, Result};

/// Band presets for the RSI panel. An explicit `levels` array on the
/// request overrides the preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsiBands {
    Classic,
    Strict,
    Full,
    None,
}

impl RsiBands {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "classic" => Ok(RsiBands::Classic),
            "strict" => Ok(RsiBands::Strict),
            "full" => Ok(RsiBands::Full),
            "none" => Ok(RsiBands::None),
            other => Err(AppError::UnsupportedParameter(format!(
                "bands '{}' (use classic, strict, full or none)",
                other
            ))),
        }
    }

    pub fn levels(&self) -> Vec<f64> {
        match self {
            RsiBands::Classic => vec![70.0, 30.0],
            RsiBands::Strict => vec![80.0, 20.0],
            RsiBands::Full => vec![80.0, 70.0, 50.0, 30.0, 20.0],
            RsiBands::None => Vec::new(),
        }
    }
}

/// Wilder's RSI over a value vector with explicit gaps.
///
/// Averages seed with the simple mean of the first `period` gains/losses
/// (so the first defined output sits at index `period`), then smooth
/// recursively: `avg = (prev * (period - 1) + current) / period`. Output is
/// clipped to [0, 100]; gap positions stay undefined and do not reset the
/// smoothing state.
pub fn rsi(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < 2 {
        return out;
    }

    // Changes between consecutive *defined* values, tracked positionally.
    let mut prev_value: Option<f64> = None;
    let mut deltas: Vec<(usize, f64)> = Vec::new();
    for (i, v) in values.iter().enumerate() {
        if let Some(value) = v {
            if let Some(prev) = prev_value {
                deltas.push((i, value - prev));
            }
            prev_value = Some(*value);
        }
    }

    if deltas.len() < period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for (step, &(idx, change)) in deltas.iter().enumerate() {
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        if step < period - 1 {
            avg_gain += gain;
            avg_loss += loss;
            continue;
        }
        if step == period - 1 {
            avg_gain = (avg_gain + gain) / period as f64;
            avg_loss = (avg_loss + loss) / period as f64;
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }

        let value = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        };
        out[idx] = Some(value.clamp(0.0, 100.0));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defined(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|&v| Some(v)).collect()
    }

    #[test]
    fn warmup_ends_at_period_index() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + (i % 5) as f64).collect();
        let out = rsi(&defined(&closes), 14);
        for i in 0..14 {
            assert_eq!(out[i], None, "index {} should be warmup", i);
        }
        assert!(out[14].is_some(), "first defined value at index P");
    }

    #[test]
    fn values_stay_in_range() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + ((i * 7) % 13) as f64 - 6.0)
            .collect();
        let out = rsi(&defined(&closes), 14);
        for v in out.into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v), "rsi {} out of range", v);
        }
    }

    #[test]
    fn monotonic_gains_pin_at_hundred() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&defined(&closes), 14);
        assert!((out[14].unwrap() - 100.0).abs() < 1e-12);
    }

    #[test]
    fn monotonic_losses_pin_at_zero() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&defined(&closes), 14);
        assert!(out[14].unwrap() < 1e-12);
    }

    #[test]
    fn short_input_yields_all_gaps() {
        let out = rsi(&defined(&[100.0]), 14);
        assert!(out.iter().all(|v| v.is_none()));
        let out = rsi(&defined(&[100.0, 101.0, 102.0]), 14);
        assert!(out.iter().all(|v| v.is_none()));
    }

    #[test]
    fn gaps_do_not_reset_smoothing() {
        let mut closes = defined(&(0..30).map(|i| 100.0 + (i % 3) as f64).collect::<Vec<_>>());
        closes[20] = None;
        let out = rsi(&closes, 5);
        assert_eq!(out[20], None);
        // The positions after the gap keep producing values.
        assert!(out[21].is_some());
    }

    #[test]
    fn band_presets() {
        assert_eq!(RsiBands::parse("classic").unwrap().levels(), vec![70.0, 30.0]);
        assert_eq!(RsiBands::parse("strict").unwrap().levels(), vec![80.0, 20.0]);
        assert_eq!(RsiBands::parse("full").unwrap().levels().len(), 5);
        assert!(RsiBands::parse("none").unwrap().levels().is_empty());
        assert!(RsiBands::parse("wild").is_err());
    }
}
