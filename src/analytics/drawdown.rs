//! Underwater curves.

/// Point drawdown: `100 * (price - running_max) / running_max`, running max
/// cumulative from the first defined value. Always <= 0; the first defined
/// output is 0.
pub fn drawdown(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let mut peak: Option<f64> = None;
    for (i, v) in values.iter().enumerate() {
        if let Some(value) = v {
            let p = match peak {
                Some(p) => p.max(*value),
                None => *value,
            };
            peak = Some(p);
            if p > 0.0 {
                out[i] = Some(100.0 * (value - p) / p);
            }
        }
    }
    out
}

/// Rolling drawdown: the running max only looks back `window` defined
/// values (the current one included).
pub fn rolling_drawdown(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 {
        return out;
    }
    let mut recent: Vec<f64> = Vec::new();
    for (i, v) in values.iter().enumerate() {
        if let Some(value) = v {
            recent.push(*value);
            if recent.len() > window {
                recent.remove(0);
            }
            let peak = recent.iter().cloned().fold(f64::MIN, f64::max);
            if peak > 0.0 {
                out[i] = Some(100.0 * (value - peak) / peak);
            }
        }
    }
    out
}
