//! Moving-window indicators over a value series.
//!
//! Every function maps a value vector (with explicit gaps) onto an equally
//! long output vector: warmup positions and positions whose window touches
//! a gap are `None`, never zero.

/// Simple moving average over the last `window` values.
///
/// Defined from index `window - 1` onward when the whole window is defined.
pub fn sma(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().all(|v| v.is_some()) {
            let sum: f64 = slice.iter().map(|v| v.expect("checked")).sum();
            out[i] = Some(sum / window as f64);
        }
    }
    out
}

/// Exponential moving average, smoothing `2 / (window + 1)`, seeded with
/// SMA(window) at index `window - 1`.
pub fn ema(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    let alpha = 2.0 / (window as f64 + 1.0);

    let mut prev: Option<f64> = None;
    for i in 0..values.len() {
        match values[i] {
            None => {
                // A gap leaves the EMA state intact but the output undefined.
                out[i] = None;
            }
            Some(value) => {
                match prev {
                    None => {
                        // Seed with the SMA over the first formed window.
                        let slice = &values[i.saturating_sub(window - 1)..=i];
                        if i + 1 >= window && slice.iter().all(|v| v.is_some()) {
                            let seed: f64 =
                                slice.iter().map(|v| v.expect("checked")).sum::<f64>() / window as f64;
                            prev = Some(seed);
                            out[i] = Some(seed);
                        }
                    }
                    Some(p) => {
                        let next = alpha * value + (1.0 - alpha) * p;
                        prev = Some(next);
                        out[i] = Some(next);
                    }
                }
            }
        }
    }
    out
}

/// Sample standard deviation over the last `window` values (ddof = 1).
pub fn rolling_stdev(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window < 2 || values.len() < window {
        return out;
    }
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().all(|v| v.is_some()) {
            let xs: Vec<f64> = slice.iter().map(|v| v.expect("checked")).collect();
            let mean = xs.iter().sum::<f64>() / xs.len() as f64;
            let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
            out[i] = Some(var.sqrt());
        }
    }
    out
}

/// Bollinger bands: (mid, upper, lower) with upper/lower at
/// `mid +/- sigma * sample stdev` over the same window.
pub fn bollinger(
    values: &[Option<f64>],
    window: usize,
    sigma: f64,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let mid = sma(values, window);
    let sd = rolling_stdev(values, window);
    let upper = mid
        .iter()
        .zip(&sd)
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => Some(m + sigma * s),
            _ => None,
        })
        .collect();
    let lower = mid
        .iter()
        .zip(&sd)
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => Some(m - sigma * s),
            _ => None,
        })
        .collect();
    (mid, upper, lower)
}

/// Rolling Z-score: `(x - mean_W) / stdev_W`.
pub fn zscore(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mid = sma(values, window);
    let sd = rolling_stdev(values, window);
    values
        .iter()
        .enumerate()
        .map(|(i, v)| match (v, mid[i], sd[i]) {
            (Some(x), Some(m), Some(s)) if s > 0.0 => Some((x - m) / s),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defined(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|&v| Some(v)).collect()
    }

    #[test]
    fn sma_matches_hand_computed_values() {
        let closes = defined(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0, 19.0]);
        let out = sma(&closes, 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        let tail: Vec<f64> = out[2..].iter().map(|v| v.unwrap()).collect();
        assert_eq!(tail, vec![11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0]);
    }

    #[test]
    fn sma_defined_count_matches_contract() {
        // L >= N: exactly L - N + 1 defined values.
        let closes = defined(&[1.0; 25]);
        let out = sma(&closes, 10);
        assert_eq!(out.iter().filter(|v| v.is_some()).count(), 25 - 10 + 1);
    }

    #[test]
    fn sma_window_touching_gap_is_undefined() {
        let mut closes = defined(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        closes[2] = None;
        let out = sma(&closes, 3);
        assert_eq!(out[2], None);
        assert_eq!(out[3], None);
        assert_eq!(out[4], None);
    }

    #[test]
    fn ema_seeds_with_sma() {
        let closes = defined(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let out = ema(&closes, 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        // Seed equals SMA(3) of the first three closes.
        assert!((out[2].unwrap() - 11.0).abs() < 1e-12);
        // Next: alpha = 0.5; 0.5*13 + 0.5*11 = 12.
        assert!((out[3].unwrap() - 12.0).abs() < 1e-12);
        assert!((out[4].unwrap() - 13.0).abs() < 1e-12);
    }

    #[test]
    fn single_value_input_yields_no_defined_output() {
        let closes = defined(&[42.0]);
        assert!(sma(&closes, 2).iter().all(|v| v.is_none()));
        assert!(ema(&closes, 2).iter().all(|v| v.is_none()));
        let (m, u, l) = bollinger(&closes, 2, 2.0);
        assert!(m.iter().chain(&u).chain(&l).all(|v| v.is_none()));
    }

    #[test]
    fn bollinger_band_symmetry() {
        let closes = defined(&[10.0, 12.0, 11.0, 13.0, 15.0, 14.0, 16.0]);
        let (mid, upper, lower) = bollinger(&closes, 4, 2.0);
        for i in 0..closes.len() {
            if let (Some(m), Some(u), Some(l)) = (mid[i], upper[i], lower[i]) {
                assert!(((u - m) - (m - l)).abs() < 1e-9, "bands asymmetric at {}", i);
                assert!(u >= m && m >= l);
            }
        }
    }

    #[test]
    fn bollinger_uses_sample_stdev() {
        let closes = defined(&[1.0, 2.0, 3.0]);
        let (_, upper, _) = bollinger(&closes, 3, 1.0);
        // Sample stdev of [1,2,3] = 1; upper = 2 + 1.
        assert!((upper[2].unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn zscore_is_zero_at_window_mean() {
        let closes = defined(&[5.0, 5.0, 5.0, 10.0]);
        let out = zscore(&closes, 3);
        // Constant windows have zero stdev: undefined, not infinite.
        assert_eq!(out[2], None);
        assert!(out[3].unwrap() > 0.0);
    }
}
