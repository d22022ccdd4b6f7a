//! Rolling Pearson correlation of two legs' multi-bar log returns.

/// H-bar log return: `ln(x_t / x_{t-H})` over positions, undefined when
/// either endpoint is a gap.
pub fn horizon_log_returns(values: &[Option<f64>], horizon: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if horizon == 0 {
        return out;
    }
    for i in horizon..values.len() {
        if let (Some(prev), Some(cur)) = (values[i - horizon], values[i]) {
            if prev > 0.0 && cur > 0.0 {
                out[i] = Some((cur / prev).ln());
            }
        }
    }
    out
}

/// Rolling Pearson correlation over `window` paired observations. Undefined
/// while warming up, when the window touches a gap in either input, or when
/// either side has zero variance.
pub fn rolling_correlation(
    a: &[Option<f64>],
    b: &[Option<f64>],
    window: usize,
) -> Vec<Option<f64>> {
    let len = a.len().min(b.len());
    let mut out = vec![None; len];
    if window < 2 || len < window {
        return out;
    }

    for i in (window - 1)..len {
        let range = i + 1 - window..=i;
        let xs = &a[range.clone()];
        let ys = &b[range];
        if xs.iter().any(|v| v.is_none()) || ys.iter().any(|v| v.is_none()) {
            continue;
        }
        let xs: Vec<f64> = xs.iter().map(|v| v.expect("checked")).collect();
        let ys: Vec<f64> = ys.iter().map(|v| v.expect("checked")).collect();

        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;
        let mut cov = 0.0;
        let mut var_x = 0.0;
        let mut var_y = 0.0;
        for k in 0..xs.len() {
            let dx = xs[k] - mean_x;
            let dy = ys[k] - mean_y;
            cov += dx * dy;
            var_x += dx * dx;
            var_y += dy * dy;
        }
        if var_x > 0.0 && var_y > 0.0 {
            out[i] = Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0));
        }
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
    fn horizon_returns_skip_warmup() {
        let prices = defined(&[100.0, 110.0, 121.0]);
        let out = horizon_log_returns(&prices, 2);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert!((out[2].unwrap() - 1.21f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn identical_series_correlate_at_one() {
        let r: Vec<Option<f64>> = defined(&[0.01, -0.02, 0.015, 0.005, -0.01, 0.02]);
        let out = rolling_correlation(&r, &r, 4);
        for v in out.into_iter().flatten() {
            assert!((v - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn mirrored_series_correlate_at_minus_one() {
        let r = defined(&[0.01, -0.02, 0.015, 0.005, -0.01, 0.02]);
        let neg: Vec<Option<f64>> = r.iter().map(|v| v.map(|x| -x)).collect();
        let out = rolling_correlation(&r, &neg, 4);
        for v in out.into_iter().flatten() {
            assert!((v + 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn constant_side_is_undefined() {
        let r = defined(&[0.01, -0.02, 0.015, 0.005]);
        let flat = defined(&[0.0, 0.0, 0.0, 0.0]);
        let out = rolling_correlation(&r, &flat, 3);
        assert!(out.iter().all(|v| v.is_none()));
    }

    #[test]
    fn gap_in_window_is_undefined() {
        let mut a = defined(&[0.01, -0.02, 0.015, 0.005, -0.01]);
        let b = defined(&[0.02, -0.01, 0.01, 0.004, -0.02]);
        a[2] = None;
        let out = rolling_correlation(&a, &b, 3);
        assert_eq!(out[2], None);
        assert_eq!(out[3], None);
        assert_eq!(out[4], None);
    }
}
