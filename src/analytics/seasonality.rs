//! Seasonality: per-year curves on a day-of-year axis and year-by-bucket
//! return heatmaps.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::analytics::returns::simple_returns;
use crate::error::{AppError, Result};
use crate::models::Series;

/// Zero-based day-of-year index on a 365-slot axis. Leap days fold onto
/// Feb 28 (index 58) so the axis is identical across years.
pub fn day_of_year_index(ts: DateTime<Utc>) -> u32 {
    let date = ts.date_naive();
    let ordinal = date.ordinal(); // 1-based
    if !date.leap_year() {
        return ordinal - 1;
    }
    match ordinal {
        1..=59 => ordinal - 1, // Jan 1 .. Feb 28
        60 => 58,              // Feb 29 folds onto Feb 28
        _ => ordinal - 2,
    }
}

/// Rebase policy for year curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearNorm {
    /// Percent change from the year's base value.
    Percent,
    /// Indexed to 100 at the year's base value.
    Index,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearCurvePoint {
    pub doy: u32,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearCurve {
    pub year: i32,
    pub included: bool,
    pub points: Vec<YearCurvePoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonalityYears {
    pub curves: Vec<YearCurve>,
    /// P0/P50/P100 percentile bands and the mean curve, computed per day
    /// index over included years only.
    pub band_low: Vec<YearCurvePoint>,
    pub band_mid: Vec<YearCurvePoint>,
    pub band_high: Vec<YearCurvePoint>,
    pub mean: Vec<YearCurvePoint>,
}

/// Build per-year curves plus percentile bands.
///
/// Each requested year's observations are remapped to the day-of-year axis
/// and rebased at the year's first available observation. Years with fewer
/// than `min_points` observations are flagged excluded and do not feed the
/// bands.
pub fn seasonality_years(
    series: &Series,
    years: &[i32],
    norm: YearNorm,
    min_points: usize,
) -> Result<SeasonalityYears> {
    if years.is_empty() {
        return Err(AppError::UnsupportedParameter("years must not be empty".into()));
    }

    let mut curves = Vec::with_capacity(years.len());
    for &year in years {
        let mut observations: Vec<(u32, f64)> = series
            .points
            .iter()
            .filter(|p| p.t.year() == year)
            .filter_map(|p| p.v.map(|v| (day_of_year_index(p.t), v)))
            .collect();
        observations.sort_by_key(|(doy, _)| *doy);
        observations.dedup_by_key(|(doy, _)| *doy);

        let included = observations.len() >= min_points;
        let points = match observations.first() {
            Some(&(_, base)) if base != 0.0 => observations
                .iter()
                .map(|&(doy, v)| YearCurvePoint {
                    doy,
                    value: match norm {
                        YearNorm::Percent => (v / base - 1.0) * 100.0,
                        YearNorm::Index => v / base * 100.0,
                    },
                })
                .collect(),
            _ => Vec::new(),
        };
        curves.push(YearCurve { year, included, points });
    }

    // Percentile bands per day index over included years.
    let mut by_doy: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for curve in curves.iter().filter(|c| c.included) {
        for point in &curve.points {
            by_doy.entry(point.doy).or_default().push(point.value);
        }
    }

    let mut band_low = Vec::new();
    let mut band_mid = Vec::new();
    let mut band_high = Vec::new();
    let mut mean = Vec::new();
    for (doy, mut values) in by_doy {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = values.len();
        band_low.push(YearCurvePoint { doy, value: values[0] });
        band_high.push(YearCurvePoint { doy, value: values[n - 1] });
        let median = if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        };
        band_mid.push(YearCurvePoint { doy, value: median });
        mean.push(YearCurvePoint { doy, value: values.iter().sum::<f64>() / n as f64 });
    }

    Ok(SeasonalityYears { curves, band_low, band_mid, band_high, mean })
}

/// Heatmap bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Month,
    IsoWeek,
}

impl Bucket {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "month" => Ok(Bucket::Month),
            "week" => Ok(Bucket::IsoWeek),
            other => Err(AppError::UnsupportedParameter(format!(
                "bucket '{}' (use month or week)",
                other
            ))),
        }
    }

    fn of(&self, ts: DateTime<Utc>) -> (i32, u32) {
        match self {
            // Leap days share Feb's bucket by construction.
            Bucket::Month => (ts.year(), ts.month()),
            Bucket::IsoWeek => {
                let iso = ts.date_naive().iso_week();
                (iso.year(), iso.week())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HeatmapCell {
    pub year: i32,
    pub bucket: u32,
    pub return_pct: f64,
    pub included: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketStats {
    pub bucket: u32,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub stdev: f64,
    pub frac_positive: f64,
    pub frac_negative: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonalityHeatmap {
    pub cells: Vec<HeatmapCell>,
    pub stats: Vec<BucketStats>,
}

/// Bucket returns per (year, bucket): the compounded per-bar return inside
/// the bucket, `prod(1 + r) - 1`, in percent. Years below `min_points`
/// total observations are excluded from the per-bucket aggregates.
pub fn seasonality_heatmap(
    series: &Series,
    years: &[i32],
    bucket: Bucket,
    min_points: usize,
) -> Result<SeasonalityHeatmap> {
    if years.is_empty() {
        return Err(AppError::UnsupportedParameter("years must not be empty".into()));
    }

    let values = series.values();
    let returns = simple_returns(&values);

    // Observation counts per calendar year decide inclusion.
    let mut year_counts: BTreeMap<i32, usize> = BTreeMap::new();
    for point in &series.points {
        if point.v.is_some() {
            *year_counts.entry(point.t.year()).or_default() += 1;
        }
    }

    // Compound returns into (year, bucket) cells.
    let mut compounded: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for (i, point) in series.points.iter().enumerate() {
        let Some(r) = returns[i] else { continue };
        let (bucket_year, bucket_id) = bucket.of(point.t);
        if !years.contains(&bucket_year) {
            continue;
        }
        let cell = compounded.entry((bucket_year, bucket_id)).or_insert(1.0);
        *cell *= 1.0 + r;
    }

    let cells: Vec<HeatmapCell> = compounded
        .into_iter()
        .map(|((year, bucket_id), gross)| HeatmapCell {
            year,
            bucket: bucket_id,
            return_pct: (gross - 1.0) * 100.0,
            included: year_counts.get(&year).copied().unwrap_or(0) >= min_points,
        })
        .collect();

    // Per-bucket aggregates over included cells.
    let mut by_bucket: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for cell in cells.iter().filter(|c| c.included) {
        by_bucket.entry(cell.bucket).or_default().push(cell.return_pct);
    }

    let stats = by_bucket
        .into_iter()
        .map(|(bucket_id, mut values)| {
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let n = values.len();
            let mean = values.iter().sum::<f64>() / n as f64;
            let median = if n % 2 == 1 {
                values[n / 2]
            } else {
                (values[n / 2 - 1] + values[n / 2]) / 2.0
            };
            let stdev = if n > 1 {
                (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
            } else {
                0.0
            };
            BucketStats {
                bucket: bucket_id,
                mean,
                median,
                min: values[0],
                max: values[n - 1],
                stdev,
                frac_positive: values.iter().filter(|v| **v > 0.0).count() as f64 / n as f64,
                frac_negative: values.iter().filter(|v| **v < 0.0).count() as f64 / n as f64,
                count: n,
            }
        })
        .collect();

    Ok(SeasonalityHeatmap { cells, stats })
}
