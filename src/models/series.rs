use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unit tag carried by every series so the chart client can pick axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Price,
    Percent,
    Ratio,
    ZScore,
    Count,
}

/// One observation. `None` is an explicit gap (undefined value), kept so
/// downstream indicators see positions, not just defined samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub t: DateTime<Utc>,
    pub v: Option<f64>,
}

/// An ordered, timestamped value series with a label and unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub unit: Unit,
    pub points: Vec<Point>,
    /// Source expression, when the series came out of the evaluator.
    pub expr: Option<String>,
}

impl Series {
    pub fn new(label: impl Into<String>, unit: Unit) -> Self {
        Self { label: label.into(), unit, points: Vec::new(), expr: None }
    }

    pub fn with_points(label: impl Into<String>, unit: Unit, points: Vec<Point>) -> Self {
        Self { label: label.into(), unit, points, expr: None }
    }

    /// Series that repeats `value` at every timestamp of `grid`. Used for
    /// indicator level lines.
    pub fn constant(label: impl Into<String>, unit: Unit, grid: &[DateTime<Utc>], value: f64) -> Self {
        Self {
            label: label.into(),
            unit,
            points: grid.iter().map(|&t| Point { t, v: Some(value) }).collect(),
            expr: None,
        }
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.points.iter().map(|p| p.t).collect()
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        self.points.iter().map(|p| p.v).collect()
    }

    /// Number of defined (non-gap) points.
    pub fn defined_len(&self) -> usize {
        self.points.iter().filter(|p| p.v.is_some()).count()
    }

    pub fn last_defined(&self) -> Option<(DateTime<Utc>, f64)> {
        self.points.iter().rev().find_map(|p| p.v.map(|v| (p.t, v)))
    }

    /// Drop gap points entirely (the `include_gaps=false` projection).
    pub fn without_gaps(mut self) -> Self {
        self.points.retain(|p| p.v.is_some());
        self
    }

    /// Replace the point vector keeping label/unit/expr.
    pub fn map_points(mut self, points: Vec<Point>) -> Self {
        self.points = points;
        self
    }

    /// Rebuild a series on the same grid from a parallel value vector.
    /// Panics only on programmer error (length mismatch), guarded upstream.
    pub fn derive(&self, label: impl Into<String>, unit: Unit, values: Vec<Option<f64>>) -> Series {
        debug_assert_eq!(values.len(), self.points.len());
        Series {
            label: label.into(),
            unit,
            points: self
                .points
                .iter()
                .zip(values)
                .map(|(p, v)| Point { t: p.t, v })
                .collect(),
            expr: self.expr.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn gap_accounting() {
        let s = Series::with_points(
            "x",
            Unit::Price,
            vec![
                Point { t: ts(1), v: None },
                Point { t: ts(2), v: Some(2.0) },
                Point { t: ts(3), v: None },
                Point { t: ts(4), v: Some(4.0) },
            ],
        );
        assert_eq!(s.defined_len(), 2);
        assert_eq!(s.last_defined().unwrap(), (ts(4), 4.0));
        let dense = s.without_gaps();
        assert_eq!(dense.points.len(), 2);
    }

    #[test]
    fn constant_series_covers_grid() {
        let grid = vec![ts(1), ts(2), ts(3)];
        let s = Series::constant("level 70", Unit::ZScore, &grid, 70.0);
        assert_eq!(s.points.len(), 3);
        assert!(s.points.iter().all(|p| p.v == Some(70.0)));
    }
}
