use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Series, Unit};

/// Wire form of one point: ms since epoch plus a nullable value. Gaps are
/// serialized as explicit nulls when the endpoint keeps them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointPayload {
    pub t: i64,
    pub v: Option<f64>,
}

/// Wire form of one labeled sub-series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesPayload {
    pub label: String,
    pub unit: Unit,
    pub points: Vec<PointPayload>,
}

impl From<&Series> for SeriesPayload {
    fn from(series: &Series) -> Self {
        SeriesPayload {
            label: series.label.clone(),
            unit: series.unit,
            points: series
                .points
                .iter()
                .map(|p| PointPayload { t: p.t.timestamp_millis(), v: p.v })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangePayload {
    pub start: i64,
    pub end: i64,
}

/// Request metadata echoed on every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartMeta {
    pub bar_size: String,
    pub use_rth: bool,
    pub range: RangePayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub norm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ccy: Option<String>,
    /// Back-adjustment method when the response contains a continuous leg.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjust: Option<String>,
    /// Constant levels drawn by indicator endpoints, mirrored here so the
    /// client can use either the constant series or this vector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<f64>>,
    /// Set when an indicator had insufficient data and emitted a short or
    /// empty series instead of failing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ChartMeta {
    pub fn new(bar_size: &str, use_rth: bool, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            bar_size: bar_size.to_string(),
            use_rth,
            range: RangePayload {
                start: start.timestamp_millis(),
                end: end.timestamp_millis(),
            },
            norm: None,
            ccy: None,
            adjust: None,
            levels: None,
            warning: None,
        }
    }
}

/// Canonical top-level response shape shared by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartResponse {
    pub label: String,
    pub expr: String,
    pub meta: ChartMeta,
    pub series: Vec<SeriesPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Value>,
}

impl ChartResponse {
    pub fn new(label: impl Into<String>, expr: impl Into<String>, meta: ChartMeta) -> Self {
        Self {
            label: label.into(),
            expr: expr.into(),
            meta,
            series: Vec::new(),
            tables: None,
        }
    }

    pub fn push_series(&mut self, series: &Series) {
        self.series.push(SeriesPayload::from(series));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Point;
    use chrono::TimeZone;

    #[test]
    fn series_payload_keeps_gaps_as_null() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap();
        let series = Series::with_points(
            "EQ:SPY",
            Unit::Price,
            vec![Point { t: t0, v: Some(100.0) }, Point { t: t1, v: None }],
        );
        let payload = SeriesPayload::from(&series);
        assert_eq!(payload.points[0].t, t0.timestamp_millis());
        assert_eq!(payload.points[0].v, Some(100.0));
        assert_eq!(payload.points[1].v, None);

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("null"));
    }

    #[test]
    fn meta_serializes_sparsely() {
        let t = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let meta = ChartMeta::new("1 day", true, t, t);
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("warning"));
        assert!(!json.contains("levels"));
        assert!(json.contains("bar_size"));
    }
}
