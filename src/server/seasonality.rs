//! Seasonality endpoints: per-year curves and year-by-bucket heatmaps.

use axum::extract::State;
use axum::Json;
use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::analytics::seasonality::{
    seasonality_heatmap, seasonality_years, Bucket, YearCurvePoint, YearNorm,
};
use crate::error::{AppError, Result};
use crate::models::{ChartMeta, ChartResponse, Point, Series, Unit};
use crate::server::api::{parse_body, ExprRequest};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct YearsRequest {
    #[serde(flatten)]
    pub base: ExprRequest,
    pub years: Vec<i32>,
    /// true: percent change from each year's base; false: indexed to 100.
    #[serde(default = "default_rebase")]
    pub rebase: bool,
    #[serde(default = "default_min_points")]
    pub min_points_per_year: usize,
}

fn default_rebase() -> bool {
    true
}

fn default_min_points() -> usize {
    crate::constants::MIN_POINTS_PER_YEAR
}

#[derive(Debug, Deserialize)]
pub struct HeatmapRequest {
    #[serde(flatten)]
    pub base: ExprRequest,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    pub years: Vec<i32>,
    #[serde(default = "default_min_points")]
    pub min_points_per_year: usize,
}

fn default_bucket() -> String {
    "month".to_string()
}

/// Fetch the expression over the span of the requested years. The common
/// `duration` field is ignored here; the year set defines the range.
async fn eval_years(
    state: &AppState,
    base: &ExprRequest,
    years: &[i32],
) -> Result<(crate::engine::EvalOutput, ChartMeta)> {
    if years.is_empty() {
        return Err(AppError::UnsupportedParameter("years must not be empty".into()));
    }
    let min_year = *years.iter().min().expect("non-empty");
    let max_year = *years.iter().max().expect("non-empty");
    if max_year - min_year > 50 {
        return Err(AppError::UnsupportedParameter("year span above 50 years".into()));
    }

    let mut ctx = base.context(false)?;
    ctx.range.start = Utc
        .with_ymd_and_hms(min_year, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| AppError::UnsupportedParameter(format!("bad year {}", min_year)))?;
    let end_of_span = Utc
        .with_ymd_and_hms(max_year + 1, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| AppError::UnsupportedParameter(format!("bad year {}", max_year)))?;
    ctx.range.end = end_of_span.min(Utc::now());
    if ctx.range.end <= ctx.range.start {
        return Err(AppError::EmptyRange("requested years are in the future".into()));
    }

    let out = state
        .engine
        .eval_expression(&base.expr, &ctx.range, None, None)
        .await?;

    let mut meta = ChartMeta::new(
        ctx.range.bar_size.to_wire(),
        ctx.range.use_rth,
        ctx.range.start,
        ctx.range.end,
    );
    if out.back_adjusted {
        meta.adjust = Some("ratio".to_string());
    }
    Ok((out, meta))
}

/// Curves live on a day-of-year axis; for the chart contract they are
/// projected onto a fixed non-leap reference year so every year's points
/// share timestamps.
fn curve_to_series(label: impl Into<String>, points: &[YearCurvePoint]) -> Series {
    let reference = NaiveDate::from_ymd_opt(2001, 1, 1).expect("reference year");
    Series::with_points(
        label,
        Unit::Percent,
        points
            .iter()
            .filter_map(|p| {
                reference
                    .with_ordinal(p.doy + 1)
                    .map(|d| Point { t: d.and_hms_opt(0, 0, 0).expect("midnight").and_utc(), v: Some(p.value) })
            })
            .collect(),
    )
}

pub async fn years_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ChartResponse>> {
    let req: YearsRequest = parse_body(body)?;
    let (out, meta) = eval_years(&state, &req.base, &req.years).await?;

    let norm = if req.rebase { YearNorm::Percent } else { YearNorm::Index };
    let result = seasonality_years(&out.series, &req.years, norm, req.min_points_per_year)?;

    let mut response = ChartResponse::new(
        format!("seasonality {}", out.label),
        &req.base.expr,
        meta,
    );
    for curve in &result.curves {
        if curve.points.is_empty() {
            continue;
        }
        response.push_series(&curve_to_series(curve.year.to_string(), &curve.points));
    }
    response.push_series(&curve_to_series("p0", &result.band_low));
    response.push_series(&curve_to_series("p50", &result.band_mid));
    response.push_series(&curve_to_series("p100", &result.band_high));
    response.push_series(&curve_to_series("mean", &result.mean));

    response.tables = Some(json!({ "years": result }));
    Ok(Json(response))
}

pub async fn heatmap_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ChartResponse>> {
    let req: HeatmapRequest = parse_body(body)?;
    let bucket = Bucket::parse(&req.bucket)?;
    let (out, meta) = eval_years(&state, &req.base, &req.years).await?;

    let result = seasonality_heatmap(&out.series, &req.years, bucket, req.min_points_per_year)?;

    let mut response = ChartResponse::new(
        format!("seasonality heatmap {}", out.label),
        &req.base.expr,
        meta,
    );
    response.tables = Some(json!({
        "heatmap": result.cells,
        "stats": result.stats,
        "bucket": req.bucket,
    }));
    Ok(Json(response))
}
