//! Pack orchestrator: one base expression plus declared overlays and
//! panels, evaluated concurrently against the shared base series. A broken
//! companion annotates its own entry and never fails the pack.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analytics;
use crate::analytics::RsiBands;
use crate::engine::EvalOutput;
use crate::error::{AppError, Result};
use crate::models::{window_to_bars, ChartMeta, Series, SeriesPayload, SymbolToken, Unit};
use crate::server::api::{parse_body, ExprRequest};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct PackRequest {
    pub base: String,
    pub duration: Option<String>,
    pub bar_size: Option<String>,
    #[serde(default = "default_true")]
    pub use_rth: bool,
    pub norm: Option<f64>,
    pub ccy: Option<String>,
    #[serde(default)]
    pub overlays: Vec<Value>,
    #[serde(default)]
    pub panels: Vec<Value>,
}

fn default_true() -> bool {
    true
}

/// One companion's outcome. Failures carry `error` and leave `series`
/// empty.
#[derive(Debug, Serialize)]
pub struct CompanionResult {
    pub kind: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub series: Vec<SeriesPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Value>,
}

impl CompanionResult {
    fn ok(kind: &str, output: CompanionOutput) -> Self {
        Self {
            kind: kind.to_string(),
            status: "ok",
            error: None,
            series: output.series,
            tables: output.tables,
        }
    }

    fn failed(kind: &str, err: &AppError) -> Self {
        Self {
            kind: kind.to_string(),
            status: "error",
            error: Some(err.to_string()),
            series: Vec::new(),
            tables: None,
        }
    }
}

/// Series plus optional side tables produced by one companion.
pub struct CompanionOutput {
    series: Vec<SeriesPayload>,
    tables: Option<Value>,
}

impl From<Vec<SeriesPayload>> for CompanionOutput {
    fn from(series: Vec<SeriesPayload>) -> Self {
        Self { series, tables: None }
    }
}

#[derive(Debug, Serialize)]
pub struct PackResponse {
    pub label: String,
    pub expr: String,
    pub meta: ChartMeta,
    /// Base series plus successful overlay series on the base grid.
    pub series: Vec<SeriesPayload>,
    pub overlays: Vec<CompanionResult>,
    pub panels: Vec<CompanionResult>,
}

pub async fn pack_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<PackResponse>> {
    let req: PackRequest = parse_body(body)?;

    let shim = ExprRequest {
        expr: req.base.clone(),
        duration: req.duration.clone(),
        bar_size: req.bar_size.clone(),
        use_rth: req.use_rth,
        include_gaps: Some(false),
        norm: req.norm,
        ccy: req.ccy.clone(),
        align: None,
    };
    let ctx = shim.context(false)?;

    // The base grid is established once; companions evaluate against it.
    let out = state
        .engine
        .eval_expression(&req.base, &ctx.range, ctx.norm, ctx.ccy.as_deref())
        .await?;

    let mut meta = ChartMeta::new(
        ctx.range.bar_size.to_wire(),
        ctx.range.use_rth,
        ctx.range.start,
        ctx.range.end,
    );
    meta.norm = ctx.norm;
    meta.ccy = ctx.ccy.clone();
    if out.back_adjusted {
        meta.adjust = Some("ratio".to_string());
    }

    // Overlays are pure functions of the base series. Panels may fetch
    // (volume profile); they run concurrently and merge in declared order.
    let overlays: Vec<CompanionResult> = req
        .overlays
        .iter()
        .map(|spec| {
            let kind = companion_kind(spec);
            match overlay_series(&ctx, &out, &kind, spec) {
                Ok(series) => CompanionResult::ok(&kind, series.into()),
                Err(err) => CompanionResult::failed(&kind, &err),
            }
        })
        .collect();

    let panel_tasks: Vec<_> = req
        .panels
        .iter()
        .map(|spec| run_panel(&state, &ctx, &out, spec.clone()))
        .collect();
    let panels = futures::future::join_all(panel_tasks).await;

    let mut series = vec![SeriesPayload::from(&out.series.clone().without_gaps())];
    for overlay in &overlays {
        series.extend(overlay.series.iter().cloned());
    }

    Ok(Json(PackResponse {
        label: out.label.clone(),
        expr: req.base,
        meta,
        series,
        overlays,
        panels,
    }))
}

fn companion_kind(spec: &Value) -> String {
    spec.get("kind")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

fn overlay_series(
    ctx: &crate::server::api::RequestContext,
    out: &EvalOutput,
    kind: &str,
    spec: &Value,
) -> Result<Vec<SeriesPayload>> {
    let values = out.series.values();
    match kind {
        "bollinger" => {
            let period = usize_field(spec, "period", 20)?;
            let sigma = f64_field(spec, "sigma", 2.0)?;
            if period < 2 {
                return Err(AppError::UnsupportedParameter("period must be at least 2".into()));
            }
            let (mid, upper, lower) = analytics::bollinger(&values, period, sigma);
            Ok(vec![
                payload(out, "mid", out.series.unit, mid),
                payload(out, "upper", out.series.unit, upper),
                payload(out, "lower", out.series.unit, lower),
            ])
        }
        "ma" => {
            let window = window_field(spec, ctx)?;
            let flavor = spec.get("ma").and_then(Value::as_str).unwrap_or("sma");
            let (label, ma) = match flavor {
                "sma" => (format!("SMA({})", window), analytics::sma(&values, window)),
                "ema" => (format!("EMA({})", window), analytics::ema(&values, window)),
                other => {
                    return Err(AppError::UnsupportedParameter(format!(
                        "ma '{}' (use sma or ema)",
                        other
                    )))
                }
            };
            Ok(vec![payload(out, &label, out.series.unit, ma)])
        }
        other => Err(AppError::UnsupportedParameter(format!(
            "overlay kind '{}' (use bollinger or ma)",
            other
        ))),
    }
}

async fn run_panel(
    state: &AppState,
    ctx: &crate::server::api::RequestContext,
    out: &EvalOutput,
    spec: Value,
) -> CompanionResult {
    let kind = companion_kind(&spec);
    let result = match kind.as_str() {
        "volume" => volume_panel(state, ctx, out, &spec).await,
        _ => panel_series(ctx, out, &kind, &spec).map(CompanionOutput::from),
    };
    match result {
        Ok(output) => CompanionResult::ok(&kind, output),
        Err(err) => CompanionResult::failed(&kind, &err),
    }
}

fn panel_series(
    ctx: &crate::server::api::RequestContext,
    out: &EvalOutput,
    kind: &str,
    spec: &Value,
) -> Result<Vec<SeriesPayload>> {
    let values = out.series.values();
    match kind {
        "rsi" => {
            let period = usize_field(spec, "period", 14)?;
            if period < 2 {
                return Err(AppError::UnsupportedParameter("period must be at least 2".into()));
            }
            let rsi = analytics::rsi(&values, period);
            let rsi_series = out.series.derive("rsi", Unit::Count, rsi);
            let grid: Vec<DateTime<Utc>> = rsi_series
                .points
                .iter()
                .filter(|p| p.v.is_some())
                .map(|p| p.t)
                .collect();
            let bands = spec.get("bands").and_then(Value::as_str).unwrap_or("classic");
            let mut series = vec![SeriesPayload::from(&rsi_series.without_gaps())];
            let levels = RsiBands::parse(bands)?.levels();
            for (i, level) in levels.iter().enumerate() {
                let label = if levels.len() == 2 {
                    if i == 0 { "overbought".to_string() } else { "oversold".to_string() }
                } else {
                    format!("level {}", level)
                };
                series.push(SeriesPayload::from(&Series::constant(label, Unit::Count, &grid, *level)));
            }
            Ok(series)
        }
        "drawdown" => {
            let mode = spec.get("mode").and_then(Value::as_str).unwrap_or("point");
            let dd = match mode {
                "point" => analytics::drawdown(&values),
                "rolling" => {
                    let window = window_named_field(spec, "rolling_window", ctx)?;
                    analytics::rolling_drawdown(&values, window)
                }
                other => {
                    return Err(AppError::UnsupportedParameter(format!(
                        "mode '{}' (use point or rolling)",
                        other
                    )))
                }
            };
            Ok(vec![payload(out, "drawdown", Unit::Percent, dd)])
        }
        "sharpe" => {
            let window = window_field(spec, ctx)?;
            let returns = analytics::log_returns(&values);
            let sharpe = analytics::rolling_sharpe(&returns, window, ctx.bar_size);
            Ok(vec![payload(out, "sharpe", Unit::Ratio, sharpe)])
        }
        "vol" => {
            let window = window_field(spec, ctx)?;
            let returns = analytics::log_returns(&values);
            let vol = analytics::rolling_volatility(&returns, window, ctx.bar_size);
            Ok(vec![payload(out, "vol", Unit::Percent, vol)])
        }
        "zscore" => {
            let window = window_field(spec, ctx)?;
            let z = analytics::zscore(&values, window);
            Ok(vec![payload(out, "zscore", Unit::ZScore, z)])
        }
        other => Err(AppError::UnsupportedParameter(format!(
            "panel kind '{}' (use rsi, drawdown, sharpe, vol, zscore or volume)",
            other
        ))),
    }
}

/// Volume profile needs real OHLCV bars, so it only works when the base is
/// a single instrument token.
async fn volume_panel(
    state: &AppState,
    ctx: &crate::server::api::RequestContext,
    out: &EvalOutput,
    spec: &Value,
) -> Result<CompanionOutput> {
    let token = SymbolToken::parse(out.label.trim()).map_err(|_| {
        AppError::UnsupportedParameter(
            "volume profile needs a single-instrument base expression".into(),
        )
    })?;
    let bins = usize_field(spec, "bins", crate::constants::VOLUME_PROFILE_BINS)?;
    let mass = f64_field(spec, "value_area", crate::constants::VALUE_AREA_FRACTION)?;

    let bars = state.engine.fetch_ohlcv(&token, &ctx.range).await?;
    let profile = analytics::volume_profile(&bars, bins, mass)
        .ok_or_else(|| AppError::EmptyResult("no volume to profile".into()))?;

    // Price on the x-axis does not fit the time-series payload; encode the
    // bins as a price-indexed series pair (t = bin center in milli-units)
    // and put the full profile in the companion's tables.
    let series = vec![
        profile_payload("volume", &profile, |bin| bin.volume),
        profile_payload("cumulative", &profile, |bin| bin.cum_pct),
    ];
    let tables = serde_json::to_value(&profile)
        .map_err(|e| AppError::Invariant(format!("profile serialization: {}", e)))?;
    Ok(CompanionOutput { series, tables: Some(serde_json::json!({ "profile": tables })) })
}

fn profile_payload(
    label: &str,
    profile: &analytics::VolumeProfile,
    f: impl Fn(&analytics::ProfileBin) -> f64,
) -> SeriesPayload {
    SeriesPayload {
        label: label.to_string(),
        unit: Unit::Count,
        points: profile
            .bins
            .iter()
            .map(|bin| crate::models::PointPayload {
                t: (bin.price * 1000.0).round() as i64,
                v: Some(f(bin)),
            })
            .collect(),
    }
}

fn payload(out: &EvalOutput, label: &str, unit: Unit, values: Vec<Option<f64>>) -> SeriesPayload {
    SeriesPayload::from(&out.series.derive(label, unit, values).without_gaps())
}

fn usize_field(spec: &Value, name: &str, default: usize) -> Result<usize> {
    match spec.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .map(|v| v as usize)
            .ok_or_else(|| AppError::UnsupportedParameter(format!("{} must be a positive integer", name))),
    }
}

fn f64_field(spec: &Value, name: &str, default: f64) -> Result<f64> {
    match spec.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| AppError::UnsupportedParameter(format!("{} must be a number", name))),
    }
}

fn window_field(spec: &Value, ctx: &crate::server::api::RequestContext) -> Result<usize> {
    window_named_field(spec, "window", ctx)
}

fn window_named_field(
    spec: &Value,
    name: &str,
    ctx: &crate::server::api::RequestContext,
) -> Result<usize> {
    match spec.get(name) {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|v| v as usize)
            .filter(|v| *v >= 1)
            .ok_or_else(|| AppError::UnsupportedParameter(format!("{} must be a positive integer", name))),
        Some(Value::String(raw)) => window_to_bars(raw, ctx.bar_size),
        Some(_) => Err(AppError::UnsupportedParameter(format!(
            "{} must be a count or a token like 2m",
            name
        ))),
        None => Err(AppError::UnsupportedParameter(format!("{} is required", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn companion_kind_defaults_to_unknown() {
        assert_eq!(companion_kind(&json!({ "period": 14 })), "unknown");
        assert_eq!(companion_kind(&json!({ "kind": "rsi" })), "rsi");
    }

    #[test]
    fn field_helpers_validate_types() {
        let spec = json!({ "period": 20, "sigma": 2.5, "bad": "x" });
        assert_eq!(usize_field(&spec, "period", 14).unwrap(), 20);
        assert_eq!(usize_field(&spec, "missing", 14).unwrap(), 14);
        assert!(usize_field(&spec, "bad", 14).is_err());
        assert_eq!(f64_field(&spec, "sigma", 2.0).unwrap(), 2.5);
        assert!(f64_field(&spec, "bad", 2.0).is_err());
    }

    #[test]
    fn pack_request_parses_with_companions() {
        let req: PackRequest = parse_body(json!({
            "base": "EQ:SPY",
            "overlays": [{ "kind": "bollinger", "period": 20, "sigma": 2 }],
            "panels": [{ "kind": "rsi", "period": 14 }, { "kind": "bogus" }]
        }))
        .unwrap();
        assert_eq!(req.base, "EQ:SPY");
        assert_eq!(req.overlays.len(), 1);
        assert_eq!(req.panels.len(), 2);
    }
}
