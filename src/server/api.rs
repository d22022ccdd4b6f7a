//! JSON POST handlers for the expression endpoints.

use axum::extract::State;
use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::analytics;
use crate::analytics::RsiBands;
use crate::engine::{EvalOutput, RangeRequest};
use crate::error::{AppError, Result};
use crate::expr::AlignMode;
use crate::models::{
    window_to_bars, BarSize, ChartMeta, ChartResponse, DurationToken, Point, Series, SymbolToken,
    Unit,
};
use crate::server::AppState;
use crate::services::cache_max_age;

// ----------------------------
// Request plumbing
// ----------------------------

/// Common fields accepted by every expression endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ExprRequest {
    pub expr: String,
    pub duration: Option<String>,
    pub bar_size: Option<String>,
    #[serde(default = "default_true")]
    pub use_rth: bool,
    pub include_gaps: Option<bool>,
    pub norm: Option<f64>,
    pub ccy: Option<String>,
    pub align: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Rolling windows arrive either as a bar count or as a human token like
/// "2m"; both convert against the request bar size.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WindowParam {
    Bars(usize),
    Token(String),
}

impl WindowParam {
    pub fn bars(&self, size: BarSize) -> Result<usize> {
        match self {
            WindowParam::Bars(n) if *n >= 1 => Ok(*n),
            WindowParam::Bars(n) => Err(AppError::UnsupportedParameter(format!(
                "window {} must be at least 1",
                n
            ))),
            WindowParam::Token(raw) => window_to_bars(raw, size),
        }
    }
}

/// Resolved request context shared by the handlers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub range: RangeRequest,
    pub bar_size: BarSize,
    pub include_gaps: bool,
    pub norm: Option<f64>,
    pub ccy: Option<String>,
}

impl ExprRequest {
    pub fn context(&self, default_gaps: bool) -> Result<RequestContext> {
        let bar_size = BarSize::parse(self.bar_size.as_deref().unwrap_or("1 day"))?;
        let duration = DurationToken::parse(self.duration.as_deref().unwrap_or("1 Y"))?;
        let (start, end) = duration.resolve(Utc::now());

        let align = match self.align.as_deref() {
            None | Some("union") => AlignMode::Union,
            Some("intersection") => AlignMode::Intersection,
            Some(other) => {
                return Err(AppError::UnsupportedParameter(format!(
                    "align '{}' (use union or intersection)",
                    other
                )))
            }
        };

        Ok(RequestContext {
            range: RangeRequest {
                start,
                end,
                bar_size,
                use_rth: self.use_rth,
                align,
            },
            bar_size,
            include_gaps: self.include_gaps.unwrap_or(default_gaps),
            norm: self.norm,
            ccy: self.ccy.clone(),
        })
    }
}

/// Strict body parsing: malformed JSON fields are client errors, not 422s.
pub fn parse_body<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| AppError::Parse(format!("bad request body: {}", e)))
}

/// Project gap policy onto an output series.
fn project(series: Series, include_gaps: bool) -> Series {
    if include_gaps {
        series
    } else {
        series.without_gaps()
    }
}

fn base_meta(ctx: &RequestContext, out: &EvalOutput) -> ChartMeta {
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
    meta
}

async fn eval(state: &AppState, req: &ExprRequest, ctx: &RequestContext) -> Result<EvalOutput> {
    state
        .engine
        .eval_expression(&req.expr, &ctx.range, ctx.norm, ctx.ccy.as_deref())
        .await
}

fn cache_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    let max_age = cache_max_age(Utc::now());
    if let Ok(value) = format!("max-age={}", max_age).parse() {
        headers.insert(CACHE_CONTROL, value);
    }
    headers
}

// ----------------------------
// /health
// ----------------------------

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.engine.stats().await;
    Json(json!({
        "status": if stats.running { "ok" } else { "starting" },
        "session": stats,
    }))
}

// ----------------------------
// /expr/series and /expr/chart
// ----------------------------

/// The two endpoints run the same pipeline; they differ only in the
/// `include_gaps` default (series drops gap timestamps, chart keeps them
/// as nulls so plots show the hole).
async fn series_like(state: AppState, body: Value, default_gaps: bool) -> Result<impl IntoResponse> {
    let req: ExprRequest = parse_body(body)?;
    let ctx = req.context(default_gaps)?;
    let out = eval(&state, &req, &ctx).await?;

    let mut response = ChartResponse::new(&out.label, &req.expr, base_meta(&ctx, &out));
    response.push_series(&project(out.series.clone(), ctx.include_gaps));
    Ok((cache_headers(), Json(response)))
}

pub async fn series_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse> {
    series_like(state, body, false).await
}

pub async fn chart_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse> {
    series_like(state, body, true).await
}

// ----------------------------
// /expr/ma
// ----------------------------

#[derive(Debug, Deserialize)]
pub struct MaRequest {
    #[serde(flatten)]
    pub base: ExprRequest,
    pub ma: String,
    pub window: WindowParam,
}

pub async fn ma_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ChartResponse>> {
    let req: MaRequest = parse_body(body)?;
    let ctx = req.base.context(false)?;
    let window = req.window.bars(ctx.bar_size)?;
    let out = eval(&state, &req.base, &ctx).await?;

    let values = out.series.values();
    let (label, ma_values) = match req.ma.to_ascii_lowercase().as_str() {
        "sma" => (format!("SMA({})", window), analytics::sma(&values, window)),
        "ema" => (format!("EMA({})", window), analytics::ema(&values, window)),
        other => {
            return Err(AppError::UnsupportedParameter(format!(
                "ma '{}' (use sma or ema)",
                other
            )))
        }
    };

    let ma_series = out.series.derive(&label, out.series.unit, ma_values);
    let mut response = ChartResponse::new(&label, &req.base.expr, base_meta(&ctx, &out));
    if ma_series.defined_len() == 0 {
        response.meta.warning = Some(format!(
            "not enough data for a {}-bar window ({} bars)",
            window,
            out.series.defined_len()
        ));
    }
    response.push_series(&project(ma_series, ctx.include_gaps));
    Ok(Json(response))
}

// ----------------------------
// /expr/bollinger
// ----------------------------

#[derive(Debug, Deserialize)]
pub struct BollingerRequest {
    #[serde(flatten)]
    pub base: ExprRequest,
    #[serde(default = "default_bollinger_period")]
    pub period: usize,
    #[serde(default = "default_sigma")]
    pub sigma: f64,
}

fn default_bollinger_period() -> usize {
    20
}

fn default_sigma() -> f64 {
    2.0
}

pub async fn bollinger_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ChartResponse>> {
    let req: BollingerRequest = parse_body(body)?;
    let ctx = req.base.context(false)?;
    if req.period < 2 {
        return Err(AppError::UnsupportedParameter("period must be at least 2".into()));
    }
    let out = eval(&state, &req.base, &ctx).await?;

    let values = out.series.values();
    let (mid, upper, lower) = analytics::bollinger(&values, req.period, req.sigma);

    let label = format!("BB({},{})", req.period, req.sigma);
    let mut response = ChartResponse::new(&label, &req.base.expr, base_meta(&ctx, &out));
    let mid = out.series.derive("mid", out.series.unit, mid);
    if mid.defined_len() == 0 {
        response.meta.warning = Some(format!(
            "not enough data for a {}-bar window ({} bars)",
            req.period,
            out.series.defined_len()
        ));
    }
    response.push_series(&project(mid, ctx.include_gaps));
    response.push_series(&project(out.series.derive("upper", out.series.unit, upper), ctx.include_gaps));
    response.push_series(&project(out.series.derive("lower", out.series.unit, lower), ctx.include_gaps));
    Ok(Json(response))
}

// ----------------------------
// /expr/rsi
// ----------------------------

#[derive(Debug, Deserialize)]
pub struct RsiRequest {
    #[serde(flatten)]
    pub base: ExprRequest,
    #[serde(default = "default_rsi_period")]
    pub period: usize,
    pub bands: Option<String>,
    /// Explicit levels override the preset.
    pub levels: Option<Vec<f64>>,
}

fn default_rsi_period() -> usize {
    14
}

pub async fn rsi_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ChartResponse>> {
    let req: RsiRequest = parse_body(body)?;
    let ctx = req.base.context(false)?;
    if req.period < 2 {
        return Err(AppError::UnsupportedParameter("period must be at least 2".into()));
    }
    let out = eval(&state, &req.base, &ctx).await?;

    let values = out.series.values();
    let rsi_values = analytics::rsi(&values, req.period);
    let rsi_series = out.series.derive("rsi", Unit::Count, rsi_values);

    let levels = match &req.levels {
        Some(explicit) => explicit.clone(),
        None => RsiBands::parse(req.bands.as_deref().unwrap_or("classic"))?.levels(),
    };

    let label = format!("RSI({})", req.period);
    let mut response = ChartResponse::new(&label, &req.base.expr, base_meta(&ctx, &out));
    response.meta.levels = Some(levels.clone());
    if rsi_series.defined_len() == 0 {
        response.meta.warning = Some(format!(
            "not enough data for period {} ({} bars)",
            req.period,
            out.series.defined_len()
        ));
    }

    // Level lines cover the RSI's defined grid.
    let grid: Vec<DateTime<Utc>> = rsi_series
        .points
        .iter()
        .filter(|p| p.v.is_some())
        .map(|p| p.t)
        .collect();

    let last = rsi_series.last_defined();
    response.push_series(&project(rsi_series, ctx.include_gaps));
    for (i, level) in levels.iter().enumerate() {
        let name = level_label(&levels, i);
        response.push_series(&Series::constant(name, Unit::Count, &grid, *level));
    }

    response.tables = Some(json!({
        "last": last.map(|(t, v)| json!({ "t": t.timestamp_millis(), "v": v })),
    }));
    Ok(Json(response))
}

/// Two-level presets read as overbought/oversold; anything else is a plain
/// level line.
fn level_label(levels: &[f64], index: usize) -> String {
    if levels.len() == 2 {
        if index == 0 { "overbought".into() } else { "oversold".into() }
    } else {
        format!("level {}", levels[index])
    }
}

// ----------------------------
// /expr/drawdown
// ----------------------------

#[derive(Debug, Deserialize)]
pub struct DrawdownRequest {
    #[serde(flatten)]
    pub base: ExprRequest,
    #[serde(default = "default_drawdown_mode")]
    pub mode: String,
    pub rolling_window: Option<WindowParam>,
}

fn default_drawdown_mode() -> String {
    "point".to_string()
}

pub async fn drawdown_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ChartResponse>> {
    let req: DrawdownRequest = parse_body(body)?;
    let ctx = req.base.context(false)?;
    let out = eval(&state, &req.base, &ctx).await?;

    let values = out.series.values();
    let dd = match req.mode.as_str() {
        "point" => analytics::drawdown(&values),
        "rolling" => {
            let window = req
                .rolling_window
                .as_ref()
                .ok_or_else(|| {
                    AppError::UnsupportedParameter("rolling mode needs rolling_window".into())
                })?
                .bars(ctx.bar_size)?;
            analytics::rolling_drawdown(&values, window)
        }
        other => {
            return Err(AppError::UnsupportedParameter(format!(
                "mode '{}' (use point or rolling)",
                other
            )))
        }
    };

    let mut response = ChartResponse::new("drawdown", &req.base.expr, base_meta(&ctx, &out));
    response.push_series(&project(out.series.derive("drawdown", Unit::Percent, dd), ctx.include_gaps));
    Ok(Json(response))
}

// ----------------------------
// /expr/sharpe and /expr/vol
// ----------------------------

#[derive(Debug, Deserialize)]
pub struct WindowRequest {
    #[serde(flatten)]
    pub base: ExprRequest,
    pub window: WindowParam,
}

pub async fn sharpe_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ChartResponse>> {
    let req: WindowRequest = parse_body(body)?;
    let ctx = req.base.context(false)?;
    let window = req.window.bars(ctx.bar_size)?;
    let out = eval(&state, &req.base, &ctx).await?;

    let returns = analytics::log_returns(&out.series.values());
    let sharpe = analytics::rolling_sharpe(&returns, window, ctx.bar_size);

    let label = format!("Sharpe({})", window);
    let mut response = ChartResponse::new(&label, &req.base.expr, base_meta(&ctx, &out));
    let series = out.series.derive("sharpe", Unit::Ratio, sharpe);
    if series.defined_len() == 0 {
        response.meta.warning = Some(format!("not enough data for a {}-bar window", window));
    }
    response.push_series(&project(series, ctx.include_gaps));
    Ok(Json(response))
}

pub async fn vol_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ChartResponse>> {
    let req: WindowRequest = parse_body(body)?;
    let ctx = req.base.context(false)?;
    let window = req.window.bars(ctx.bar_size)?;
    let out = eval(&state, &req.base, &ctx).await?;

    let returns = analytics::log_returns(&out.series.values());
    let vol = analytics::rolling_volatility(&returns, window, ctx.bar_size);

    let label = format!("Vol({})", window);
    let mut response = ChartResponse::new(&label, &req.base.expr, base_meta(&ctx, &out));
    let series = out.series.derive("vol", Unit::Percent, vol);
    if series.defined_len() == 0 {
        response.meta.warning = Some(format!("not enough data for a {}-bar window", window));
    }
    response.push_series(&project(series, ctx.include_gaps));
    Ok(Json(response))
}

// ----------------------------
// /expr/zscore
// ----------------------------

#[derive(Debug, Deserialize)]
pub struct ZscoreRequest {
    #[serde(flatten)]
    pub base: ExprRequest,
    pub window: WindowParam,
    #[serde(default)]
    pub levels: Vec<f64>,
}

pub async fn zscore_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ChartResponse>> {
    let req: ZscoreRequest = parse_body(body)?;
    let ctx = req.base.context(false)?;
    let window = req.window.bars(ctx.bar_size)?;
    let out = eval(&state, &req.base, &ctx).await?;

    let z = analytics::zscore(&out.series.values(), window);
    let z_series = out.series.derive("zscore", Unit::ZScore, z);

    let label = format!("Z({})", window);
    let mut response = ChartResponse::new(&label, &req.base.expr, base_meta(&ctx, &out));
    if z_series.defined_len() == 0 {
        response.meta.warning = Some(format!("not enough data for a {}-bar window", window));
    }
    if !req.levels.is_empty() {
        response.meta.levels = Some(req.levels.clone());
    }
    let grid: Vec<DateTime<Utc>> = z_series
        .points
        .iter()
        .filter(|p| p.v.is_some())
        .map(|p| p.t)
        .collect();
    response.push_series(&project(z_series, ctx.include_gaps));
    for level in &req.levels {
        response.push_series(&Series::constant(
            format!("level {}", level),
            Unit::ZScore,
            &grid,
            *level,
        ));
    }
    Ok(Json(response))
}

// ----------------------------
// /expr/corr
// ----------------------------

#[derive(Debug, Deserialize)]
pub struct CorrRequest {
    pub a: String,
    pub b: String,
    #[serde(default = "default_ret_horizon")]
    pub ret_horizon: usize,
    pub window: WindowParam,
    pub duration: Option<String>,
    pub bar_size: Option<String>,
    #[serde(default = "default_true")]
    pub use_rth: bool,
    pub include_gaps: Option<bool>,
}

fn default_ret_horizon() -> usize {
    1
}

pub async fn corr_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ChartResponse>> {
    let req: CorrRequest = parse_body(body)?;
    if req.ret_horizon == 0 {
        return Err(AppError::UnsupportedParameter("ret_horizon must be at least 1".into()));
    }

    let shim = ExprRequest {
        expr: req.a.clone(),
        duration: req.duration.clone(),
        bar_size: req.bar_size.clone(),
        use_rth: req.use_rth,
        include_gaps: req.include_gaps,
        norm: None,
        ccy: None,
        align: None,
    };
    let ctx = shim.context(false)?;
    let window = req.window.bars(ctx.bar_size)?;

    let (out_a, out_b) = tokio::join!(
        state.engine.eval_expression(&req.a, &ctx.range, None, None),
        state.engine.eval_expression(&req.b, &ctx.range, None, None),
    );
    let (out_a, out_b) = (out_a?, out_b?);

    // Put both results on one grid, then correlate H-bar log returns.
    let legs = [out_a.series.clone(), out_b.series.clone()];
    let frame = crate::expr::align::align(&legs, AlignMode::Union, crate::constants::MAX_FFILL_BARS);
    let ret_a = analytics::horizon_log_returns(&frame.columns[0], req.ret_horizon);
    let ret_b = analytics::horizon_log_returns(&frame.columns[1], req.ret_horizon);
    let corr = analytics::rolling_correlation(&ret_a, &ret_b, window);

    let label = format!("Corr({},{})", req.a, req.b);
    let expr = format!("corr({}, {})", req.a, req.b);
    let mut meta = ChartMeta::new(
        ctx.range.bar_size.to_wire(),
        ctx.range.use_rth,
        ctx.range.start,
        ctx.range.end,
    );
    if out_a.back_adjusted || out_b.back_adjusted {
        meta.adjust = Some("ratio".to_string());
    }

    let points = frame
        .index
        .iter()
        .zip(&corr)
        .map(|(&t, &v)| Point { t, v })
        .collect();
    let series = Series::with_points("corr", Unit::Ratio, points);

    let mut response = ChartResponse::new(&label, &expr, meta);
    if series.defined_len() == 0 {
        response.meta.warning = Some(format!(
            "not enough overlapping data for a {}-bar window",
            window
        ));
    }
    response.push_series(&project(series, ctx.include_gaps));
    Ok(Json(response))
}

// ----------------------------
// /data/ohlcv
// ----------------------------

#[derive(Debug, Deserialize)]
pub struct OhlcvRequest {
    pub symbol: String,
    #[serde(default = "default_resolution")]
    pub resolution: String,
    pub range: OhlcvRange,
    #[serde(default = "default_true")]
    pub include_volume: bool,
    /// Accepted for client compatibility; timestamps are always UTC ms.
    #[serde(default)]
    pub tz: Option<String>,
    #[serde(default = "default_max_bars")]
    pub max_bars: usize,
}

#[derive(Debug, Deserialize)]
pub struct OhlcvRange {
    pub start: String,
    pub end: String,
}

fn default_resolution() -> String {
    "1D".to_string()
}

fn default_max_bars() -> usize {
    5000
}

pub async fn ohlcv_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ChartResponse>> {
    let req: OhlcvRequest = parse_body(body)?;
    if let Some(tz) = &req.tz {
        tz.parse::<chrono_tz::Tz>()
            .map_err(|_| AppError::UnsupportedParameter(format!("tz '{}'", tz)))?;
    }

    let token = SymbolToken::parse(&req.symbol)?;
    let bar_size = BarSize::parse(&req.resolution)?;
    let start = parse_instant(&req.range.start)?;
    let end = parse_instant(&req.range.end)?;
    if end <= start {
        return Err(AppError::EmptyRange("range end must be after start".into()));
    }

    let range = RangeRequest {
        start,
        end,
        bar_size,
        use_rth: false,
        align: AlignMode::Union,
    };
    let mut bars = state.engine.fetch_ohlcv(&token, &range).await?;
    if bars.is_empty() {
        return Err(AppError::EmptyResult(format!("no bars for {}", token)));
    }
    if bars.len() > req.max_bars {
        bars.drain(..bars.len() - req.max_bars);
    }

    let label = token.to_string();
    let mut response = ChartResponse::new(
        &label,
        &label,
        ChartMeta::new(bar_size.to_wire(), false, start, end),
    );
    if matches!(token, SymbolToken::ContinuousFuture { .. }) {
        response.meta.adjust = Some("ratio".to_string());
    }

    let closes = Series::with_points(
        label.clone(),
        Unit::Price,
        bars.iter().map(|b| Point { t: b.time, v: Some(b.close) }).collect(),
    );
    response.push_series(&closes);

    let rows: Vec<Value> = bars
        .iter()
        .map(|b| {
            json!({
                "t": b.time.timestamp_millis(),
                "o": b.open,
                "h": b.high,
                "l": b.low,
                "c": b.close,
                "v": if req.include_volume { Some(b.volume) } else { None },
            })
        })
        .collect();
    response.tables = Some(json!({ "ohlcv": rows }));
    Ok(Json(response))
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).expect("midnight").and_utc());
    }
    Err(AppError::Parse(format!(
        "bad instant '{}' (use RFC3339 or YYYY-MM-DD)",
        raw
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expr_request_defaults() {
        let req: ExprRequest = parse_body(json!({ "expr": "EQ:SPY" })).unwrap();
        let ctx = req.context(false).unwrap();
        assert_eq!(ctx.bar_size, BarSize::Day1);
        assert!(ctx.range.use_rth);
        assert!(!ctx.include_gaps);
        assert!(ctx.range.start < ctx.range.end);
    }

    #[test]
    fn bad_align_is_rejected() {
        let req: ExprRequest =
            parse_body(json!({ "expr": "EQ:SPY", "align": "outer" })).unwrap();
        assert!(matches!(
            req.context(false),
            Err(AppError::UnsupportedParameter(_))
        ));
    }

    #[test]
    fn window_param_accepts_counts_and_tokens() {
        let bars = WindowParam::Bars(20).bars(BarSize::Day1).unwrap();
        assert_eq!(bars, 20);
        let token = WindowParam::Token("2m".into()).bars(BarSize::Day1).unwrap();
        assert_eq!(token, 60);
        assert!(WindowParam::Bars(0).bars(BarSize::Day1).is_err());
    }

    #[test]
    fn instant_parsing_accepts_dates_and_rfc3339() {
        assert!(parse_instant("2025-01-02").is_ok());
        assert!(parse_instant("2025-01-02T10:30:00").is_ok());
        assert!(parse_instant("2025-01-02T10:30:00Z").is_ok());
        assert!(parse_instant("01/02/2025").is_err());
    }

    #[test]
    fn level_labels() {
        assert_eq!(level_label(&[70.0, 30.0], 0), "overbought");
        assert_eq!(level_label(&[70.0, 30.0], 1), "oversold");
        assert_eq!(level_label(&[80.0, 50.0, 20.0], 1), "level 50");
    }

    #[test]
    fn malformed_body_is_a_parse_error() {
        let result: Result<ExprRequest> = parse_body(json!({ "expr": 42 }));
        assert!(matches!(result, Err(AppError::Parse(_))));
    }
}
