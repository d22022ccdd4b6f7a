//! The engine: one value owning the upstream session, caches and resolver,
//! with an explicit start/shutdown lifecycle. Request handlers receive it
//! through the server state and never touch process-level globals.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::expr::{self, align, evaluate, normalize, AlignMode, Expr, NormMode};
use crate::models::{
    Bar, BarSize, Point, ResolvedChain, Series, SymbolToken, Unit,
};
use crate::services::{
    filter_rth, BarCache, ExpiryCalendar, GatewayClient, HistoricalSource, MarketSession,
    Resolver, SessionConfig, SessionStats,
};

/// Common fetch parameters of one request.
#[derive(Debug, Clone, Copy)]
pub struct RangeRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub bar_size: BarSize,
    pub use_rth: bool,
    pub align: AlignMode,
}

/// Evaluated expression plus bookkeeping the serializer needs.
#[derive(Debug, Clone)]
pub struct EvalOutput {
    pub series: Series,
    pub label: String,
    /// Set when any leg was a back-adjusted continuous future.
    pub back_adjusted: bool,
}

pub struct Engine {
    session: Arc<MarketSession>,
    calendar: Arc<ExpiryCalendar>,
}

impl Engine {
    pub fn new(config: &Config) -> Result<Self> {
        let gateway = Arc::new(GatewayClient::new(config)?);
        let session_config = SessionConfig {
            inflight_slots: config.inflight_slots,
            rate_limit_per_min: config.rate_limit_per_min,
            ..SessionConfig::default()
        };
        Ok(Self::with_source(gateway, session_config, config))
    }

    /// Build over any source; tests inject an in-process fake here.
    pub fn with_source(
        source: Arc<dyn HistoricalSource>,
        session_config: SessionConfig,
        config: &Config,
    ) -> Self {
        let cache = Arc::new(BarCache::with_defaults());
        let session = Arc::new(MarketSession::new(source, cache, session_config));
        let calendar = Arc::new(ExpiryCalendar::with_defaults(&config.state_dir));
        Self { session, calendar }
    }

    pub async fn start(&self) -> Result<()> {
        self.session.start().await
    }

    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }

    pub async fn stats(&self) -> SessionStats {
        self.session.stats().await
    }

    /// Resolve one token over the request range.
    pub async fn resolve(&self, token: &SymbolToken, req: &RangeRequest) -> Result<ResolvedChain> {
        Resolver::resolve(token, req.start, req.end, &self.calendar, &*self.session).await
    }

    /// Close series of one leaf: resolve, fetch every chain segment, filter
    /// to RTH where requested, stitch (back-adjusting continuous chains at
    /// roll seams) and emit closes.
    pub async fn fetch_leg(&self, token: &SymbolToken, req: &RangeRequest) -> Result<Series> {
        let chain = self.resolve(token, req).await?;
        let bars = self.fetch_chain_bars(&chain, req).await?;
        let label = token.to_string();

        let points = bars
            .into_iter()
            .map(|b| Point { t: b.time, v: Some(b.close) })
            .collect();
        Ok(Series::with_points(label, Unit::Price, points))
    }

    /// OHLCV bars of one token (single-instrument endpoints and the volume
    /// panel). Continuous chains stitch with the same ratio adjustment
    /// applied to all four price fields.
    pub async fn fetch_ohlcv(&self, token: &SymbolToken, req: &RangeRequest) -> Result<Vec<Bar>> {
        let chain = self.resolve(token, req).await?;
        self.fetch_chain_bars(&chain, req).await
    }

    async fn fetch_chain_bars(&self, chain: &ResolvedChain, req: &RangeRequest) -> Result<Vec<Bar>> {
        // Futures sessions extend far outside equity RTH; the original
        // system always fetches them around the clock.
        let use_rth = req.use_rth && !chain.token.is_futures();

        let fetches = chain.segments.iter().map(|segment| {
            let session = Arc::clone(&self.session);
            async move {
                let bars = session
                    .fetch_bars(
                        &segment.instrument.spec,
                        req.bar_size,
                        segment.from,
                        segment.to,
                        use_rth,
                    )
                    .await?;
                let mut bars = bars.as_ref().clone();
                bars.retain(|b| b.time >= segment.from && b.time < segment.to);
                if use_rth {
                    bars = filter_rth(
                        bars,
                        &segment.instrument.display.exchange,
                        req.bar_size.is_intraday(),
                    );
                }
                Ok::<Vec<Bar>, AppError>(bars)
            }
        });

        let mut per_segment: Vec<Vec<Bar>> = Vec::with_capacity(chain.segments.len());
        for result in join_all(fetches).await {
            per_segment.push(result?);
        }

        let mut stitched: Vec<Bar> = Vec::new();
        for segment_bars in per_segment {
            if chain.back_adjust && !stitched.is_empty() {
                if let (Some(prev), Some(next)) = (stitched.last(), segment_bars.first()) {
                    // Ratio adjustment: scale everything before the roll so
                    // the seam has no artificial jump.
                    if prev.close > 0.0 && next.open > 0.0 {
                        let factor = next.open / prev.close;
                        for bar in stitched.iter_mut() {
                            bar.open *= factor;
                            bar.high *= factor;
                            bar.low *= factor;
                            bar.close *= factor;
                        }
                    }
                }
            }
            stitched.extend(segment_bars);
        }

        stitched.sort_by_key(|b| b.time);
        stitched.dedup_by_key(|b| b.time);
        crate::models::validate_spacing(&stitched, req.bar_size)?;
        Ok(stitched)
    }

    /// Parse, fetch, align and evaluate an expression. `norm` rebases the
    /// output; `ccy` converts each leg into the target currency through an
    /// FX leaf before evaluation.
    pub async fn eval_expression(
        &self,
        input: &str,
        req: &RangeRequest,
        norm: Option<f64>,
        ccy: Option<&str>,
    ) -> Result<EvalOutput> {
        let ast = expr::parse(input)?;
        let leaves = ast.leaves();
        let output = self.eval_ast(input, &ast, &leaves, req, norm, ccy).await?;
        Ok(output)
    }

    async fn eval_ast(
        &self,
        input: &str,
        ast: &Expr,
        leaves: &[SymbolToken],
        req: &RangeRequest,
        norm: Option<f64>,
        ccy: Option<&str>,
    ) -> Result<EvalOutput> {
        let fetches = leaves.iter().map(|token| self.fetch_leg(token, req));
        let mut legs: Vec<Series> = Vec::with_capacity(leaves.len());
        let mut back_adjusted = false;
        for (token, result) in leaves.iter().zip(join_all(fetches).await) {
            let series = result?;
            if series.defined_len() == 0 {
                return Err(AppError::EmptyResult(format!("no bars for {}", token)));
            }
            back_adjusted |= matches!(token, SymbolToken::ContinuousFuture { .. });
            legs.push(series);
        }

        if let Some(target) = ccy {
            legs = self.convert_legs(legs, leaves, target, req).await?;
        }

        let frame = align::align(&legs, req.align, crate::constants::MAX_FFILL_BARS);
        if frame.is_empty() {
            return Err(AppError::EmptyResult(format!(
                "alignment produced no timestamps for '{}'",
                input
            )));
        }

        let mut series = evaluate(ast, &frame, leaves, input)?;
        series.expr = Some(input.to_string());
        if series.defined_len() == 0 {
            return Err(AppError::EmptyResult(format!(
                "expression '{}' has no defined points",
                input
            )));
        }

        if let Some(norm) = norm {
            series = normalize(series, NormMode::from_param(norm));
        }

        Ok(EvalOutput { label: input.to_string(), series, back_adjusted })
    }

    /// Convert legs quoted in foreign currencies into `target` using FX
    /// leaves fetched over the same range.
    async fn convert_legs(
        &self,
        legs: Vec<Series>,
        leaves: &[SymbolToken],
        target: &str,
        req: &RangeRequest,
    ) -> Result<Vec<Series>> {
        let target = target.to_ascii_uppercase();
        if target.len() != 3 || !target.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AppError::UnsupportedParameter(format!(
                "ccy '{}' (use a 3-letter currency code)",
                target
            )));
        }

        let mut converted = Vec::with_capacity(legs.len());
        for (leg, token) in legs.into_iter().zip(leaves) {
            let chain = self.resolve(token, req).await?;
            let leg_ccy = chain
                .segments
                .first()
                .map(|s| s.instrument.display.currency.clone())
                .unwrap_or_else(|| "USD".into());

            if leg_ccy == target {
                converted.push(leg);
                continue;
            }

            let fx_token = SymbolToken::Fx { pair: format!("{}{}", leg_ccy, target) };
            let fx = self.fetch_leg(&fx_token, req).await?;
            if fx.defined_len() == 0 {
                return Err(AppError::EmptyResult(format!("no FX bars for {}", fx_token)));
            }

            // Multiply on the union grid, keeping only the leg's own
            // timestamps so alignment semantics stay unchanged downstream.
            let pair = [leg.clone(), fx];
            let frame = align::align(&pair, AlignMode::Union, crate::constants::MAX_FFILL_BARS);
            let own: std::collections::HashSet<_> =
                leg.points.iter().filter(|p| p.v.is_some()).map(|p| p.t).collect();

            let mut points = Vec::new();
            for (row, t) in frame.index.iter().enumerate() {
                if !own.contains(t) {
                    continue;
                }
                let value = match (frame.columns[0][row], frame.columns[1][row]) {
                    (Some(v), Some(rate)) => Some(v * rate),
                    _ => None,
                };
                points.push(Point { t: *t, v: value });
            }
            let mut out = Series::with_points(leg.label.clone(), leg.unit, points);
            out.expr = leg.expr.clone();
            converted.push(out);
        }
        Ok(converted)
    }
}
