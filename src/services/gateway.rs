//! HTTP client for the upstream market-data gateway.
//!
//! The gateway exposes a small JSON API on the local network:
//! `POST /v1/contracts` enumerates futures contracts for a root,
//! `POST /v1/history` returns historical bars for one qualified contract.
//! All pacing, retry and dedup policy lives in the session coordinator;
//! this client maps one request to one wire call and one typed result.

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use isahc::config::Configurable;
use isahc::prelude::*;
use isahc::HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Bar, BarSize, ContractSpec};

/// One contract row from upstream enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractListing {
    /// Local contract code, e.g. ESU26.
    pub contract: String,
    pub listing_date: NaiveDate,
    pub last_trading_day: NaiveDate,
}

/// A single bar fetch against one qualified contract.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRequest {
    pub contract: ContractSpec,
    pub bar_size: BarSize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub use_rth: bool,
}

/// Seam between the coordinator and the wire. Tests drive the coordinator
/// with an in-process fake; production uses [`GatewayClient`].
pub trait HistoricalSource: Send + Sync + 'static {
    /// Enumerate live and near-past contracts for a futures root.
    fn contracts(&self, root: &str, exchange: &str) -> BoxFuture<'_, Result<Vec<ContractListing>>>;

    /// Fetch historical bars for one contract segment.
    fn history(&self, request: HistoryRequest) -> BoxFuture<'_, Result<Vec<Bar>>>;

    /// Cheap liveness probe used by session start.
    fn ping(&self) -> BoxFuture<'_, Result<()>>;
}

pub struct GatewayClient {
    client: HttpClient,
    base_url: String,
    client_id: u32,
}

impl GatewayClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(crate::constants::DEFAULT_FETCH_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.gateway_base_url(),
            client_id: config.client_id,
        })
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let body = serde_json::to_string(payload)
            .map_err(|e| AppError::Invariant(format!("payload serialization: {}", e)))?;

        let request = isahc::Request::builder()
            .uri(&url)
            .method("POST")
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("X-Client-Id", self.client_id.to_string())
            .body(body)
            .map_err(|e| AppError::Invariant(format!("request build error: {}", e)))?;

        let response = self.client.send_async(request).await;

        let mut resp = match response {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                return Err(AppError::Timeout(format!("upstream call {} timed out", path)))
            }
            Err(e) => return Err(AppError::UpstreamUnavailable(format!("{}: {}", path, e))),
        };

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("response body: {}", e)))?;

        if status.as_u16() == 429 {
            return Err(AppError::PacingViolation(format!("{} rejected by pacing", path)));
        }
        if status.is_server_error() {
            return Err(AppError::UpstreamUnavailable(format!(
                "{} returned {}",
                path,
                status.as_u16()
            )));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| AppError::UpstreamUnavailable(format!("{}: bad JSON: {}", path, e)))?;

        // Gateway-level errors arrive as 200/4xx with an error object; the
        // message text distinguishes transient farm outages from bad requests.
        if let Some(err) = value.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown upstream error")
                .to_string();
            let lowered = message.to_ascii_lowercase();
            return Err(if lowered.contains("pacing") {
                AppError::PacingViolation(message)
            } else if lowered.contains("data farm") || lowered.contains("hmds") {
                AppError::NoDataFarm(message)
            } else if status.is_client_error() {
                AppError::UnknownSymbol(message)
            } else {
                AppError::UpstreamUnavailable(message)
            });
        }

        if status.is_client_error() {
            return Err(AppError::UnknownSymbol(format!(
                "{} returned {}",
                path,
                status.as_u16()
            )));
        }

        Ok(value)
    }
}

impl HistoricalSource for GatewayClient {
    fn contracts(&self, root: &str, exchange: &str) -> BoxFuture<'_, Result<Vec<ContractListing>>> {
        let payload = serde_json::json!({ "root": root, "exchange": exchange });
        let root = root.to_string();
        Box::pin(async move {
            let value = self.post("/contracts", &payload).await?;
            let rows = value
                .get("contracts")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    AppError::UpstreamUnavailable(format!(
                        "contract enumeration for {} had no 'contracts' array",
                        root
                    ))
                })?;

            let mut listings = Vec::with_capacity(rows.len());
            for row in rows {
                let listing: ContractListing = serde_json::from_value(row.clone()).map_err(|e| {
                    AppError::UpstreamUnavailable(format!("bad contract row for {}: {}", root, e))
                })?;
                listings.push(listing);
            }
            listings.sort_by_key(|l| l.last_trading_day);
            Ok(listings)
        })
    }

    fn history(&self, request: HistoryRequest) -> BoxFuture<'_, Result<Vec<Bar>>> {
        Box::pin(async move {
            // FX history comes from midpoint quotes, everything else trades.
            let what = match request.contract {
                ContractSpec::Forex { .. } => "MIDPOINT",
                _ => "TRADES",
            };
            let payload = serde_json::json!({
                "contract": request.contract,
                "bar_size": request.bar_size.to_wire(),
                "start": request.start.to_rfc3339(),
                "end": request.end.to_rfc3339(),
                "use_rth": request.use_rth,
                "what": what,
            });

            let value = self.post("/history", &payload).await?;
            let rows = value.get("bars").and_then(Value::as_array).ok_or_else(|| {
                AppError::UpstreamUnavailable("history response had no 'bars' array".into())
            })?;

            let mut bars = Vec::with_capacity(rows.len());
            for row in rows {
                bars.push(parse_bar(row)?);
            }
            bars.sort_by_key(|b| b.time);
            bars.dedup_by_key(|b| b.time);
            Ok(bars)
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.post("/ping", &serde_json::json!({})).await.map(|_| ())
        })
    }
}

fn parse_bar(row: &Value) -> Result<Bar> {
    let field = |name: &str| -> Result<f64> {
        row.get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| AppError::UpstreamUnavailable(format!("bar missing field '{}'", name)))
    };
    let t_ms = row
        .get("t")
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::UpstreamUnavailable("bar missing timestamp".into()))?;
    let time = DateTime::<Utc>::from_timestamp_millis(t_ms)
        .ok_or_else(|| AppError::UpstreamUnavailable(format!("bar timestamp {} out of range", t_ms)))?;

    Ok(Bar::new(
        time,
        field("o")?,
        field("h")?,
        field("l")?,
        field("c")?,
        row.get("v").and_then(Value::as_f64).unwrap_or(0.0),
    ))
}
