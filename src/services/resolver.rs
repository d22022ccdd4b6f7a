//! Symbol resolver: canonical tokens to contract chains.
//!
//! EQ, FX and cash IX tokens become a single segment covering the whole
//! range. Futures selectors expand over the root's roll calendar into
//! per-contract validity segments; continuous chains additionally flag
//! ratio back-adjustment for the bar combiner.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};

use crate::error::{AppError, Result};
use crate::models::{
    equity_region, future_product, index_alias, index_default, month_code_to_month, ChainSegment,
    ContractSpec, DisplayMeta, Instrument, ResolvedChain, SymbolToken,
};
use crate::services::expiry_calendar::ExpiryCalendar;
use crate::services::gateway::{ContractListing, HistoricalSource};

pub struct Resolver;

impl Resolver {
    /// Resolve a token into its chain of (contract, validity) segments over
    /// `[start, end)`.
    pub async fn resolve(
        token: &SymbolToken,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        calendar: &ExpiryCalendar,
        source: &dyn HistoricalSource,
    ) -> Result<ResolvedChain> {
        if end <= start {
            return Err(AppError::EmptyRange(format!(
                "{} has start >= end",
                token
            )));
        }

        match token {
            SymbolToken::Equity { ticker, suffix } => {
                Ok(ResolvedChain::single(token.clone(), equity_instrument(ticker, suffix.as_deref())?, start, end))
            }
            SymbolToken::Fx { pair } => {
                let instrument = Instrument {
                    spec: ContractSpec::Forex { pair: pair.clone() },
                    display: DisplayMeta {
                        currency: pair[3..].to_string(),
                        exchange: "IDEALPRO".to_string(),
                        multiplier: 1.0,
                    },
                };
                Ok(ResolvedChain::single(token.clone(), instrument, start, end))
            }
            SymbolToken::Index { name } => {
                let canonical = index_alias(name);
                let (symbol, exchange, currency) = index_default(canonical).ok_or_else(|| {
                    AppError::UnknownSymbol(format!(
                        "index '{}' (no venue mapping; known indices only)",
                        name
                    ))
                })?;
                let instrument = Instrument {
                    spec: ContractSpec::CashIndex {
                        symbol: symbol.to_string(),
                        exchange: exchange.to_string(),
                        currency: currency.to_string(),
                    },
                    display: DisplayMeta {
                        currency: currency.to_string(),
                        exchange: exchange.to_string(),
                        multiplier: 1.0,
                    },
                };
                Ok(ResolvedChain::single(token.clone(), instrument, start, end))
            }
            SymbolToken::ContinuousFuture { root } => {
                let mut chain = futures_chain(token, root, 1, start, end, calendar, source).await?;
                chain.back_adjust = true;
                Ok(chain)
            }
            SymbolToken::PositionalFuture { root, position } => {
                futures_chain(token, root, *position as usize, start, end, calendar, source).await
            }
            SymbolToken::FutureContract { root, month_code, year2 } => {
                explicit_contract(token, root, *month_code, *year2, start, end, calendar, source).await
            }
        }
    }
}

fn equity_instrument(ticker: &str, suffix: Option<&str>) -> Result<Instrument> {
    let (currency, primary) = match suffix {
        None => ("USD", None),
        Some(code) if code.len() == 2 => equity_region(code).ok_or_else(|| {
            AppError::UnknownSymbol(format!(
                "equity region '{}' (use a mapped 2-letter code or a venue name)",
                code
            ))
        })?,
        // Longer suffixes are explicit venue overrides, e.g. EQ:SAP.IBIS.
        Some(venue) => {
            return Ok(Instrument {
                spec: ContractSpec::Stock {
                    symbol: ticker.to_string(),
                    exchange: venue.to_string(),
                    currency: "USD".to_string(),
                    primary_exchange: None,
                },
                display: DisplayMeta {
                    currency: "USD".to_string(),
                    exchange: venue.to_string(),
                    multiplier: 1.0,
                },
            })
        }
    };

    Ok(Instrument {
        spec: ContractSpec::Stock {
            symbol: ticker.to_string(),
            exchange: "SMART".to_string(),
            currency: currency.to_string(),
            primary_exchange: primary.map(str::to_string),
        },
        display: DisplayMeta {
            currency: currency.to_string(),
            exchange: primary.unwrap_or("SMART").to_string(),
            multiplier: 1.0,
        },
    })
}

/// Step a date back by `n` weekdays. The roll rule counts trading days; a
/// weekday approximation is what the roll calendar supports without venue
/// holiday data.
fn trading_days_before(date: NaiveDate, n: u32) -> NaiveDate {
    let mut date = date;
    let mut remaining = n;
    while remaining > 0 {
        date = date.pred_opt().expect("date underflow");
        match date.weekday() {
            Weekday::Sat | Weekday::Sun => {}
            _ => remaining -= 1,
        }
    }
    date
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).expect("midnight").and_utc()
}

fn future_instrument(root: &str, listing: &ContractListing) -> Instrument {
    let product = future_product(root);
    let (upstream_root, exchange, currency, multiplier) = match &product {
        Some(p) => (p.root, p.exchange, p.currency, p.multiplier),
        // Roots outside the static registry were still enumerable upstream;
        // default the venue fields.
        None => (root, "SMART", "USD", 1.0),
    };
    Instrument {
        spec: ContractSpec::Future {
            root: upstream_root.to_string(),
            exchange: exchange.to_string(),
            currency: currency.to_string(),
            local_symbol: listing.contract.clone(),
            expiry: listing.last_trading_day.format("%Y%m%d").to_string(),
        },
        display: DisplayMeta {
            currency: currency.to_string(),
            exchange: exchange.to_string(),
            multiplier,
        },
    }
}

/// Expand a continuous/positional selector into contract segments over the
/// requested range. `position` is 1-based distance from the front contract.
async fn futures_chain(
    token: &SymbolToken,
    root: &str,
    position: usize,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    calendar: &ExpiryCalendar,
    source: &dyn HistoricalSource,
) -> Result<ResolvedChain> {
    let listings = calendar.chain(root, source).await?;
    let roll_days = future_product(root)
        .map(|p| p.roll_days)
        .unwrap_or(crate::constants::DEFAULT_ROLL_DAYS);

    // Roll boundary of contract i: N trading days before its last trading
    // day. Contract i (at the requested position) supplies bars from the
    // previous boundary up to its own.
    let roll_instant = |listing: &ContractListing| -> DateTime<Utc> {
        day_start(trading_days_before(listing.last_trading_day, roll_days))
    };

    let mut segments: Vec<ChainSegment> = Vec::new();
    for (idx, listing) in listings.iter().enumerate() {
        let boundary_end = roll_instant(listing);
        let boundary_start = if idx == 0 {
            day_start(listing.listing_date)
        } else {
            roll_instant(&listings[idx - 1])
        };
        if boundary_end <= boundary_start {
            continue;
        }

        // The contract serving position P during [boundary_start,
        // boundary_end) sits P-1 places further down the chain.
        let Some(serving) = listings.get(idx + position - 1) else {
            continue;
        };

        let from = boundary_start.max(start);
        let to = boundary_end.min(end);
        if to <= from {
            continue;
        }
        segments.push(ChainSegment {
            instrument: future_instrument(root, serving),
            from,
            to,
        });
    }

    // The front window after the last roll boundary belongs to the final
    // contracts of the chain.
    if let Some(last) = listings.last() {
        let tail_start = roll_instant(last).max(start);
        let tail_end = day_start(last.last_trading_day).min(end);
        if tail_end > tail_start && position == 1 {
            segments.push(ChainSegment {
                instrument: future_instrument(root, last),
                from: tail_start,
                to: tail_end,
            });
        }
    }

    if segments.is_empty() {
        return Err(AppError::NoChainForRange(format!(
            "{} over {}..{}",
            token,
            start.date_naive(),
            end.date_naive()
        )));
    }

    segments.sort_by_key(|s| s.from);
    Ok(ResolvedChain { token: token.clone(), segments, back_adjust: false })
}

async fn explicit_contract(
    token: &SymbolToken,
    root: &str,
    month_code: char,
    year2: u8,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    calendar: &ExpiryCalendar,
    source: &dyn HistoricalSource,
) -> Result<ResolvedChain> {
    let listings = calendar.chain(root, source).await?;

    let month = month_code_to_month(month_code)
        .ok_or_else(|| AppError::MalformedToken(format!("month code '{}' in {}", month_code, token)))?;
    let year = 2000 + year2 as i32;

    let listing = listings
        .iter()
        .find(|l| l.last_trading_day.year() == year && l.last_trading_day.month() == month)
        .ok_or_else(|| {
            AppError::NoChainForRange(format!(
                "{} has no listed contract for {}-{:02}",
                token, year, month
            ))
        })?;

    // An explicit contract is valid over its trading life, clipped to the
    // requested range.
    let from = day_start(listing.listing_date).max(start);
    let to = day_start(listing.last_trading_day).min(end);
    if to <= from {
        return Err(AppError::NoChainForRange(format!(
            "{} trading life does not overlap {}..{}",
            token,
            start.date_naive(),
            end.date_naive()
        )));
    }

    Ok(ResolvedChain::single(
        token.clone(),
        future_instrument(root, listing),
        from,
        to,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;
    use crate::services::gateway::HistoryRequest;
    use chrono::TimeZone;
    use futures::future::BoxFuture;
    use std::path::PathBuf;

    struct ChainSource;

    impl HistoricalSource for ChainSource {
        fn contracts(&self, root: &str, _exchange: &str) -> BoxFuture<'_, Result<Vec<ContractListing>>> {
            let root = root.to_string();
            Box::pin(async move {
                // Quarterly chain around mid-2026.
                Ok(vec![
                    ContractListing {
                        contract: format!("{}H26", root),
                        listing_date: NaiveDate::from_ymd_opt(2025, 3, 21).unwrap(),
                        last_trading_day: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
                    },
                    ContractListing {
                        contract: format!("{}M26", root),
                        listing_date: NaiveDate::from_ymd_opt(2025, 6, 20).unwrap(),
                        last_trading_day: NaiveDate::from_ymd_opt(2026, 6, 19).unwrap(),
                    },
                    ContractListing {
                        contract: format!("{}U26", root),
                        listing_date: NaiveDate::from_ymd_opt(2025, 9, 19).unwrap(),
                        last_trading_day: NaiveDate::from_ymd_opt(2026, 9, 18).unwrap(),
                    },
                ])
            })
        }

        fn history(&self, _request: HistoryRequest) -> BoxFuture<'_, Result<Vec<Bar>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn ping(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn calendar() -> (ExpiryCalendar, PathBuf) {
        let dir = std::env::temp_dir().join(format!("quantdesk-resolver-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        (ExpiryCalendar::with_defaults(&dir), dir)
    }

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn equity_resolves_to_single_segment() {
        let (cal, dir) = calendar();
        let token = SymbolToken::parse("EQ:SPY").unwrap();
        let chain = Resolver::resolve(&token, ts(2026, 1, 1), ts(2026, 6, 1), &cal, &ChainSource)
            .await
            .unwrap();
        assert_eq!(chain.segments.len(), 1);
        assert!(!chain.back_adjust);
        match &chain.segments[0].instrument.spec {
            ContractSpec::Stock { symbol, exchange, currency, primary_exchange } => {
                assert_eq!(symbol, "SPY");
                assert_eq!(exchange, "SMART");
                assert_eq!(currency, "USD");
                assert!(primary_exchange.is_none());
            }
            other => panic!("unexpected spec {:?}", other),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn region_suffix_maps_currency_and_venue() {
        let (cal, dir) = calendar();
        let token = SymbolToken::parse("EQ:SAP.GY").unwrap();
        let chain = Resolver::resolve(&token, ts(2026, 1, 1), ts(2026, 2, 1), &cal, &ChainSource)
            .await
            .unwrap();
        let display = &chain.segments[0].instrument.display;
        assert_eq!(display.currency, "EUR");
        assert_eq!(display.exchange, "IBIS");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn continuous_chain_partitions_range() {
        let (cal, dir) = calendar();
        let token = SymbolToken::parse("IX:ES.A").unwrap();
        let start = ts(2026, 1, 5);
        let end = ts(2026, 8, 1);
        let chain = Resolver::resolve(&token, start, end, &cal, &ChainSource).await.unwrap();

        assert!(chain.back_adjust);
        assert!(chain.segments.len() >= 2, "expected multiple roll segments");
        // Segments are ordered and non-overlapping; each roll hands over
        // exactly where the previous segment ends.
        for pair in chain.segments.windows(2) {
            assert!(pair[0].to <= pair[1].from);
        }
        assert_eq!(chain.segments[0].from, start);
        // First contract serving January 2026 is the March contract.
        match &chain.segments[0].instrument.spec {
            ContractSpec::Future { local_symbol, .. } => assert_eq!(local_symbol, "ESH26"),
            other => panic!("unexpected spec {:?}", other),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn positional_two_picks_next_contract_out() {
        let (cal, dir) = calendar();
        let token = SymbolToken::parse("IX:ES2").unwrap();
        let chain = Resolver::resolve(&token, ts(2026, 1, 5), ts(2026, 2, 1), &cal, &ChainSource)
            .await
            .unwrap();
        match &chain.segments[0].instrument.spec {
            ContractSpec::Future { local_symbol, .. } => assert_eq!(local_symbol, "ESM26"),
            other => panic!("unexpected spec {:?}", other),
        }
        assert!(!chain.back_adjust);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn explicit_contract_covers_trading_life() {
        let (cal, dir) = calendar();
        let token = SymbolToken::parse("IX:ESM26").unwrap();
        let chain = Resolver::resolve(&token, ts(2025, 1, 1), ts(2027, 1, 1), &cal, &ChainSource)
            .await
            .unwrap();
        assert_eq!(chain.segments.len(), 1);
        let segment = &chain.segments[0];
        assert_eq!(segment.from, ts(2025, 6, 20));
        assert_eq!(segment.to, ts(2026, 6, 19));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn out_of_range_chain_fails() {
        let (cal, dir) = calendar();
        let token = SymbolToken::parse("IX:ES.A").unwrap();
        let err = Resolver::resolve(&token, ts(2030, 1, 1), ts(2030, 6, 1), &cal, &ChainSource)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoChainForRange(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn trading_day_arithmetic_skips_weekends() {
        // 2026-03-20 is a Friday; 8 trading days earlier is Tue 2026-03-10.
        let date = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        assert_eq!(
            trading_days_before(date, 8),
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
        );
    }
}
