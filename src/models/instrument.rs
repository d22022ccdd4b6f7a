use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SymbolToken;

/// A concrete, upstream-qualifiable contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContractSpec {
    Stock {
        symbol: String,
        exchange: String,
        currency: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        primary_exchange: Option<String>,
    },
    Forex {
        pair: String,
    },
    CashIndex {
        symbol: String,
        exchange: String,
        currency: String,
    },
    Future {
        /// Upstream product root (e.g. ES, FDAX).
        root: String,
        exchange: String,
        currency: String,
        /// Local contract code, e.g. ESU26.
        local_symbol: String,
        /// Last trading day, YYYYMMDD.
        expiry: String,
    },
}

impl ContractSpec {
    /// Stable cache-key component. Two requests for the same upstream
    /// contract must produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        match self {
            ContractSpec::Stock { symbol, exchange, currency, primary_exchange } => format!(
                "stk:{}:{}:{}:{}",
                symbol,
                exchange,
                currency,
                primary_exchange.as_deref().unwrap_or("-")
            ),
            ContractSpec::Forex { pair } => format!("fx:{}", pair),
            ContractSpec::CashIndex { symbol, exchange, currency } => {
                format!("ind:{}:{}:{}", symbol, exchange, currency)
            }
            ContractSpec::Future { root, exchange, local_symbol, .. } => {
                format!("fut:{}:{}:{}", root, exchange, local_symbol)
            }
        }
    }

    pub fn currency(&self) -> &str {
        match self {
            ContractSpec::Stock { currency, .. } => currency,
            // FX legs are quoted in the pair's quote currency.
            ContractSpec::Forex { pair } => &pair[3..],
            ContractSpec::CashIndex { currency, .. } => currency,
            ContractSpec::Future { currency, .. } => currency,
        }
    }

    pub fn exchange(&self) -> &str {
        match self {
            ContractSpec::Stock { primary_exchange, exchange, .. } => {
                primary_exchange.as_deref().unwrap_or(exchange)
            }
            ContractSpec::Forex { .. } => "IDEALPRO",
            ContractSpec::CashIndex { exchange, .. } => exchange,
            ContractSpec::Future { exchange, .. } => exchange,
        }
    }
}

/// Display metadata carried next to a resolved contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayMeta {
    pub currency: String,
    pub exchange: String,
    pub multiplier: f64,
}

/// A resolved contract plus its display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub spec: ContractSpec,
    pub display: DisplayMeta,
}

/// One entry of a resolution chain: the instrument is the valid source of
/// bars over `[from, to)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSegment {
    pub instrument: Instrument,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Resolution output: segments ordered by validity start. Segments partition
/// the covered part of the requested range; anything uncovered surfaces as
/// missing data downstream.
#[derive(Debug, Clone)]
pub struct ResolvedChain {
    pub token: SymbolToken,
    pub segments: Vec<ChainSegment>,
    /// Apply ratio back-adjustment when stitching segment closes.
    pub back_adjust: bool,
}

impl ResolvedChain {
    pub fn single(token: SymbolToken, instrument: Instrument, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            token,
            segments: vec![ChainSegment { instrument, from, to }],
            back_adjust: false,
        }
    }
}

// ----------------------------
// Static venue tables
// ----------------------------

/// Equity region suffix -> (currency, primary exchange). US has no primary
/// pin; SMART routing picks the venue.
pub const EQUITY_REGIONS: &[(&str, &str, Option<&str>)] = &[
    ("US", "USD", None),
    ("HK", "HKD", Some("SEHK")),
    ("JP", "JPY", Some("TSEJ")),
    ("LN", "GBP", Some("LSE")),
    ("GY", "EUR", Some("IBIS")),
    ("FR", "EUR", Some("SBF")),
    ("SW", "CHF", Some("SWX")),
    ("SP", "EUR", Some("BME")),
    ("IT", "EUR", Some("BVME")),
    ("CA", "CAD", Some("TSE")),
    ("AU", "AUD", Some("ASX")),
    ("SG", "SGD", Some("SGX")),
];

pub fn equity_region(code: &str) -> Option<(&'static str, Option<&'static str>)> {
    EQUITY_REGIONS
        .iter()
        .find(|(r, _, _)| *r == code)
        .map(|(_, ccy, primary)| (*ccy, *primary))
}

/// Cash index -> (upstream symbol, exchange, currency).
pub const INDEX_DEFAULTS: &[(&str, &str, &str, &str)] = &[
    ("SPX", "SPX", "CBOE", "USD"),
    ("NDX", "NDX", "NASDAQ", "USD"),
    ("RUT", "RUT", "RUSSELL", "USD"),
    ("VIX", "VIX", "CBOE", "USD"),
    ("DAX", "DAX", "EUREX", "EUR"),
    ("MDAX", "MDAX", "EUREX", "EUR"),
    ("SX5E", "SX5E", "EUREX", "EUR"),
    ("SX7E", "SX7E", "EUREX", "EUR"),
    ("FTSE", "FTSE", "LSE", "GBP"),
    ("UKX", "UKX", "LSE", "GBP"),
    ("SMI", "SMI", "SWX", "CHF"),
    ("N225", "N225", "OSE.JPN", "JPY"),
    ("TOPX", "TOPX", "OSE.JPN", "JPY"),
    ("HSI", "HSI", "HKFE", "HKD"),
    ("HHI", "HHI", "HKFE", "HKD"),
    ("HSTECH", "HSTECH", "HKFE", "HKD"),
    ("IBEX", "IBEX", "MEFFRV", "EUR"),
    ("FTMIB", "FTMIB", "IDEM", "EUR"),
];

pub fn index_default(name: &str) -> Option<(&'static str, &'static str, &'static str)> {
    INDEX_DEFAULTS
        .iter()
        .find(|(n, _, _, _)| *n == name)
        .map(|(_, sym, exch, ccy)| (*sym, *exch, *ccy))
}

/// Futures product registry: root -> (upstream root, exchange, currency,
/// multiplier, roll days before last trading day). A minimal starter set;
/// unknown roots go through upstream discovery via the expiry calendar.
pub const FUTURES_ROOTS: &[(&str, &str, &str, &str, f64, u32)] = &[
    ("ES", "ES", "CME", "USD", 50.0, 8),
    ("MES", "MES", "CME", "USD", 5.0, 8),
    ("NQ", "NQ", "CME", "USD", 20.0, 8),
    ("MNQ", "MNQ", "CME", "USD", 2.0, 8),
    ("RTY", "RTY", "CME", "USD", 50.0, 8),
    ("DAX", "FDAX", "EUREX", "EUR", 25.0, 3),
    ("FDAX", "FDAX", "EUREX", "EUR", 25.0, 3),
    ("FESX", "FESX", "EUREX", "EUR", 10.0, 3),
    ("CL", "CL", "NYMEX", "USD", 1000.0, 3),
    ("GC", "GC", "COMEX", "USD", 100.0, 3),
];

pub struct FutureProduct {
    pub root: &'static str,
    pub exchange: &'static str,
    pub currency: &'static str,
    pub multiplier: f64,
    pub roll_days: u32,
}

pub fn future_product(root: &str) -> Option<FutureProduct> {
    FUTURES_ROOTS
        .iter()
        .find(|(r, _, _, _, _, _)| *r == root)
        .map(|(_, upstream, exchange, currency, multiplier, roll_days)| FutureProduct {
            root: upstream,
            exchange,
            currency,
            multiplier: *multiplier,
            roll_days: *roll_days,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprints_are_stable_and_distinct() {
        let spy = ContractSpec::Stock {
            symbol: "SPY".into(),
            exchange: "SMART".into(),
            currency: "USD".into(),
            primary_exchange: None,
        };
        let fx = ContractSpec::Forex { pair: "EURUSD".into() };
        assert_eq!(spy.fingerprint(), spy.clone().fingerprint());
        assert_ne!(spy.fingerprint(), fx.fingerprint());
    }

    #[test]
    fn fx_quote_currency() {
        let fx = ContractSpec::Forex { pair: "EURUSD".into() };
        assert_eq!(fx.currency(), "USD");
        let fx2 = ContractSpec::Forex { pair: "USDJPY".into() };
        assert_eq!(fx2.currency(), "JPY");
    }

    #[test]
    fn tables_resolve() {
        assert_eq!(equity_region("GY"), Some(("EUR", Some("IBIS"))));
        assert_eq!(equity_region("US"), Some(("USD", None)));
        assert!(equity_region("ZZ").is_none());

        let (sym, exch, ccy) = index_default("SPX").unwrap();
        assert_eq!((sym, exch, ccy), ("SPX", "CBOE", "USD"));

        let es = future_product("ES").unwrap();
        assert_eq!(es.exchange, "CME");
        assert_eq!(es.roll_days, 8);
        // DAX maps onto the FDAX product.
        assert_eq!(future_product("DAX").unwrap().root, "FDAX");
    }
}
