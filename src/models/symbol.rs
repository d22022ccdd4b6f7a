use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use crate::error::{AppError, Result};

/// Futures month codes (F=Jan .. Z=Dec).
pub const MONTH_CODES: &[(char, u32)] = &[
    ('F', 1),
    ('G', 2),
    ('H', 3),
    ('J', 4),
    ('K', 5),
    ('M', 6),
    ('N', 7),
    ('Q', 8),
    ('U', 9),
    ('V', 10),
    ('X', 11),
    ('Z', 12),
];

pub fn month_code_to_month(code: char) -> Option<u32> {
    MONTH_CODES.iter().find(|(c, _)| *c == code).map(|(_, m)| *m)
}

pub fn month_to_month_code(month: u32) -> Option<char> {
    MONTH_CODES.iter().find(|(_, m)| *m == month).map(|(c, _)| *c)
}

/// Cash indices the resolver knows without an upstream round trip.
/// Kept deliberately small; anything else falls through to `UnknownSymbol`.
pub const KNOWN_CASH_INDICES: &[&str] = &[
    "SPX", "NDX", "RUT", "VIX", "DAX", "MDAX", "SX5E", "SX7E", "FTSE", "UKX", "SMI", "N225",
    "TOPX", "HSI", "HHI", "HSTECH", "IBEX", "FTMIB",
];

/// User-facing index aliases mapped to the upstream cash symbol at resolve
/// time. Parsing keeps the raw name so tokens round-trip unchanged.
pub const INDEX_ALIASES: &[(&str, &str)] = &[
    ("ESTX50", "SX5E"),
    ("HSCEI", "HHI"),
    ("RTY", "RUT"),
];

pub fn index_alias(name: &str) -> &str {
    INDEX_ALIASES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
        .unwrap_or(name)
}

fn is_known_index(name: &str) -> bool {
    let canonical = index_alias(name);
    KNOWN_CASH_INDICES.contains(&canonical)
}

/// A canonical symbol token, `NAMESPACE:BODY` with NAMESPACE in
/// {EQ, FX, IX}. Parsing and `Display` round-trip exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SymbolToken {
    /// `EQ:TICKER`, `EQ:TICKER.XX` (2-letter region) or `EQ:TICKER.VENUE`.
    Equity { ticker: String, suffix: Option<String> },
    /// `FX:EURUSD` — a six-letter pair.
    Fx { pair: String },
    /// `IX:NAME` — cash index (raw, pre-alias).
    Index { name: String },
    /// `IX:ROOT.A` — continuous back-adjusted future.
    ContinuousFuture { root: String },
    /// `IX:ROOT<N>` — N-th contract from the front, N in 1..=9.
    PositionalFuture { root: String, position: u8 },
    /// `IX:ROOT<M><YY>` — explicit contract by month code and 2-digit year.
    FutureContract { root: String, month_code: char, year2: u8 },
}

impl SymbolToken {
    pub fn parse(raw: &str) -> Result<Self> {
        let token = raw.trim();
        let (namespace, body) = token.split_once(':').ok_or_else(|| {
            AppError::MalformedToken(format!(
                "'{}' (expected NAMESPACE:BODY like EQ:SPY, FX:EURUSD, IX:ES.A)",
                raw
            ))
        })?;

        let body = body.trim().to_ascii_uppercase();
        if body.is_empty() {
            return Err(AppError::MalformedToken(format!("'{}' has an empty body", raw)));
        }

        match namespace.trim().to_ascii_uppercase().as_str() {
            "EQ" => parse_equity(&body, raw),
            "FX" => parse_fx(&body, raw),
            "IX" => parse_ix(&body, raw),
            other => Err(AppError::MalformedToken(format!(
                "namespace '{}' in '{}' (use EQ, FX or IX)",
                other, raw
            ))),
        }
    }

    /// True when resolving needs the futures roll calendar.
    pub fn is_futures(&self) -> bool {
        matches!(
            self,
            SymbolToken::ContinuousFuture { .. }
                | SymbolToken::PositionalFuture { .. }
                | SymbolToken::FutureContract { .. }
        )
    }
}

fn valid_body_chars(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

fn parse_equity(body: &str, raw: &str) -> Result<SymbolToken> {
    let (ticker, suffix) = match body.split_once('.') {
        Some((t, s)) => (t, Some(s.to_string())),
        None => (body, None),
    };
    if !valid_body_chars(ticker) {
        return Err(AppError::MalformedToken(format!("equity ticker in '{}'", raw)));
    }
    if let Some(ref s) = suffix {
        if !valid_body_chars(s) {
            return Err(AppError::MalformedToken(format!("equity suffix in '{}'", raw)));
        }
    }
    Ok(SymbolToken::Equity { ticker: ticker.to_string(), suffix })
}

fn parse_fx(body: &str, raw: &str) -> Result<SymbolToken> {
    if body.len() != 6 || !body.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::MalformedToken(format!(
            "'{}' (FX pairs are six letters, like FX:EURUSD)",
            raw
        )));
    }
    Ok(SymbolToken::Fx { pair: body.to_string() })
}

fn parse_ix(body: &str, raw: &str) -> Result<SymbolToken> {
    // Continuous: IX:ES.A
    if let Some(root) = body.strip_suffix(".A") {
        if !valid_body_chars(root) {
            return Err(AppError::MalformedToken(format!("futures root in '{}'", raw)));
        }
        return Ok(SymbolToken::ContinuousFuture { root: root.to_string() });
    }
    if body.contains('.') {
        return Err(AppError::MalformedToken(format!(
            "'{}' (only the .A continuous suffix is supported on IX tokens)",
            raw
        )));
    }
    if !valid_body_chars(body) {
        return Err(AppError::MalformedToken(format!("index body in '{}'", raw)));
    }

    // Known cash indices win before any futures-shaped interpretation, so
    // names like N225 never parse as a positional selector.
    if is_known_index(body) {
        return Ok(SymbolToken::Index { name: body.to_string() });
    }

    // Explicit contract: ROOT + month code + 2-digit year (e.g. ESU26).
    if body.len() >= 4 {
        let bytes = body.as_bytes();
        let year_part = &body[body.len() - 2..];
        let code = bytes[body.len() - 3] as char;
        if year_part.chars().all(|c| c.is_ascii_digit()) && month_code_to_month(code).is_some() {
            let root = &body[..body.len() - 3];
            if valid_body_chars(root) && root.chars().any(|c| c.is_ascii_alphabetic()) {
                return Ok(SymbolToken::FutureContract {
                    root: root.to_string(),
                    month_code: code,
                    year2: year_part.parse().expect("two digits"),
                });
            }
        }
    }

    // Positional: ROOT + single digit 1..=9 (e.g. ES1).
    if body.len() >= 2 {
        let last = body.chars().last().expect("non-empty");
        let prefix = &body[..body.len() - 1];
        if ('1'..='9').contains(&last) && prefix.chars().all(|c| c.is_ascii_alphabetic()) {
            return Ok(SymbolToken::PositionalFuture {
                root: prefix.to_string(),
                position: last.to_digit(10).expect("digit") as u8,
            });
        }
    }

    // Anything else is a cash index the resolver may still reject.
    Ok(SymbolToken::Index { name: body.to_string() })
}

impl Display for SymbolToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SymbolToken::Equity { ticker, suffix: Some(s) } => write!(f, "EQ:{}.{}", ticker, s),
            SymbolToken::Equity { ticker, suffix: None } => write!(f, "EQ:{}", ticker),
            SymbolToken::Fx { pair } => write!(f, "FX:{}", pair),
            SymbolToken::Index { name } => write!(f, "IX:{}", name),
            SymbolToken::ContinuousFuture { root } => write!(f, "IX:{}.A", root),
            SymbolToken::PositionalFuture { root, position } => write!(f, "IX:{}{}", root, position),
            SymbolToken::FutureContract { root, month_code, year2 } => {
                write!(f, "IX:{}{}{:02}", root, month_code, year2)
            }
        }
    }
}

impl TryFrom<String> for SymbolToken {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        SymbolToken::parse(&value)
    }
}

impl From<SymbolToken> for String {
    fn from(value: SymbolToken) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_equities() {
        assert_eq!(
            SymbolToken::parse("EQ:SPY").unwrap(),
            SymbolToken::Equity { ticker: "SPY".into(), suffix: None }
        );
        assert_eq!(
            SymbolToken::parse("eq:sap.gy").unwrap(),
            SymbolToken::Equity { ticker: "SAP".into(), suffix: Some("GY".into()) }
        );
        assert_eq!(
            SymbolToken::parse("EQ:SAP.IBIS").unwrap(),
            SymbolToken::Equity { ticker: "SAP".into(), suffix: Some("IBIS".into()) }
        );
        assert!(SymbolToken::parse("EQ:").is_err());
        assert!(SymbolToken::parse("SPY").is_err());
    }

    #[test]
    fn parses_fx() {
        assert_eq!(
            SymbolToken::parse("FX:EURUSD").unwrap(),
            SymbolToken::Fx { pair: "EURUSD".into() }
        );
        assert!(SymbolToken::parse("FX:EUR").is_err());
        assert!(SymbolToken::parse("FX:EURUSD1").is_err());
    }

    #[test]
    fn parses_futures_selectors() {
        assert_eq!(
            SymbolToken::parse("IX:ES.A").unwrap(),
            SymbolToken::ContinuousFuture { root: "ES".into() }
        );
        assert_eq!(
            SymbolToken::parse("IX:ES1").unwrap(),
            SymbolToken::PositionalFuture { root: "ES".into(), position: 1 }
        );
        assert_eq!(
            SymbolToken::parse("IX:ESU26").unwrap(),
            SymbolToken::FutureContract { root: "ES".into(), month_code: 'U', year2: 26 }
        );
        assert_eq!(
            SymbolToken::parse("IX:MNQ2").unwrap(),
            SymbolToken::PositionalFuture { root: "MNQ".into(), position: 2 }
        );
    }

    #[test]
    fn known_indices_beat_selector_shapes() {
        // N225 ends in a digit but is a cash index, not ES-style positional.
        assert_eq!(
            SymbolToken::parse("IX:N225").unwrap(),
            SymbolToken::Index { name: "N225".into() }
        );
        assert_eq!(
            SymbolToken::parse("IX:SPX").unwrap(),
            SymbolToken::Index { name: "SPX".into() }
        );
        // Aliases are recognized but kept raw for round-tripping.
        assert_eq!(
            SymbolToken::parse("IX:ESTX50").unwrap(),
            SymbolToken::Index { name: "ESTX50".into() }
        );
    }

    #[test]
    fn display_round_trips() {
        for raw in [
            "EQ:SPY",
            "EQ:SAP.GY",
            "EQ:700.HK",
            "FX:EURUSD",
            "IX:SPX",
            "IX:ESTX50",
            "IX:ES.A",
            "IX:ES1",
            "IX:ESU26",
            "IX:MNQ2",
        ] {
            let token = SymbolToken::parse(raw).unwrap();
            assert_eq!(token.to_string(), raw, "round-trip of {}", raw);
        }
    }

    #[test]
    fn rejects_malformed_tokens() {
        for raw in ["XX:SPY", "IX:ES.B", "IX:", "EQ:SP Y", "FX:EUR/USD"] {
            assert!(SymbolToken::parse(raw).is_err(), "{} should fail", raw);
        }
        // A trailing zero is not a positional selector; it stays a cash name.
        assert_eq!(
            SymbolToken::parse("IX:ES0").unwrap(),
            SymbolToken::Index { name: "ES0".into() }
        );
    }

    #[test]
    fn alias_lookup() {
        assert_eq!(index_alias("ESTX50"), "SX5E");
        assert_eq!(index_alias("RTY"), "RUT");
        assert_eq!(index_alias("SPX"), "SPX");
    }
}
