use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::models::Bar;

/// Regular-trading-hours session of one venue.
#[derive(Debug, Clone, Copy)]
pub struct RthSession {
    pub tz: Tz,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

fn session(tz: Tz, open_h: u32, open_m: u32, close_h: u32, close_m: u32) -> RthSession {
    RthSession {
        tz,
        open: NaiveTime::from_hms_opt(open_h, open_m, 0).expect("valid open"),
        close: NaiveTime::from_hms_opt(close_h, close_m, 0).expect("valid close"),
    }
}

/// Primary-venue RTH calendar. Venues outside this table pass bars through
/// unfiltered rather than guessing a session.
pub fn rth_session(exchange: &str) -> Option<RthSession> {
    use chrono_tz::{Asia, Europe, America};
    let s = match exchange.to_ascii_uppercase().as_str() {
        "SMART" | "NYSE" | "NASDAQ" | "ARCA" | "AMEX" | "CBOE" | "RUSSELL" | "BATS" => {
            session(America::New_York, 9, 30, 16, 0)
        }
        "LSE" => session(Europe::London, 8, 0, 16, 30),
        "IBIS" | "EUREX" | "FWB" => session(Europe::Berlin, 9, 0, 17, 30),
        "SBF" => session(Europe::Paris, 9, 0, 17, 30),
        "SWX" => session(Europe::Zurich, 9, 0, 17, 30),
        "BME" => session(Europe::Madrid, 9, 0, 17, 30),
        "BVME" | "IDEM" => session(Europe::Rome, 9, 0, 17, 30),
        "SEHK" | "HKFE" => session(Asia::Hong_Kong, 9, 30, 16, 0),
        "TSEJ" | "OSE.JPN" => session(Asia::Tokyo, 9, 0, 15, 0),
        "SGX" => session(Asia::Singapore, 9, 0, 17, 0),
        _ => return None,
    };
    Some(s)
}

/// Whether a UTC instant falls inside the venue session (weekdays only).
pub fn in_session(ts: DateTime<Utc>, session: &RthSession) -> bool {
    let local = ts.with_timezone(&session.tz);
    match local.weekday() {
        Weekday::Sat | Weekday::Sun => return false,
        _ => {}
    }
    let time = local.time();
    time >= session.open && time < session.close
}

/// Filter a leg's bars to the venue's regular session. Daily and coarser
/// bars are session aggregates already and pass through.
pub fn filter_rth(bars: Vec<Bar>, exchange: &str, intraday: bool) -> Vec<Bar> {
    if !intraday {
        return bars;
    }
    let Some(session) = rth_session(exchange) else {
        return bars;
    };
    bars.into_iter().filter(|b| in_session(b.time, &session)).collect()
}

/// Cache-control max-age for API responses: short while the US session is
/// open, relaxed otherwise.
pub fn cache_max_age(now: DateTime<Utc>) -> u32 {
    let us = rth_session("NYSE").expect("NYSE session is in the table");
    if in_session(now, &us) {
        30
    } else {
        120
    }
}

/// Seconds in a venue's regular session, used for intraday annualization.
pub fn session_seconds(exchange: &str) -> f64 {
    match rth_session(exchange) {
        Some(s) => {
            let open = s.open.num_seconds_from_midnight() as f64;
            let close = s.close.num_seconds_from_midnight() as f64;
            (close - open).max(0.0)
        }
        None => crate::constants::TRADING_SECONDS_PER_DAY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn us_session_boundaries() {
        let session = rth_session("NYSE").unwrap();
        // 2025-06-10 is a Tuesday. 14:30 UTC = 10:30 New York (EDT).
        let open = Utc.with_ymd_and_hms(2025, 6, 10, 14, 30, 0).unwrap();
        assert!(in_session(open, &session));
        // 20:00 UTC = 16:00 New York, already closed (half-open session).
        let close = Utc.with_ymd_and_hms(2025, 6, 10, 20, 0, 0).unwrap();
        assert!(!in_session(close, &session));
        // Saturday.
        let weekend = Utc.with_ymd_and_hms(2025, 6, 14, 15, 0, 0).unwrap();
        assert!(!in_session(weekend, &session));
    }

    #[test]
    fn daily_bars_pass_through() {
        let bars = vec![Bar::new(
            Utc.with_ymd_and_hms(2025, 6, 14, 0, 0, 0).unwrap(),
            1.0,
            1.0,
            1.0,
            1.0,
            0.0,
        )];
        let kept = filter_rth(bars.clone(), "NYSE", false);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn intraday_bars_outside_session_drop() {
        // 02:00 UTC on a Tuesday is outside the New York session.
        let night = Bar::new(
            Utc.with_ymd_and_hms(2025, 6, 10, 2, 0, 0).unwrap(),
            1.0,
            1.0,
            1.0,
            1.0,
            0.0,
        );
        let mid = Bar::new(
            Utc.with_ymd_and_hms(2025, 6, 10, 15, 0, 0).unwrap(),
            1.0,
            1.0,
            1.0,
            1.0,
            0.0,
        );
        let kept = filter_rth(vec![night, mid], "NYSE", true);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].time.hour(), 15);
    }

    #[test]
    fn unknown_venue_is_unfiltered() {
        let night = Bar::new(
            Utc.with_ymd_and_hms(2025, 6, 10, 2, 0, 0).unwrap(),
            1.0,
            1.0,
            1.0,
            1.0,
            0.0,
        );
        assert_eq!(filter_rth(vec![night], "MOONBASE", true).len(), 1);
    }

    #[test]
    fn session_lengths() {
        assert_eq!(session_seconds("NYSE"), 6.5 * 3600.0);
        assert_eq!(session_seconds("MOONBASE"), crate::constants::TRADING_SECONDS_PER_DAY);
    }
}
