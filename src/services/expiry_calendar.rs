//! Per-root futures expiry calendar.
//!
//! Contracts are discovered from the upstream once per TTL and persisted as
//! one CSV per root under `<state_dir>/expiries/`, so a restart does not
//! need the gateway to serve futures requests. A stale calendar is still
//! used when the upstream cannot enumerate (stale-on-failure); a root with
//! neither upstream nor disk data is unknown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::future_product;
use crate::services::gateway::{ContractListing, HistoricalSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalendarRow {
    contract: String,
    listing_date: chrono::NaiveDate,
    last_trading_day: chrono::NaiveDate,
    refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CalendarEntry {
    refreshed_at: DateTime<Utc>,
    listings: Vec<ContractListing>,
}

pub struct ExpiryCalendar {
    dir: PathBuf,
    ttl: Duration,
    entries: Mutex<HashMap<String, CalendarEntry>>,
    /// Per-root refresh guard so concurrent misses trigger one upstream call.
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ExpiryCalendar {
    pub fn new(state_dir: &Path, ttl: Duration) -> Self {
        Self {
            dir: state_dir.join("expiries"),
            ttl,
            entries: Mutex::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_defaults(state_dir: &Path) -> Self {
        Self::new(
            state_dir,
            Duration::from_secs(crate::constants::EXPIRY_CALENDAR_TTL_SECS),
        )
    }

    /// Contracts for `root`, ordered by last trading day. Refreshes from the
    /// upstream when the cached calendar is past TTL.
    pub async fn chain(
        &self,
        root: &str,
        source: &dyn HistoricalSource,
    ) -> Result<Vec<ContractListing>> {
        let root = root.to_ascii_uppercase();

        if let Some(listings) = self.fresh_from_memory(&root).await {
            return Ok(listings);
        }

        let lock = self.root_lock(&root).await;
        let _guard = lock.lock().await;

        // Another task may have refreshed while this one waited.
        if let Some(listings) = self.fresh_from_memory(&root).await {
            return Ok(listings);
        }

        // Disk may hold a fresh-enough calendar from a previous process.
        if let Some(entry) = self.load_file(&root) {
            let usable = Utc::now() - entry.refreshed_at
                < chrono::Duration::from_std(self.ttl).expect("ttl fits");
            let listings = entry.listings.clone();
            self.entries.lock().await.insert(root.clone(), entry);
            if usable {
                return Ok(listings);
            }
        }

        let exchange = future_product(&root).map(|p| p.exchange).unwrap_or("SMART");
        match source.contracts(&root, exchange).await {
            Ok(mut listings) => {
                if listings.is_empty() {
                    return Err(AppError::UnknownRoot(root));
                }
                listings.sort_by_key(|l| l.last_trading_day);
                let entry = CalendarEntry { refreshed_at: Utc::now(), listings: listings.clone() };
                if let Err(e) = self.store_file(&root, &entry) {
                    tracing::warn!(root = %root, error = %e, "failed to persist expiry calendar");
                }
                self.entries.lock().await.insert(root, entry);
                Ok(listings)
            }
            Err(err) if err.is_retryable() => {
                // Stale calendar beats no calendar when the upstream is down.
                if let Some(entry) = self.entries.lock().await.get(&root) {
                    tracing::warn!(root = %root, error = %err, "using stale expiry calendar");
                    return Ok(entry.listings.clone());
                }
                Err(err)
            }
            Err(err) => {
                if matches!(err, AppError::UnknownSymbol(_)) {
                    return Err(AppError::UnknownRoot(root));
                }
                Err(err)
            }
        }
    }

    async fn fresh_from_memory(&self, root: &str) -> Option<Vec<ContractListing>> {
        let entries = self.entries.lock().await;
        let entry = entries.get(root)?;
        let age = Utc::now() - entry.refreshed_at;
        if age < chrono::Duration::from_std(self.ttl).expect("ttl fits") {
            Some(entry.listings.clone())
        } else {
            None
        }
    }

    async fn root_lock(&self, root: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks.entry(root.to_string()).or_default().clone()
    }

    fn file_path(&self, root: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", root))
    }

    fn load_file(&self, root: &str) -> Option<CalendarEntry> {
        let path = self.file_path(root);
        if !path.exists() {
            return None;
        }
        let mut reader = match csv::Reader::from_path(&path) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable expiry calendar");
                return None;
            }
        };

        let mut listings = Vec::new();
        let mut refreshed_at = None;
        for row in reader.deserialize::<CalendarRow>() {
            match row {
                Ok(row) => {
                    refreshed_at = Some(row.refreshed_at);
                    listings.push(ContractListing {
                        contract: row.contract,
                        listing_date: row.listing_date,
                        last_trading_day: row.last_trading_day,
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "corrupt expiry calendar row");
                    return None;
                }
            }
        }
        listings.sort_by_key(|l| l.last_trading_day);
        Some(CalendarEntry { refreshed_at: refreshed_at?, listings })
    }

    fn store_file(&self, root: &str, entry: &CalendarEntry) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut writer = csv::Writer::from_path(self.file_path(root))?;
        for listing in &entry.listings {
            writer.serialize(CalendarRow {
                contract: listing.contract.clone(),
                listing_date: listing.listing_date,
                last_trading_day: listing.last_trading_day,
                refreshed_at: entry.refreshed_at,
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bar, BarSize};
    use crate::services::gateway::HistoryRequest;
    use chrono::NaiveDate;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeSource {
        fn new(fail: bool) -> Self {
            Self { calls: AtomicUsize::new(0), fail }
        }
    }

    impl HistoricalSource for FakeSource {
        fn contracts(&self, root: &str, _exchange: &str) -> BoxFuture<'_, Result<Vec<ContractListing>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            let root = root.to_string();
            Box::pin(async move {
                if fail {
                    return Err(AppError::UpstreamUnavailable("down".into()));
                }
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

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("quantdesk-cal-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn discovers_once_then_serves_from_memory() {
        let dir = temp_dir("memo");
        let calendar = ExpiryCalendar::with_defaults(&dir);
        let source = FakeSource::new(false);

        let first = calendar.chain("ES", &source).await.unwrap();
        let second = calendar.chain("ES", &source).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first[0].contract, "ESH26");

        // A fresh calendar instance reads the persisted file without the
        // upstream.
        let calendar2 = ExpiryCalendar::with_defaults(&dir);
        let from_disk = calendar2.chain("ES", &FakeSource::new(true)).await.unwrap();
        assert_eq!(from_disk, first);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn stale_calendar_survives_upstream_outage() {
        let dir = temp_dir("stale");
        let calendar = ExpiryCalendar::new(&dir, Duration::from_millis(10));
        let good = FakeSource::new(false);
        let bad = FakeSource::new(true);

        calendar.chain("NQ", &good).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // TTL expired and the upstream is down: the stale entry is served.
        let listings = calendar.chain("NQ", &bad).await.unwrap();
        assert_eq!(listings.len(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unknown_root_without_any_calendar_fails() {
        let dir = temp_dir("unknown");
        let calendar = ExpiryCalendar::with_defaults(&dir);
        let bad = FakeSource::new(true);
        let err = calendar.chain("ZZZ", &bad).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
