//! Session and request coordinator.
//!
//! One logical upstream session serves every concurrent request intent.
//! The coordinator bounds in-flight work with a slot semaphore, paces
//! admissions through the shared sliding-window limiter, deduplicates
//! identical in-flight fetches, retries transient upstream failures with
//! jittered exponential backoff, and fills the bar cache with every result
//! regardless of whether the original caller is still waiting.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Notify, Semaphore};
use tokio::time::{sleep, timeout, Instant};

use crate::error::{AppError, Result};
use crate::models::{Bar, BarSize, ContractSpec};
use crate::services::bar_cache::{BarCache, BarKey, Lookup, SeriesKey};
use crate::services::gateway::{ContractListing, HistoricalSource, HistoryRequest};
use crate::services::rate_limiter::SharedRateLimiter;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub inflight_slots: usize,
    pub rate_limit_per_min: u32,
    pub fetch_timeout: Duration,
    pub caller_deadline: Duration,
    pub max_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inflight_slots: crate::constants::DEFAULT_INFLIGHT_SLOTS,
            rate_limit_per_min: crate::constants::DEFAULT_RATE_LIMIT_PER_MIN,
            fetch_timeout: Duration::from_secs(crate::constants::DEFAULT_FETCH_TIMEOUT_SECS),
            caller_deadline: Duration::from_secs(crate::constants::DEFAULT_CALLER_DEADLINE_SECS),
            max_attempts: crate::constants::MAX_RETRY_ATTEMPTS,
        }
    }
}

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_SHUTDOWN: u8 = 2;

type FetchResult = std::result::Result<Arc<Vec<Bar>>, AppError>;
type InflightMap = Arc<Mutex<HashMap<BarKey, broadcast::Sender<FetchResult>>>>;

pub struct MarketSession {
    source: Arc<dyn HistoricalSource>,
    cache: Arc<BarCache>,
    limiter: Arc<SharedRateLimiter>,
    slots: Arc<Semaphore>,
    inflight: InflightMap,
    state: AtomicU8,
    active: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    config: SessionConfig,
}

impl MarketSession {
    pub fn new(source: Arc<dyn HistoricalSource>, cache: Arc<BarCache>, config: SessionConfig) -> Self {
        Self {
            limiter: Arc::new(SharedRateLimiter::new(config.rate_limit_per_min)),
            slots: Arc::new(Semaphore::new(config.inflight_slots)),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            state: AtomicU8::new(STATE_IDLE),
            active: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
            source,
            cache,
            config,
        }
    }

    /// Probe the upstream and open the session for requests.
    pub async fn start(&self) -> Result<()> {
        self.source
            .ping()
            .await
            .map_err(|e| AppError::Config(format!("upstream gateway unreachable: {}", e)))?;
        self.state.store(STATE_RUNNING, Ordering::SeqCst);
        tracing::info!("market session started");
        Ok(())
    }

    /// Stop intake and wait for in-flight work to drain (bounded).
    pub async fn shutdown(&self) {
        self.state.store(STATE_SHUTDOWN, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.active.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                tracing::warn!(
                    remaining = self.active.load(Ordering::SeqCst),
                    "shutdown drain timed out"
                );
                break;
            }
            let _ = timeout(Duration::from_millis(200), self.drained.notified()).await;
        }
        tracing::info!("market session stopped");
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_RUNNING
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => Ok(()),
            STATE_SHUTDOWN => Err(AppError::Cancelled("session is shutting down".into())),
            _ => Err(AppError::UpstreamUnavailable("session not started".into())),
        }
    }

    /// Bars for one contract segment, cache first. Partial cache coverage
    /// fetches only the missing sub-ranges; expired entries are refreshed
    /// but still served when the upstream is down.
    pub async fn fetch_bars(
        &self,
        contract: &ContractSpec,
        bar_size: BarSize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        use_rth: bool,
    ) -> Result<Arc<Vec<Bar>>> {
        self.ensure_running()?;
        let series = SeriesKey::new(contract.fingerprint(), bar_size, use_rth);
        let key = BarKey::new(series.clone(), start, end);
        // All fetches run over the normalized range so identical intents
        // land on identical cache keys.
        let (start, end) = (key.start(), key.end());

        match self.cache.lookup(&key).await {
            Lookup::Hit(bars) => Ok(Arc::new(bars)),
            Lookup::Partial { have, missing } => {
                let mut combined = have;
                for (sub_start, sub_end) in missing {
                    let sub_key = BarKey::new(series.clone(), sub_start, sub_end);
                    let fetched = self
                        .dedup_fetch(sub_key, contract.clone(), bar_size, sub_start, sub_end, use_rth)
                        .await?;
                    combined.extend(fetched.iter().copied());
                }
                combined.sort_by_key(|b| b.time);
                combined.dedup_by_key(|b| b.time);
                Ok(Arc::new(combined))
            }
            Lookup::Stale(stale) => {
                match self
                    .dedup_fetch(key, contract.clone(), bar_size, start, end, use_rth)
                    .await
                {
                    Ok(bars) => Ok(bars),
                    Err(err) if err.is_retryable() => {
                        tracing::warn!(error = %err, "serving stale bars: upstream unavailable");
                        Ok(Arc::new(stale))
                    }
                    Err(err) => Err(err),
                }
            }
            Lookup::Miss => {
                self.dedup_fetch(key, contract.clone(), bar_size, start, end, use_rth)
                    .await
            }
        }
    }

    /// Futures chain enumeration, paced like any other upstream call.
    pub async fn contracts(&self, root: &str, exchange: &str) -> Result<Vec<ContractListing>> {
        self.ensure_running()?;
        self.limiter.acquire().await;
        self.source.contracts(root, exchange).await
    }

    /// Coordinator health for /health.
    pub async fn stats(&self) -> SessionStats {
        SessionStats {
            running: self.is_running(),
            inflight: self.active.load(Ordering::SeqCst),
            paced_last_minute: self.limiter.in_window().await,
            cached_bars: self.cache.total_bars().await,
        }
    }

    /// Single-flight fetch: the first caller for a key spawns the upstream
    /// task; identical concurrent requests attach to its broadcast. The
    /// spawned task finishes (and fills the cache) even when every waiter
    /// has gone away.
    async fn dedup_fetch(
        &self,
        key: BarKey,
        contract: ContractSpec,
        bar_size: BarSize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        use_rth: bool,
    ) -> Result<Arc<Vec<Bar>>> {
        let mut receiver = {
            let mut inflight = self.inflight.lock().await;
            if let Some(sender) = inflight.get(&key) {
                sender.subscribe()
            } else {
                let (sender, receiver) = broadcast::channel(1);
                inflight.insert(key.clone(), sender.clone());
                self.spawn_leader(key, sender, contract, bar_size, start, end, use_rth);
                receiver
            }
        };

        match timeout(self.config.caller_deadline, receiver.recv()).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AppError::Invariant("in-flight fetch dropped its channel".into())),
            Err(_) => Err(AppError::Timeout(format!(
                "fetch did not complete within {:?}",
                self.config.caller_deadline
            ))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_leader(
        &self,
        key: BarKey,
        sender: broadcast::Sender<FetchResult>,
        contract: ContractSpec,
        bar_size: BarSize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        use_rth: bool,
    ) {
        let source = Arc::clone(&self.source);
        let cache = Arc::clone(&self.cache);
        let limiter = Arc::clone(&self.limiter);
        let slots = Arc::clone(&self.slots);
        let active = Arc::clone(&self.active);
        let drained = Arc::clone(&self.drained);
        let inflight = Arc::clone(&self.inflight);
        let config = self.config.clone();

        active.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let result = run_upstream(
                &*source, &limiter, &slots, &config, &contract, bar_size, start, end, use_rth,
            )
            .await;

            if let Ok(bars) = &result {
                cache.insert(&key, bars.as_ref().clone()).await;
            }

            // Remove from the in-flight map before broadcasting so a caller
            // retrying immediately starts a fresh flight.
            inflight.lock().await.remove(&key);
            let _ = sender.send(result);

            if active.fetch_sub(1, Ordering::SeqCst) == 1 {
                drained.notify_waiters();
            }
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_upstream(
    source: &dyn HistoricalSource,
    limiter: &SharedRateLimiter,
    slots: &Semaphore,
    config: &SessionConfig,
    contract: &ContractSpec,
    bar_size: BarSize,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    use_rth: bool,
) -> FetchResult {
    let deadline = Instant::now() + config.caller_deadline;

    let _permit = match timeout(config.caller_deadline, slots.acquire()).await {
        Ok(Ok(permit)) => permit,
        Ok(Err(_)) => return Err(AppError::Cancelled("session slots closed".into())),
        Err(_) => return Err(AppError::Timeout("queued too long for an in-flight slot".into())),
    };

    let mut last_error = AppError::UpstreamUnavailable("no attempt made".into());
    for attempt in 0..config.max_attempts {
        if attempt > 0 {
            let backoff = backoff_with_jitter(attempt);
            if Instant::now() + backoff >= deadline {
                return Err(AppError::Timeout("deadline hit during retry backoff".into()));
            }
            tracing::info!(
                attempt,
                error = %last_error,
                backoff_ms = backoff.as_millis() as u64,
                "retrying upstream fetch"
            );
            sleep(backoff).await;
        }

        // Dwell check: drop the request when pacing cannot admit it in time
        // to matter.
        if !limiter.acquire_until(deadline.into()).await {
            return Err(AppError::Timeout("pacing queue exceeded the deadline".into()));
        }

        let request = HistoryRequest {
            contract: contract.clone(),
            bar_size,
            start,
            end,
            use_rth,
        };
        match timeout(config.fetch_timeout, source.history(request)).await {
            Ok(Ok(bars)) => return Ok(Arc::new(bars)),
            Ok(Err(err)) if err.is_retryable() => last_error = err,
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(AppError::Timeout(format!(
                    "upstream fetch exceeded {:?}",
                    config.fetch_timeout
                )))
            }
        }
    }
    Err(last_error)
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    use rand::Rng;
    let base = crate::constants::RETRY_BACKOFF_BASE_MS as f64;
    let capped =
        (base * 2f64.powi(attempt as i32 - 1)).min(crate::constants::RETRY_BACKOFF_CAP_MS as f64);
    // +/- 50% jitter keeps synchronized retries from re-pacing each other.
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_millis((capped * factor) as u64)
}

/// The session is itself a [`HistoricalSource`]: the same surface as the
/// raw gateway, with pacing, dedup, retry and caching layered in. The
/// resolver and expiry calendar consume it through this trait.
impl HistoricalSource for MarketSession {
    fn contracts(&self, root: &str, exchange: &str) -> futures::future::BoxFuture<'_, Result<Vec<ContractListing>>> {
        let root = root.to_string();
        let exchange = exchange.to_string();
        Box::pin(async move { MarketSession::contracts(self, &root, &exchange).await })
    }

    fn history(&self, request: HistoryRequest) -> futures::future::BoxFuture<'_, Result<Vec<Bar>>> {
        Box::pin(async move {
            let bars = self
                .fetch_bars(
                    &request.contract,
                    request.bar_size,
                    request.start,
                    request.end,
                    request.use_rth,
                )
                .await?;
            Ok(bars.as_ref().clone())
        })
    }

    fn ping(&self) -> futures::future::BoxFuture<'_, Result<()>> {
        self.source.ping()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionStats {
    pub running: bool,
    pub inflight: usize,
    pub paced_last_minute: usize,
    pub cached_bars: usize,
}
