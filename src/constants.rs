//! Shared defaults for the session coordinator, caches and alignment.

/// Maximum concurrent in-flight upstream requests.
pub const DEFAULT_INFLIGHT_SLOTS: usize = 50;

/// Upstream pacing budget (requests per sliding 60-second window).
pub const DEFAULT_RATE_LIMIT_PER_MIN: u32 = 60;

/// Per-fetch upstream timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Per-caller deadline in seconds (queue dwell included).
pub const DEFAULT_CALLER_DEADLINE_SECS: u64 = 60;

/// Bounded retry attempts for transient upstream errors.
pub const MAX_RETRY_ATTEMPTS: u32 = 4;

/// Exponential backoff base in milliseconds (factor 2, capped below).
pub const RETRY_BACKOFF_BASE_MS: u64 = 250;

/// Backoff cap in milliseconds.
pub const RETRY_BACKOFF_CAP_MS: u64 = 5_000;

/// Forward-fill cap: a leg carries its last observation over at most this
/// many consecutive missing bars before the point becomes undefined.
pub const MAX_FFILL_BARS: usize = 5;

/// Total bar count bound for the in-memory bar cache (LRU beyond this).
pub const BAR_CACHE_MAX_BARS: usize = 2_000_000;

/// Bar cache entry TTL in seconds.
pub const BAR_CACHE_TTL_SECS: u64 = 300;

/// Expiry calendar TTL in seconds (24 hours).
pub const EXPIRY_CALENDAR_TTL_SECS: u64 = 24 * 3600;

/// Trading seconds in a US equity session, used to scale intraday
/// annualization factors (6.5 hours).
pub const TRADING_SECONDS_PER_DAY: f64 = 6.5 * 3600.0;

/// Trading days per year for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Default mass fraction captured by the volume-profile value area.
pub const VALUE_AREA_FRACTION: f64 = 0.70;

/// Default price-bin count for volume profiles.
pub const VOLUME_PROFILE_BINS: usize = 50;

/// A seasonality year needs at least this many points to be included
/// in percentile bands and aggregates.
pub const MIN_POINTS_PER_YEAR: usize = 30;

/// Roll this many trading days before a contract's last trading day
/// unless the root overrides it.
pub const DEFAULT_ROLL_DAYS: u32 = 3;
