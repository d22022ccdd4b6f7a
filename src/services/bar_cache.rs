//! In-memory bar cache: LRU by total bar count, TTL with stale-on-failure,
//! superset slicing and partial-range composition.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::models::{Bar, BarSize};

/// Identity of one bar series independent of range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub fingerprint: String,
    pub bar_size: BarSize,
    pub use_rth: bool,
}

impl SeriesKey {
    pub fn new(fingerprint: impl Into<String>, bar_size: BarSize, use_rth: bool) -> Self {
        Self { fingerprint: fingerprint.into(), bar_size, use_rth }
    }
}

/// Full cache key: series identity plus a right-open range normalized to
/// whole bar boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BarKey {
    pub series: SeriesKey,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl BarKey {
    pub fn new(series: SeriesKey, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let step = series.bar_size.seconds() * 1000;
        let start_ms = (start.timestamp_millis() / step) * step;
        let end_ms = ((end.timestamp_millis() + step - 1) / step) * step;
        Self { series, start_ms, end_ms }
    }

    pub fn start(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.start_ms).expect("normalized start")
    }

    pub fn end(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.end_ms).expect("normalized end")
    }
}

#[derive(Debug)]
struct CachedRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    bars: Vec<Bar>,
    fetched_at: Instant,
    last_used: Instant,
}

impl CachedRange {
    fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= start && self.end >= end
    }

    fn slice(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Bar> {
        self.bars
            .iter()
            .filter(|b| b.time >= start && b.time < end)
            .copied()
            .collect()
    }
}

/// Cache read outcome.
#[derive(Debug)]
pub enum Lookup {
    /// Fresh entry covering the whole range.
    Hit(Vec<Bar>),
    /// Expired entry covering the whole range; usable when the upstream is
    /// down (stale-on-failure).
    Stale(Vec<Bar>),
    /// Fresh entries cover part of the range; fetch only the gaps.
    Partial {
        have: Vec<Bar>,
        missing: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    },
    Miss,
}

struct Inner {
    map: HashMap<SeriesKey, Vec<CachedRange>>,
    total_bars: usize,
}

pub struct BarCache {
    inner: RwLock<Inner>,
    ttl: Duration,
    max_bars: usize,
}

impl BarCache {
    pub fn new(ttl: Duration, max_bars: usize) -> Self {
        Self {
            inner: RwLock::new(Inner { map: HashMap::new(), total_bars: 0 }),
            ttl,
            max_bars,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            Duration::from_secs(crate::constants::BAR_CACHE_TTL_SECS),
            crate::constants::BAR_CACHE_MAX_BARS,
        )
    }

    pub async fn lookup(&self, key: &BarKey) -> Lookup {
        let now = Instant::now();
        let start = key.start();
        let end = key.end();
        let mut inner = self.inner.write().await;

        let Some(ranges) = inner.map.get_mut(&key.series) else {
            return Lookup::Miss;
        };

        // Fresh superset wins outright.
        if let Some(range) = ranges
            .iter_mut()
            .find(|r| r.covers(start, end) && now.duration_since(r.fetched_at) < self.ttl)
        {
            range.last_used = now;
            return Lookup::Hit(range.slice(start, end));
        }

        // Compose from fresh partial coverage.
        let mut fresh: Vec<&mut CachedRange> = ranges
            .iter_mut()
            .filter(|r| now.duration_since(r.fetched_at) < self.ttl && r.start < end && r.end > start)
            .collect();
        fresh.sort_by_key(|r| r.start);

        if !fresh.is_empty() {
            let mut have = Vec::new();
            let mut missing = Vec::new();
            let mut cursor = start;
            for range in fresh.iter_mut() {
                if range.start > cursor {
                    missing.push((cursor, range.start.min(end)));
                }
                have.extend(range.slice(cursor.max(range.start), end));
                range.last_used = now;
                cursor = cursor.max(range.end);
                if cursor >= end {
                    break;
                }
            }
            if cursor < end {
                missing.push((cursor, end));
            }
            if missing.is_empty() {
                have.sort_by_key(|b| b.time);
                have.dedup_by_key(|b| b.time);
                return Lookup::Hit(have);
            }
            return Lookup::Partial { have, missing };
        }

        // Stale superset as a fallback.
        if let Some(range) = ranges.iter_mut().find(|r| r.covers(start, end)) {
            range.last_used = now;
            return Lookup::Stale(range.slice(start, end));
        }

        Lookup::Miss
    }

    /// Store bars for a range, merging with contiguous neighbors. A merge is
    /// only taken when the seam is continuous: no overlap handling beyond
    /// dedup, and no gap wider than one bar.
    pub async fn insert(&self, key: &BarKey, bars: Vec<Bar>) {
        let now = Instant::now();
        let step = ChronoDuration::seconds(key.series.bar_size.seconds());
        let mut inner = self.inner.write().await;

        let mut entry = CachedRange {
            start: key.start(),
            end: key.end(),
            bars,
            fetched_at: now,
            last_used: now,
        };

        let ranges = inner.map.entry(key.series.clone()).or_default();

        // Merge adjacent ranges that keep the seam continuous.
        let mut i = 0;
        while i < ranges.len() {
            let other = &ranges[i];
            let adjacent = other.end >= entry.start - step && other.start <= entry.end + step;
            if adjacent && seam_is_continuous(&other.bars, &entry.bars, step) {
                let other = ranges.swap_remove(i);
                entry.start = entry.start.min(other.start);
                entry.end = entry.end.max(other.end);
                entry.bars.extend(other.bars);
                entry.bars.sort_by_key(|b| b.time);
                entry.bars.dedup_by_key(|b| b.time);
            } else {
                i += 1;
            }
        }

        inner.total_bars = inner
            .map
            .values()
            .flat_map(|v| v.iter())
            .map(|r| r.bars.len())
            .sum::<usize>()
            + entry.bars.len();
        ranges_push(&mut inner.map, key.series.clone(), entry);

        self.evict_lru(&mut inner);
    }

    fn evict_lru(&self, inner: &mut Inner) {
        while inner.total_bars > self.max_bars {
            // Find the least recently used range across all series.
            let mut victim: Option<(SeriesKey, usize, Instant)> = None;
            for (key, ranges) in inner.map.iter() {
                for (idx, range) in ranges.iter().enumerate() {
                    match &victim {
                        Some((_, _, used)) if range.last_used >= *used => {}
                        _ => victim = Some((key.clone(), idx, range.last_used)),
                    }
                }
            }
            let Some((key, idx, _)) = victim else { break };
            if let Some(ranges) = inner.map.get_mut(&key) {
                let removed = ranges.swap_remove(idx);
                inner.total_bars -= removed.bars.len().min(inner.total_bars);
                if ranges.is_empty() {
                    inner.map.remove(&key);
                }
            }
        }
    }

    /// Total cached bars (for /health).
    pub async fn total_bars(&self) -> usize {
        self.inner.read().await.total_bars
    }
}

fn ranges_push(map: &mut HashMap<SeriesKey, Vec<CachedRange>>, key: SeriesKey, entry: CachedRange) {
    map.entry(key).or_default().push(entry);
}

fn seam_is_continuous(a: &[Bar], b: &[Bar], step: ChronoDuration) -> bool {
    let (Some(a_last), Some(b_first)) = (a.last(), b.first()) else {
        // An empty side cannot break the seam.
        return true;
    };
    // Orient by time; overlap is tolerated (deduped), a gap wider than one
    // bar is not.
    let (earlier_end, later_start) = if a_last.time <= b_first.time {
        (a_last.time, b_first.time)
    } else {
        match (b.last(), a.first()) {
            (Some(b_last), Some(a_first)) if b_last.time <= a_first.time => (b_last.time, a_first.time),
            _ => return true, // interleaved; dedup handles it
        }
    };
    later_start - earlier_end <= step * 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key(start_day: u32, end_day: u32) -> BarKey {
        BarKey::new(
            SeriesKey::new("stk:SPY", BarSize::Day1, true),
            Utc.with_ymd_and_hms(2025, 1, start_day, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, end_day, 0, 0, 0).unwrap(),
        )
    }

    fn bars(days: std::ops::Range<u32>) -> Vec<Bar> {
        days.map(|d| {
            Bar::new(
                Utc.with_ymd_and_hms(2025, 1, d, 0, 0, 0).unwrap(),
                d as f64,
                d as f64,
                d as f64,
                d as f64,
                100.0,
            )
        })
        .collect()
    }

    #[tokio::test]
    async fn superset_hit_slices() {
        let cache = BarCache::with_defaults();
        cache.insert(&key(1, 20), bars(1..20)).await;

        match cache.lookup(&key(5, 10)).await {
            Lookup::Hit(slice) => {
                assert_eq!(slice.len(), 5);
                assert_eq!(slice[0].close, 5.0);
                assert_eq!(slice.last().unwrap().close, 9.0);
            }
            other => panic!("expected hit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn partial_reports_missing_subranges() {
        let cache = BarCache::with_defaults();
        cache.insert(&key(1, 10), bars(1..10)).await;

        match cache.lookup(&key(5, 15)).await {
            Lookup::Partial { have, missing } => {
                assert_eq!(have.len(), 5); // days 5..10
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].0, key(10, 15).start());
                assert_eq!(missing[0].1, key(10, 15).end());
            }
            other => panic!("expected partial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn contiguous_inserts_merge() {
        let cache = BarCache::with_defaults();
        cache.insert(&key(1, 10), bars(1..10)).await;
        cache.insert(&key(10, 20), bars(10..20)).await;

        match cache.lookup(&key(1, 20)).await {
            Lookup::Hit(slice) => assert_eq!(slice.len(), 19),
            other => panic!("expected hit after merge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ttl_expiry_yields_stale() {
        let cache = BarCache::new(Duration::from_millis(30), 1_000_000);
        cache.insert(&key(1, 10), bars(1..10)).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        match cache.lookup(&key(2, 8)).await {
            Lookup::Stale(slice) => assert_eq!(slice.len(), 6),
            other => panic!("expected stale, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn lru_eviction_bounds_memory() {
        let cache = BarCache::new(Duration::from_secs(300), 25);
        cache.insert(&key(1, 20), bars(1..20)).await; // 19 bars
        // Touch the first entry so the second becomes the LRU candidate later.
        let _ = cache.lookup(&key(1, 5)).await;

        let other_key = BarKey::new(
            SeriesKey::new("stk:QQQ", BarSize::Day1, true),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap(),
        );
        cache.insert(&other_key, bars(1..20)).await; // 38 total -> evict one
        assert!(cache.total_bars().await <= 25);
    }

    #[test]
    fn keys_normalize_to_bar_boundaries() {
        let series = SeriesKey::new("stk:SPY", BarSize::Hour1, false);
        let key = BarKey::new(
            series,
            Utc.with_ymd_and_hms(2025, 1, 2, 10, 17, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 2, 12, 1, 0).unwrap(),
        );
        assert_eq!(key.start(), Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap());
        assert_eq!(key.end(), Utc.with_ymd_and_hms(2025, 1, 2, 13, 0, 0).unwrap());
    }
}
