//! Volume profile: how traded volume distributes across price.
//!
//! Each bar's volume is smeared uniformly across its [low, high] span and
//! allocated to fixed-width price bins proportional to overlap. The value
//! area grows outward from the point of control until it captures the
//! configured mass fraction.

use serde::Serialize;

use crate::models::Bar;

#[derive(Debug, Clone, Serialize)]
pub struct ProfileBin {
    /// Bin center price.
    pub price: f64,
    pub volume: f64,
    /// Share of total volume in percent.
    pub pct: f64,
    /// Cumulative share from the lowest bin, in percent.
    pub cum_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeProfile {
    pub bins: Vec<ProfileBin>,
    pub total_volume: f64,
    /// Point of control: bin center with the highest volume.
    pub poc: f64,
    pub value_area_low: f64,
    pub value_area_high: f64,
    /// Fraction of volume inside the value area (>= the requested mass).
    pub value_area_pct: f64,
}

/// Build the profile from OHLCV bars. Returns `None` when there is no
/// volume or no price spread to distribute over.
pub fn volume_profile(bars: &[Bar], bin_count: usize, mass_fraction: f64) -> Option<VolumeProfile> {
    let bin_count = bin_count.clamp(2, 500);
    let mass_fraction = mass_fraction.clamp(0.5, 0.99);

    let mut low = f64::MAX;
    let mut high = f64::MIN;
    let mut total_volume = 0.0;
    for bar in bars {
        if bar.volume <= 0.0 {
            continue;
        }
        low = low.min(bar.low);
        high = high.max(bar.high);
        total_volume += bar.volume;
    }
    if total_volume <= 0.0 || low >= high {
        return None;
    }

    let width = (high - low) / bin_count as f64;
    let mut volumes = vec![0.0f64; bin_count];

    for bar in bars {
        if bar.volume <= 0.0 {
            continue;
        }
        let span = bar.high - bar.low;
        if span <= 0.0 {
            // Doji: the whole bar trades at one price level.
            let idx = (((bar.low - low) / width) as usize).min(bin_count - 1);
            volumes[idx] += bar.volume;
            continue;
        }
        // Allocate proportional to overlap of [low, high] with each bin.
        let first = (((bar.low - low) / width) as usize).min(bin_count - 1);
        let last = (((bar.high - low) / width) as usize).min(bin_count - 1);
        for idx in first..=last {
            let bin_lo = low + idx as f64 * width;
            let bin_hi = bin_lo + width;
            let overlap = (bar.high.min(bin_hi) - bar.low.max(bin_lo)).max(0.0);
            volumes[idx] += bar.volume * overlap / span;
        }
    }

    let mut bins = Vec::with_capacity(bin_count);
    let mut cum = 0.0;
    for (idx, &volume) in volumes.iter().enumerate() {
        let pct = volume / total_volume * 100.0;
        cum += pct;
        bins.push(ProfileBin {
            price: low + (idx as f64 + 0.5) * width,
            volume,
            pct,
            cum_pct: cum,
        });
    }

    // Point of control.
    let poc_idx = volumes
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0);

    // Expand the value area around the POC, always taking the heavier
    // neighbor first.
    let target = total_volume * mass_fraction;
    let mut lo_idx = poc_idx;
    let mut hi_idx = poc_idx;
    let mut captured = volumes[poc_idx];
    while captured < target {
        let below = if lo_idx > 0 { Some(volumes[lo_idx - 1]) } else { None };
        let above = if hi_idx + 1 < bin_count { Some(volumes[hi_idx + 1]) } else { None };
        match (below, above) {
            (None, None) => break,
            (Some(b), Some(a)) if b >= a => {
                lo_idx -= 1;
                captured += b;
            }
            (Some(_), Some(a)) => {
                hi_idx += 1;
                captured += a;
            }
            (Some(b), None) => {
                lo_idx -= 1;
                captured += b;
            }
            (None, Some(a)) => {
                hi_idx += 1;
                captured += a;
            }
        }
    }

    Some(VolumeProfile {
        poc: bins[poc_idx].price,
        value_area_low: low + lo_idx as f64 * width,
        value_area_high: low + (hi_idx as f64 + 1.0) * width,
        value_area_pct: captured / total_volume * 100.0,
        bins,
        total_volume,
    })
}
