//! Time alignment: put every leg of an expression onto one grid.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

use crate::models::Series;

/// Grid construction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignMode {
    /// Union of all leg timestamps; missing values forward-filled up to the
    /// cap.
    Union,
    /// Only timestamps where every leg has its own bar.
    Intersection,
}

impl Default for AlignMode {
    fn default() -> Self {
        AlignMode::Union
    }
}

/// Legs resolved onto a shared timestamp index.
#[derive(Debug, Clone)]
pub struct AlignedFrame {
    pub index: Vec<DateTime<Utc>>,
    /// One column per leg, parallel to `index`.
    pub columns: Vec<Vec<Option<f64>>>,
}

impl AlignedFrame {
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Align legs onto a common grid.
///
/// Under `Union`, a leg value at a grid timestamp is its own bar close if
/// one exists, otherwise the last observation carried forward over at most
/// `ffill_cap` consecutive missing bars; past the cap the value is
/// undefined at that timestamp.
pub fn align(legs: &[Series], mode: AlignMode, ffill_cap: usize) -> AlignedFrame {
    let index: Vec<DateTime<Utc>> = match mode {
        AlignMode::Union => {
            let mut set = BTreeSet::new();
            for leg in legs {
                for point in &leg.points {
                    if point.v.is_some() {
                        set.insert(point.t);
                    }
                }
            }
            set.into_iter().collect()
        }
        AlignMode::Intersection => {
            let mut sets = legs.iter().map(|leg| {
                leg.points
                    .iter()
                    .filter(|p| p.v.is_some())
                    .map(|p| p.t)
                    .collect::<BTreeSet<_>>()
            });
            match sets.next() {
                Some(first) => sets
                    .fold(first, |acc, next| acc.intersection(&next).copied().collect())
                    .into_iter()
                    .collect(),
                None => Vec::new(),
            }
        }
    };

    let columns = legs
        .iter()
        .map(|leg| resolve_column(leg, &index, mode, ffill_cap))
        .collect();

    AlignedFrame { index, columns }
}

fn resolve_column(
    leg: &Series,
    index: &[DateTime<Utc>],
    mode: AlignMode,
    ffill_cap: usize,
) -> Vec<Option<f64>> {
    let own: HashMap<DateTime<Utc>, f64> = leg
        .points
        .iter()
        .filter_map(|p| p.v.map(|v| (p.t, v)))
        .collect();

    let mut column = Vec::with_capacity(index.len());
    let mut carried: Option<f64> = None;
    let mut gap_run = 0usize;

    for t in index {
        match own.get(t) {
            Some(&value) => {
                carried = Some(value);
                gap_run = 0;
                column.push(Some(value));
            }
            None => {
                gap_run += 1;
                let fill = match mode {
                    AlignMode::Union if gap_run <= ffill_cap => carried,
                    _ => None,
                };
                column.push(fill);
            }
        }
    }
    column
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Point, Unit};
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, day, 0, 0, 0).unwrap()
    }

    fn leg(label: &str, days: &[(u32, f64)]) -> Series {
        Series::with_points(
            label,
            Unit::Price,
            days.iter().map(|&(d, v)| Point { t: ts(d), v: Some(v) }).collect(),
        )
    }

    #[test]
    fn union_merges_timestamps_and_forward_fills() {
        let a = leg("a", &[(1, 10.0), (2, 11.0), (4, 13.0)]);
        let b = leg("b", &[(1, 100.0), (3, 102.0), (4, 103.0)]);

        let frame = align(&[a, b], AlignMode::Union, 5);
        assert_eq!(frame.index, vec![ts(1), ts(2), ts(3), ts(4)]);
        // a has no bar on day 3: carried forward from day 2.
        assert_eq!(frame.columns[0], vec![Some(10.0), Some(11.0), Some(11.0), Some(13.0)]);
        // b has no bar on day 2: carried forward from day 1.
        assert_eq!(frame.columns[1], vec![Some(100.0), Some(100.0), Some(102.0), Some(103.0)]);
    }

    #[test]
    fn ffill_cap_limits_carry() {
        let a = leg("a", &[(1, 10.0)]);
        let b = leg("b", &[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0), (5, 5.0)]);

        let frame = align(&[a, b], AlignMode::Union, 2);
        // a carries over days 2 and 3 only; days 4 and 5 exceed the cap.
        assert_eq!(
            frame.columns[0],
            vec![Some(10.0), Some(10.0), Some(10.0), None, None]
        );
    }

    #[test]
    fn no_fill_before_first_observation() {
        let a = leg("a", &[(3, 30.0)]);
        let b = leg("b", &[(1, 1.0), (2, 2.0), (3, 3.0)]);

        let frame = align(&[a, b], AlignMode::Union, 5);
        assert_eq!(frame.columns[0], vec![None, None, Some(30.0)]);
    }

    #[test]
    fn intersection_keeps_shared_timestamps_only() {
        let a = leg("a", &[(1, 10.0), (2, 11.0), (4, 13.0)]);
        let b = leg("b", &[(2, 100.0), (3, 102.0), (4, 103.0)]);

        let frame = align(&[a, b], AlignMode::Intersection, 5);
        assert_eq!(frame.index, vec![ts(2), ts(4)]);
        assert_eq!(frame.columns[0], vec![Some(11.0), Some(13.0)]);
        assert_eq!(frame.columns[1], vec![Some(100.0), Some(103.0)]);
    }

    #[test]
    fn empty_legs_align_to_empty_frame() {
        let frame = align(&[], AlignMode::Union, 5);
        assert!(frame.is_empty());
    }
}
