//! Crossroad-wide view derived from the four lane states.
//!
//! Nothing here is ever updated in place: `StateAggregator::recompute`
//! rebuilds the whole `Aggregate` from the lane table after each change.
//! With four lanes and a handful of classes that is cheaper than keeping
//! incremental bookkeeping correct.

use std::collections::BTreeMap;

use crate::lane::LaneTable;
use crate::state::LaneState;

/// Sums every lane's counts per vehicle class. Missing classes count as zero.
pub fn totals<'a>(states: impl IntoIterator<Item = &'a LaneState>) -> BTreeMap<String, u64> {
    let mut totals = BTreeMap::new();
    for state in states {
        for (class, count) in &state.counts {
            *totals.entry(class.clone()).or_insert(0u64) += u64::from(*count);
        }
    }
    totals
}

/// Number of lanes currently showing a frame.
pub fn active_lane_count<'a>(states: impl IntoIterator<Item = &'a LaneState>) -> usize {
    states.into_iter().filter(|state| state.is_active()).count()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub totals: BTreeMap<String, u64>,
    pub active_lanes: usize,
}

impl Aggregate {
    pub fn from_lanes(lanes: &LaneTable<LaneState>) -> Self {
        Self {
            totals: totals(lanes.values()),
            active_lanes: active_lane_count(lanes.values()),
        }
    }

    pub fn total(&self, class: &str) -> u64 {
        self.totals.get(class).copied().unwrap_or(0)
    }
}

/// Owner of the current aggregate snapshot.
#[derive(Debug, Default)]
pub struct StateAggregator {
    current: Aggregate,
}

impl StateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recompute(&mut self, lanes: &LaneTable<LaneState>) -> &Aggregate {
        self.current = Aggregate::from_lanes(lanes);
        &self.current
    }

    pub fn current(&self) -> &Aggregate {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lane::Lane;
    use crate::state::{Counts, Frame};

    fn lane(counts: &[(&str, u32)], frame: &str) -> LaneState {
        LaneState {
            counts: counts
                .iter()
                .map(|(class, n)| (class.to_string(), *n))
                .collect::<Counts>(),
            frame: Frame::new(frame),
            ..LaneState::default()
        }
    }

    #[test]
    fn empty_lanes_have_no_totals() {
        let lanes = LaneTable::<LaneState>::default();
        assert!(totals(lanes.values()).is_empty());
        assert_eq!(active_lane_count(lanes.values()), 0);
    }

    #[test]
    fn totals_ignore_lane_order() {
        let a = lane(&[("car", 2), ("bus", 1)], "a");
        let b = lane(&[("car", 5)], "");
        let c = lane(&[("truck", 4), ("bus", 3)], "c");
        let d = lane(&[], "");

        let forward = totals([&a, &b, &c, &d]);
        let reversed = totals([&d, &c, &b, &a]);
        let shuffled = totals([&c, &a, &d, &b]);

        assert_eq!(forward, reversed);
        assert_eq!(forward, shuffled);
        assert_eq!(forward.get("car"), Some(&7));
        assert_eq!(forward.get("bus"), Some(&4));
        assert_eq!(forward.get("truck"), Some(&4));
    }

    #[test]
    fn active_lanes_count_only_frames() {
        let states = [lane(&[("car", 1)], ""), lane(&[], "jpeg"), lane(&[], "")];
        assert_eq!(active_lane_count(&states), 1);
    }

    #[test]
    fn aggregator_recomputes_from_table() {
        let mut lanes = LaneTable::<LaneState>::default();
        let mut aggregator = StateAggregator::new();
        lanes[Lane::North] = lane(&[("car", 5), ("truck", 1)], "B");

        let snapshot = aggregator.recompute(&lanes).clone();
        assert_eq!(snapshot.total("car"), 5);
        assert_eq!(snapshot.total("truck"), 1);
        assert_eq!(snapshot.total("bus"), 0);
        assert_eq!(snapshot.active_lanes, 1);

        lanes[Lane::North] = LaneState::default();
        aggregator.recompute(&lanes);
        assert_eq!(aggregator.current(), &Aggregate::default());
    }
}
