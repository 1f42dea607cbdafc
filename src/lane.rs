//! Lane keys and the fixed per-lane table.
//!
//! A crossroad has exactly four approach lanes. Everything that is tracked
//! per lane lives in a `LaneTable`, a four-slot array indexed by `Lane`, so
//! "one entry per lane" holds by construction rather than by key discipline.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the four traffic directions tracked by the monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    North,
    South,
    East,
    West,
}

impl Lane {
    /// All lanes in table order.
    pub const ALL: [Lane; 4] = [Lane::North, Lane::South, Lane::East, Lane::West];

    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        match self {
            Lane::North => 0,
            Lane::South => 1,
            Lane::East => 2,
            Lane::West => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Lane::North => "north",
            Lane::South => "south",
            Lane::East => "east",
            Lane::West => "west",
        }
    }

    /// Human-readable label used by the dashboard.
    pub fn label(self) -> &'static str {
        match self {
            Lane::North => "North Lane",
            Lane::South => "South Lane",
            Lane::East => "East Lane",
            Lane::West => "West Lane",
        }
    }

    /// Direction-of-travel glyph.
    pub fn arrow(self) -> &'static str {
        match self {
            Lane::North => "↑",
            Lane::South => "↓",
            Lane::East => "→",
            Lane::West => "←",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no lane.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown lane '{0}'; expected north, south, east or west")]
pub struct UnknownLane(pub String);

impl FromStr for Lane {
    type Err = UnknownLane;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "north" | "n" => Ok(Lane::North),
            "south" | "s" => Ok(Lane::South),
            "east" | "e" => Ok(Lane::East),
            "west" | "w" => Ok(Lane::West),
            _ => Err(UnknownLane(s.to_string())),
        }
    }
}

/// Fixed-size table holding exactly one `T` per lane.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaneTable<T> {
    slots: [T; Lane::COUNT],
}

impl<T> LaneTable<T> {
    /// Builds a table by calling `init` once per lane, in table order.
    pub fn from_fn(mut init: impl FnMut(Lane) -> T) -> Self {
        Self {
            slots: Lane::ALL.map(&mut init),
        }
    }

    pub fn get(&self, lane: Lane) -> &T {
        &self.slots[lane.index()]
    }

    pub fn get_mut(&mut self, lane: Lane) -> &mut T {
        &mut self.slots[lane.index()]
    }

    /// Iterates `(lane, value)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (Lane, &T)> {
        Lane::ALL.into_iter().zip(self.slots.iter())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }
}

impl<T> Index<Lane> for LaneTable<T> {
    type Output = T;

    fn index(&self, lane: Lane) -> &T {
        self.get(lane)
    }
}

impl<T> IndexMut<Lane> for LaneTable<T> {
    fn index_mut(&mut self, lane: Lane) -> &mut T {
        self.get_mut(lane)
    }
}
