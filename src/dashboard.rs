//! Text rendering of the crossroad board.
//!
//! Read-only: everything here takes the coordinator's state by shared
//! reference and produces strings.

use std::fmt::Write;

use crate::aggregate::Aggregate;
use crate::coordinator::Coordinator;
use crate::lane::{Lane, LaneTable};
use crate::protocol::KNOWN_VEHICLE_CLASSES;
use crate::session::ChannelPhase;
use crate::state::LaneState;

/// Number of vehicle totals shown next to the active-lane count.
pub const HEADLINE_CLASSES: usize = 3;

/// Per-lane status light.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaneIndicator {
    Idle,
    Loading,
    Live,
}

impl LaneIndicator {
    /// Loading wins over live: a re-upload shows as loading until it settles.
    pub fn of(state: &LaneState) -> Self {
        if state.is_loading() {
            LaneIndicator::Loading
        } else if state.is_active() {
            LaneIndicator::Live
        } else {
            LaneIndicator::Idle
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            LaneIndicator::Idle => "○",
            LaneIndicator::Loading => "◌",
            LaneIndicator::Live => "●",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LaneIndicator::Idle => "idle",
            LaneIndicator::Loading => "processing",
            LaneIndicator::Live => "live",
        }
    }
}

fn phase_label(phase: ChannelPhase) -> &'static str {
    match phase {
        ChannelPhase::Closed => "closed",
        ChannelPhase::Connecting => "connecting",
        ChannelPhase::Streaming => "streaming",
    }
}

/// Sort key placing the service's known classes first, in its order.
pub fn class_rank(class: &str) -> usize {
    KNOWN_VEHICLE_CLASSES
        .iter()
        .position(|known| known.eq_ignore_ascii_case(class))
        .unwrap_or(KNOWN_VEHICLE_CLASSES.len())
}

fn ordered<'a, V: Copy + 'a>(entries: impl Iterator<Item = (&'a String, &'a V)>) -> Vec<(&'a str, V)> {
    let mut entries: Vec<(&str, V)> = entries.map(|(k, v)| (k.as_str(), *v)).collect();
    entries.sort_by(|a, b| class_rank(a.0).cmp(&class_rank(b.0)).then(a.0.cmp(b.0)));
    entries
}

/// The first `limit` crossroad totals, known classes first.
pub fn headline_totals(aggregate: &Aggregate, limit: usize) -> Vec<(&str, u64)> {
    let mut totals = ordered(aggregate.totals.iter());
    totals.truncate(limit);
    totals
}

/// One-line summary, e.g. `Active Lanes 2/4 | cars 5 | persons 0 | trucks 1`.
pub fn summary(aggregate: &Aggregate) -> String {
    let mut line = format!("Active Lanes {}/{}", aggregate.active_lanes, Lane::COUNT);
    for (class, count) in headline_totals(aggregate, HEADLINE_CLASSES) {
        let _ = write!(line, " | {}s {}", class, count);
    }
    line
}

fn format_bytes(len: usize) -> String {
    if len >= 1024 * 1024 {
        format!("{:.1} MiB", len as f64 / (1024.0 * 1024.0))
    } else if len >= 1024 {
        format!("{:.1} KiB", len as f64 / 1024.0)
    } else {
        format!("{} B", len)
    }
}

/// Full board: summary line followed by one block per lane.
pub fn render_board(
    lanes: &LaneTable<LaneState>,
    phases: &LaneTable<ChannelPhase>,
    aggregate: &Aggregate,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Smart Crossroad Monitor");
    let _ = writeln!(out, "{}", summary(aggregate));
    for (lane, state) in lanes.iter() {
        let indicator = LaneIndicator::of(state);
        let _ = write!(
            out,
            "{} {:<10} {} {:<10} {:<10}",
            lane.arrow(),
            lane.label(),
            indicator.symbol(),
            indicator.label(),
            phase_label(phases[lane]),
        );
        if state.is_active() {
            match state.frame.decode() {
                Some(jpeg) => {
                    let _ = write!(out, " frame {}", format_bytes(jpeg.len()));
                }
                None => {
                    let _ = write!(out, " frame ({} chars, not base64)", state.frame.len());
                }
            }
        }
        out.push('\n');
        if !state.counts.is_empty() {
            let counts: Vec<String> = ordered(state.counts.iter())
                .into_iter()
                .map(|(class, count)| format!("{} {}", class, count))
                .collect();
            let _ = writeln!(out, "    {}", counts.join("  "));
        }
    }
    out
}

pub fn render(coordinator: &Coordinator) -> String {
    render_board(
        coordinator.lanes(),
        &coordinator.phases(),
        coordinator.aggregate(),
    )
}
