//! The served view: per-line positions and per-station arrivals, replaced
//! wholesale each tick.
//!
//! Readers clone an `Arc` to the current view, so a tick being published
//! can never expose a partially updated map.

use crate::model::{ArrivalRow, Direction, LinePositions, PositionRecord, StationArrivals};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// One tick's derived, read-only output.
#[derive(Debug, Default, Clone)]
pub struct ComputedView {
    pub positions: HashMap<i64, Vec<PositionRecord>>,
    pub arrivals: HashMap<i64, Vec<ArrivalRow>>,
    pub updated_at: NaiveDateTime,
}

impl ComputedView {
    pub fn new(
        positions: Vec<PositionRecord>,
        arrivals: HashMap<i64, Vec<ArrivalRow>>,
        updated_at: NaiveDateTime,
    ) -> Self {
        let mut by_line: HashMap<i64, Vec<PositionRecord>> = HashMap::new();
        for p in positions {
            by_line.entry(p.line_id).or_default().push(p);
        }
        Self {
            positions: by_line,
            arrivals,
            updated_at,
        }
    }
}

/// Shared handle between the transform loop (writer) and the serving layer
/// (readers). Publishing is one pointer swap.
#[derive(Clone, Default)]
pub struct ViewHandle {
    current: Arc<RwLock<Arc<ComputedView>>>,
}

impl ViewHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, view: ComputedView) {
        let next = Arc::new(view);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    pub fn current(&self) -> Arc<ComputedView> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// All current positions on one line; empty when the line has no
    /// telemetry this tick.
    pub fn position_by_line(&self, line_id: i64) -> LinePositions {
        let view = self.current();
        LinePositions {
            line_id,
            place: view.positions.get(&line_id).cloned().unwrap_or_default(),
        }
    }

    /// Arrivals at one station, bucketed onto the station's platform sides.
    /// `up_label`/`down_label` are the station's orientation labels
    /// (`left` or `right`, optionally suffixed); unrecognized labels land
    /// in `left`.
    pub fn arrival_by_station(
        &self,
        station_id: i64,
        up_label: &str,
        down_label: &str,
    ) -> StationArrivals {
        let view = self.current();
        let mut out = StationArrivals::default();
        let Some(rows) = view.arrivals.get(&station_id) else {
            return out;
        };
        for row in rows {
            let label = match row.up_down {
                Direction::Up => up_label,
                Direction::Down => down_label,
            };
            if side(label) == "right" {
                out.right.push(row.clone());
            } else {
                out.left.push(row.clone());
            }
        }
        out
    }
}

fn side(label: &str) -> &str {
    label.split('_').next().unwrap_or(label)
}
