//! Upstream telemetry corrections and per-train dedup.
//!
//! The correction tables are isolated here so feed quirks can be updated
//! without touching the join logic.

use crate::model::PositionRecord;

/// Line whose position feed reports some train ids with a wrong leading digit.
const LINE_2: i64 = 1002;

/// Branch line whose feed omits station codes for two stations.
const LINE_GYEONGCHUN: i64 = 1067;

/// Leading digits the line-2 feed is known to emit in place of `2`.
const WRONG_LEADING_DIGITS: [char; 6] = ['3', '4', '6', '7', '8', '9'];

/// Restores the expected leading `2` on line-2 train ids reported with a
/// known-wrong leading digit. Ids on other lines pass through unchanged.
pub fn correct_train_id(line_id: i64, train_id: &str) -> String {
    if line_id == LINE_2 {
        let mut chars = train_id.chars();
        if let Some(first) = chars.next() {
            if WRONG_LEADING_DIGITS.contains(&first) {
                return format!("2{}", chars.as_str());
            }
        }
    }
    train_id.to_string()
}

/// One-off station codes the branch-line feed leaves blank, keyed by the
/// station name it does send.
pub fn fix_station_id(line_id: i64, station_name: &str) -> Option<i64> {
    if line_id != LINE_GYEONGCHUN {
        return None;
    }
    match station_name {
        "광운대" => Some(1067080119),
        "용산" => Some(1063075110),
        _ => None,
    }
}

/// Normalizes one tick's raw positions: corrects train ids, drops statuses
/// that describe the previous stop, then keeps only the latest record per
/// (line, train). The result has at most one record per (line, train).
pub fn refine_positions(mut positions: Vec<PositionRecord>) -> Vec<PositionRecord> {
    for p in &mut positions {
        p.train_id = correct_train_id(p.line_id, &p.train_id);
    }
    positions.retain(|p| p.status.is_current());
    positions.sort_by(|a, b| {
        (a.line_id, &a.train_id, a.received_at).cmp(&(b.line_id, &b.train_id, b.received_at))
    });

    let mut latest: Vec<PositionRecord> = Vec::with_capacity(positions.len());
    for p in positions {
        if let Some(prev) = latest.last_mut() {
            if prev.line_id == p.line_id && prev.train_id == p.train_id {
                *prev = p;
                continue;
            }
        }
        latest.push(p);
    }
    latest
}
