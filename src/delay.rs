//! Delay computation: joins corrected positions against the timetable to
//! produce current delays and projected arrivals at downstream stops.
//!
//! The whole engine is a pure function of (deduped positions, timetable
//! index); replaying the same inputs yields identical output.

use crate::calendar::ServiceWindow;
use crate::model::{
    ArrivalRow, DelayHistoryRow, PositionRecord, TrainStatus, stops_away_message,
};
use crate::timetable::TimetableIndex;
use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;

/// Current delay of one train at the stop it reports against.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainDelay {
    pub line_id: i64,
    pub train_id: String,
    pub station_id: i64,
    pub stop_no: u32,
    pub status: TrainStatus,
    pub delay_secs: i64,
    pub observed: NaiveDateTime,
}

/// A projected arrival at one downstream stop, delay carried forward
/// unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub station_id: i64,
    pub stops_away: u32,
    pub expected_arrival: NaiveDateTime,
}

/// One train's delay plus its downstream projections.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayResult {
    pub delay: TrainDelay,
    pub projections: Vec<Projection>,
}

/// The feed flags "approaching" roughly this long before the scheduled
/// arrival, so the raw difference under-reports the delay.
const APPROACHING_LEAD_SECS: i64 = 30;

pub struct DelayEngine<'a> {
    index: &'a TimetableIndex,
    window: ServiceWindow,
}

impl<'a> DelayEngine<'a> {
    pub fn new(index: &'a TimetableIndex, window: ServiceWindow) -> Self {
        Self { index, window }
    }

    /// Joins one position to its scheduled stop and computes the current
    /// delay in whole seconds. Returns `None` for join gaps (no timetable
    /// counterpart) and for stops with no scheduled time for the reported
    /// status.
    pub fn current_delay(&self, p: &PositionRecord) -> Option<TrainDelay> {
        let stop = self.index.stop(p.line_id, &p.train_id, p.station_id)?;
        let scheduled = match p.status {
            TrainStatus::Approaching | TrainStatus::Arrived => stop.arrival,
            TrainStatus::Departed => stop.departure,
            _ => None,
        }?;
        let observed = self
            .index
            .op_day()
            .observed_datetime(p.received_at, &self.window);

        let mut delay_secs = (observed - scheduled).num_seconds();
        if p.status == TrainStatus::Approaching {
            delay_secs += APPROACHING_LEAD_SECS;
        }

        Some(TrainDelay {
            line_id: p.line_id,
            train_id: p.train_id.clone(),
            station_id: p.station_id,
            stop_no: stop.stop_no,
            status: p.status,
            delay_secs,
            observed,
        })
    }

    /// Delay plus projections for every deduped position that joins.
    pub fn compute(&self, positions: &[PositionRecord]) -> Vec<DelayResult> {
        positions.iter().filter_map(|p| self.result_for(p)).collect()
    }

    fn result_for(&self, p: &PositionRecord) -> Option<DelayResult> {
        let delay = self.current_delay(p)?;
        let run = self.index.run(p.line_id, &p.train_id)?;
        let min_stop_no = self.min_stop_no(&delay);

        let projections = run
            .iter()
            .filter(|d| d.stop_no >= min_stop_no && !d.express_skip)
            .filter_map(|d| {
                let expected_arrival = d.arrival? + Duration::seconds(delay.delay_secs);
                Some(Projection {
                    station_id: d.station_id,
                    stops_away: d.stop_no - delay.stop_no,
                    expected_arrival,
                })
            })
            .collect();

        Some(DelayResult { delay, projections })
    }

    // A departed train is no longer an arrival candidate at its own stop.
    fn min_stop_no(&self, delay: &TrainDelay) -> u32 {
        match delay.status {
            TrainStatus::Departed => delay.stop_no + 1,
            _ => delay.stop_no,
        }
    }

    /// Full per-station shaping: projections grouped by downstream station,
    /// soonest arrival first.
    pub fn arrivals_by_station(&self, positions: &[PositionRecord]) -> HashMap<i64, Vec<ArrivalRow>> {
        let mut buckets: HashMap<i64, Vec<ArrivalRow>> = HashMap::new();

        for p in positions {
            let Some(delay) = self.current_delay(p) else {
                continue;
            };
            let Some(run) = self.index.run(p.line_id, &p.train_id) else {
                continue;
            };
            let min_stop_no = self.min_stop_no(&delay);

            for d in run {
                if d.stop_no < min_stop_no || d.express_skip {
                    continue;
                }
                let Some(scheduled_arrival) = d.arrival else {
                    continue;
                };
                let expected_arrival = scheduled_arrival + Duration::seconds(delay.delay_secs);
                let stops_away = d.stop_no - delay.stop_no;

                buckets.entry(d.station_id).or_default().push(ArrivalRow {
                    train_id: p.train_id.clone(),
                    first_station_name: d.first_station_name.clone(),
                    last_station_name: d.last_station_name.clone(),
                    searched_station_name: d.station_name.clone(),
                    current_station_name: p.station_name.clone(),
                    received_at: p.received_at,
                    status: p.status.label().to_string(),
                    express: p.express,
                    express_skip: d.express_skip,
                    up_down: d.up_down,
                    current_delay_secs: Some(delay.delay_secs),
                    seconds_to_arrival: Some(
                        (expected_arrival - p.requested_at).num_seconds().max(0),
                    ),
                    expected_arrival: Some(expected_arrival),
                    stops_away: Some(stops_away),
                    message: stops_away_message(stops_away, p.status.label()),
                    scheduled_arrival: Some(scheduled_arrival),
                    scheduled_departure: d.departure,
                });
            }
        }

        for rows in buckets.values_mut() {
            rows.sort_by_key(|r| (r.expected_arrival, r.stops_away));
        }
        buckets
    }

    /// Bulk end-of-day pass: one history row per stored position that joins.
    pub fn history_rows(&self, positions: &[PositionRecord]) -> Vec<DelayHistoryRow> {
        let op_day = self.index.op_day();
        positions
            .iter()
            .filter_map(|p| {
                let delay = self.current_delay(p)?;
                Some(DelayHistoryRow {
                    line_id: p.line_id,
                    station_id: p.station_id,
                    train_id: p.train_id.clone(),
                    received_at: p.received_at,
                    train_status: p.status.code(),
                    requested_at: p.requested_at,
                    day_code: op_day.day_code.code(),
                    stop_no: delay.stop_no,
                    delay_secs: delay.delay_secs,
                    op_date: op_day.date,
                })
            })
            .collect()
    }
}
