//! Data types shared by the collector and transformer stages.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Where a train currently is, as reported by the upstream feed.
///
/// | Code | Status |
/// |------|------------------------------|
/// | 0    | approaching                  |
/// | 1    | arrived                      |
/// | 2    | departed                     |
/// | 3    | departed previous station    |
/// | 4    | approaching previous station |
/// | 5    | arrived at previous station  |
/// | 99   | in service                   |
///
/// Only `Approaching`, `Arrived` and `Departed` describe the station the
/// record is keyed on; the rest are stale echoes of the previous stop and
/// are dropped before the timetable join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrainStatus {
    Approaching,
    Arrived,
    Departed,
    DepartedPrevious,
    ApproachingPrevious,
    ArrivedPrevious,
    InService,
}

impl TrainStatus {
    pub fn from_code(code: i64) -> Option<TrainStatus> {
        match code {
            0 => Some(TrainStatus::Approaching),
            1 => Some(TrainStatus::Arrived),
            2 => Some(TrainStatus::Departed),
            3 => Some(TrainStatus::DepartedPrevious),
            4 => Some(TrainStatus::ApproachingPrevious),
            5 => Some(TrainStatus::ArrivedPrevious),
            99 => Some(TrainStatus::InService),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            TrainStatus::Approaching => 0,
            TrainStatus::Arrived => 1,
            TrainStatus::Departed => 2,
            TrainStatus::DepartedPrevious => 3,
            TrainStatus::ApproachingPrevious => 4,
            TrainStatus::ArrivedPrevious => 5,
            TrainStatus::InService => 99,
        }
    }

    /// Whether the record describes the station it is keyed on.
    pub fn is_current(&self) -> bool {
        matches!(
            self,
            TrainStatus::Approaching | TrainStatus::Arrived | TrainStatus::Departed
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrainStatus::Approaching => "approaching",
            TrainStatus::Arrived => "arrived",
            TrainStatus::Departed => "departed",
            TrainStatus::DepartedPrevious => "departed previous station",
            TrainStatus::ApproachingPrevious => "approaching previous station",
            TrainStatus::ArrivedPrevious => "arrived at previous station",
            TrainStatus::InService => "in service",
        }
    }
}

impl std::fmt::Display for TrainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Travel direction along a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn from_code(code: i64) -> Option<Direction> {
        match code {
            0 => Some(Direction::Up),
            1 => Some(Direction::Down),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
        }
    }
}

/// One train's position at one station, parsed from the per-line position
/// endpoint. After correction and dedup there is at most one per
/// (line, train) per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub line_id: i64,
    pub line_name: String,
    pub station_id: i64,
    pub station_name: String,
    pub train_id: String,
    pub received_at: NaiveDateTime,
    pub up_down: Direction,
    pub last_station_id: i64,
    pub last_station_name: String,
    pub status: TrainStatus,
    pub express: bool,
    pub last_train: bool,
    pub requested_at: NaiveDateTime,
}

/// One raw arrival estimate from the whole-network arrival endpoint.
/// Only lines on the arrival allow-list ever reach the view from these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalRecord {
    pub line_id: i64,
    pub station_id: i64,
    pub station_name: String,
    pub train_id: String,
    pub last_station_name: String,
    pub current_station_name: String,
    pub received_at: NaiveDateTime,
    pub express: bool,
    pub status: TrainStatus,
    pub up_down: Direction,
    pub seconds_to_arrival: Option<i64>,
    pub message: String,
}

/// One collector tick's combined telemetry, published over the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub positions: Vec<PositionRecord>,
    pub arrivals: Vec<ArrivalRecord>,
    pub requested_at: NaiveDateTime,
}

/// One arrival entry in the served per-station view, produced either by the
/// delay engine (timetable-joined lines) or the arrival normalizer
/// (allow-listed lines, no timetable join).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalRow {
    pub train_id: String,
    pub first_station_name: String,
    pub last_station_name: String,
    pub searched_station_name: String,
    pub current_station_name: String,
    pub received_at: NaiveDateTime,
    pub status: String,
    pub express: bool,
    pub express_skip: bool,
    pub up_down: Direction,
    pub current_delay_secs: Option<i64>,
    pub seconds_to_arrival: Option<i64>,
    pub expected_arrival: Option<NaiveDateTime>,
    pub stops_away: Option<u32>,
    pub message: String,
    pub scheduled_arrival: Option<NaiveDateTime>,
    pub scheduled_departure: Option<NaiveDateTime>,
}

/// One durable delay observation, written in bulk at end of day.
/// Keyed by (line, station, train, status, stop_no, op_date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayHistoryRow {
    pub line_id: i64,
    pub station_id: i64,
    pub train_id: String,
    pub received_at: NaiveDateTime,
    pub train_status: i64,
    pub requested_at: NaiveDateTime,
    pub day_code: u8,
    pub stop_no: u32,
    pub delay_secs: i64,
    pub op_date: NaiveDate,
}

/// Served positions for one line. Empty `place` when the line has no
/// current telemetry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinePositions {
    pub line_id: i64,
    pub place: Vec<PositionRecord>,
}

/// Served arrivals for one station, split by platform side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationArrivals {
    pub left: Vec<ArrivalRow>,
    pub right: Vec<ArrivalRow>,
}

/// Builds the served arrival message: "this station, arrived" when the train
/// is at the searched station, "N stations out, approaching" otherwise.
pub fn stops_away_message(stops_away: u32, status: &str) -> String {
    if stops_away == 0 {
        format!("this station, {}", status)
    } else {
        format!("{} stations out, {}", stops_away, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip() {
        for code in [0, 1, 2, 3, 4, 5, 99] {
            let status = TrainStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(TrainStatus::from_code(6), None);
        assert_eq!(TrainStatus::from_code(-1), None);
    }

    #[test]
    fn test_only_current_statuses_survive_filtering() {
        assert!(TrainStatus::Approaching.is_current());
        assert!(TrainStatus::Arrived.is_current());
        assert!(TrainStatus::Departed.is_current());
        assert!(!TrainStatus::DepartedPrevious.is_current());
        assert!(!TrainStatus::ApproachingPrevious.is_current());
        assert!(!TrainStatus::ArrivedPrevious.is_current());
        assert!(!TrainStatus::InService.is_current());
    }

    #[test]
    fn test_stops_away_message_shapes() {
        assert_eq!(stops_away_message(0, "arrived"), "this station, arrived");
        assert_eq!(
            stops_away_message(1, "approaching"),
            "1 stations out, approaching"
        );
        assert_eq!(
            stops_away_message(3, "departed"),
            "3 stations out, departed"
        );
    }
}
