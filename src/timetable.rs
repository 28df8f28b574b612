//! In-memory index of one operational day's scheduled stops.

use crate::calendar::{OperationalDay, ServiceWindow};
use crate::model::Direction;
use chrono::{NaiveDateTime, NaiveTime};
use std::collections::HashMap;

/// One scheduled stop as returned by the timetable source. Unique per
/// (line, realtime train id, station) within a day-code partition;
/// `stop_no` is strictly increasing along a train's run.
#[derive(Debug, Clone, PartialEq)]
pub struct TimetableStop {
    pub line_id: i64,
    pub realtime_train_id: String,
    pub station_id: i64,
    pub station_name: String,
    pub stop_no: u32,
    pub arrival_time: Option<NaiveTime>,
    pub departure_time: Option<NaiveTime>,
    pub express: bool,
    pub express_skip: bool,
    pub up_down: Direction,
    pub first_station_name: String,
    pub last_station_name: String,
}

/// A stop with its scheduled times materialized onto the operational day,
/// so early-morning times sort after late-evening ones.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledStop {
    pub line_id: i64,
    pub train_id: String,
    pub station_id: i64,
    pub station_name: String,
    pub stop_no: u32,
    pub arrival: Option<NaiveDateTime>,
    pub departure: Option<NaiveDateTime>,
    pub express: bool,
    pub express_skip: bool,
    pub up_down: Direction,
    pub first_station_name: String,
    pub last_station_name: String,
}

/// One operational day's timetable, indexed by (line, train, station) and by
/// (line, train). Built on the day-boundary transition and immutable until
/// the next one.
pub struct TimetableIndex {
    op_day: OperationalDay,
    runs: HashMap<(i64, String), Vec<ScheduledStop>>,
    by_station: HashMap<(i64, String, i64), usize>,
}

impl TimetableIndex {
    pub fn build(
        rows: Vec<TimetableStop>,
        op_day: OperationalDay,
        window: &ServiceWindow,
    ) -> Self {
        let mut runs: HashMap<(i64, String), Vec<ScheduledStop>> = HashMap::new();
        for row in rows {
            let stop = ScheduledStop {
                line_id: row.line_id,
                train_id: row.realtime_train_id.clone(),
                station_id: row.station_id,
                station_name: row.station_name,
                stop_no: row.stop_no,
                arrival: row
                    .arrival_time
                    .map(|t| window.service_datetime(op_day.date, t)),
                departure: row
                    .departure_time
                    .map(|t| window.service_datetime(op_day.date, t)),
                express: row.express,
                express_skip: row.express_skip,
                up_down: row.up_down,
                first_station_name: row.first_station_name,
                last_station_name: row.last_station_name,
            };
            runs.entry((row.line_id, row.realtime_train_id))
                .or_default()
                .push(stop);
        }

        for stops in runs.values_mut() {
            stops.sort_by_key(|s| s.stop_no);
        }

        let mut by_station = HashMap::new();
        for ((line_id, train_id), stops) in &runs {
            for (i, stop) in stops.iter().enumerate() {
                by_station.insert((*line_id, train_id.clone(), stop.station_id), i);
            }
        }

        Self {
            op_day,
            runs,
            by_station,
        }
    }

    pub fn op_day(&self) -> OperationalDay {
        self.op_day
    }

    /// The scheduled stop of one train at one station, if the train calls
    /// there.
    pub fn stop(&self, line_id: i64, train_id: &str, station_id: i64) -> Option<&ScheduledStop> {
        let i = *self
            .by_station
            .get(&(line_id, train_id.to_string(), station_id))?;
        self.runs.get(&(line_id, train_id.to_string()))?.get(i)
    }

    /// A train's full run, sorted by stop sequence.
    pub fn run(&self, line_id: i64, train_id: &str) -> Option<&[ScheduledStop]> {
        self.runs
            .get(&(line_id, train_id.to_string()))
            .map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.by_station.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_station.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{DayCode, HolidayCalendar};
    use chrono::NaiveDate;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn stop_row(train_id: &str, station_id: i64, stop_no: u32, arrival: NaiveTime) -> TimetableStop {
        TimetableStop {
            line_id: 1001,
            realtime_train_id: train_id.to_string(),
            station_id,
            station_name: format!("station {}", station_id),
            stop_no,
            arrival_time: Some(arrival),
            departure_time: Some(arrival + chrono::Duration::seconds(30)),
            express: false,
            express_skip: false,
            up_down: Direction::Up,
            first_station_name: "first".to_string(),
            last_station_name: "last".to_string(),
        }
    }

    fn op_day() -> OperationalDay {
        OperationalDay::at(
            NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            &ServiceWindow::default(),
            &HolidayCalendar::default(),
        )
    }

    #[test]
    fn test_lookup_by_station_and_run_order() {
        let rows = vec![
            stop_row("0042", 30, 3, t(10, 10)),
            stop_row("0042", 10, 1, t(10, 0)),
            stop_row("0042", 20, 2, t(10, 5)),
            stop_row("0077", 10, 1, t(11, 0)),
        ];
        let index = TimetableIndex::build(rows, op_day(), &ServiceWindow::default());

        assert_eq!(index.len(), 4);
        let stop = index.stop(1001, "0042", 20).unwrap();
        assert_eq!(stop.stop_no, 2);

        let run = index.run(1001, "0042").unwrap();
        let sequence: Vec<u32> = run.iter().map(|s| s.stop_no).collect();
        assert_eq!(sequence, vec![1, 2, 3]);

        assert!(index.stop(1001, "0042", 99).is_none());
        assert!(index.run(1001, "9999").is_none());
        assert!(index.stop(1002, "0042", 10).is_none());
    }

    #[test]
    fn test_early_morning_times_land_on_next_date() {
        let rows = vec![
            stop_row("0042", 10, 1, t(23, 50)),
            stop_row("0042", 20, 2, t(0, 10)),
        ];
        let index = TimetableIndex::build(rows, op_day(), &ServiceWindow::default());
        let run = index.run(1001, "0042").unwrap();

        let late = run[0].arrival.unwrap();
        let after_midnight = run[1].arrival.unwrap();
        assert_eq!(late.date(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(
            after_midnight.date(),
            NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()
        );
        assert!(after_midnight > late);
    }

    #[test]
    fn test_op_day_is_retained() {
        let index = TimetableIndex::build(Vec::new(), op_day(), &ServiceWindow::default());
        assert!(index.is_empty());
        assert_eq!(index.op_day().day_code, DayCode::Weekday);
    }
}
