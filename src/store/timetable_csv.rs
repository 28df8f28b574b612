//! CSV-backed timetable partitions, one file per day code.

use crate::calendar::DayCode;
use crate::model::Direction;
use crate::store::TimetableSource;
use crate::timetable::TimetableStop;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::fs::File;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct CsvRow {
    line_id: i64,
    realtime_train_id: String,
    station_id: i64,
    station_name: String,
    stop_no: u32,
    arrival_time: Option<NaiveTime>,
    departure_time: Option<NaiveTime>,
    express: u8,
    express_skip: u8,
    up_down: u8,
    first_station_name: String,
    last_station_name: String,
}

impl CsvRow {
    fn into_stop(self) -> Result<TimetableStop> {
        let up_down = Direction::from_code(i64::from(self.up_down))
            .ok_or_else(|| anyhow!("invalid direction code {}", self.up_down))?;
        Ok(TimetableStop {
            line_id: self.line_id,
            realtime_train_id: self.realtime_train_id,
            station_id: self.station_id,
            station_name: self.station_name,
            stop_no: self.stop_no,
            arrival_time: self.arrival_time,
            departure_time: self.departure_time,
            express: self.express != 0,
            express_skip: self.express_skip != 0,
            up_down,
            first_station_name: self.first_station_name,
            last_station_name: self.last_station_name,
        })
    }
}

/// Reads scheduled stops from `weekday.csv` / `holiday.csv` under a
/// configured directory. The partitions vary by day code only, so the
/// operational date selects nothing here.
pub struct CsvTimetableSource {
    dir: PathBuf,
}

impl CsvTimetableSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn partition_path(&self, day_code: DayCode) -> PathBuf {
        let name = match day_code {
            DayCode::Weekday => "weekday.csv",
            DayCode::Holiday => "holiday.csv",
        };
        self.dir.join(name)
    }
}

#[async_trait]
impl TimetableSource for CsvTimetableSource {
    async fn query(&self, _op_date: NaiveDate, day_code: DayCode) -> Result<Vec<TimetableStop>> {
        let path = self.partition_path(day_code);
        let file = File::open(&path)
            .with_context(|| format!("opening timetable partition {}", path.display()))?;
        let mut rdr = csv::Reader::from_reader(file);
        let mut stops = Vec::new();
        for result in rdr.deserialize() {
            let row: CsvRow = result?;
            stops.push(row.into_stop()?);
        }
        Ok(stops)
    }
}
