//! External collaborators: the durable raw-position store, the delay
//! history store, and the timetable source.

mod export;
mod sqlite;
mod timetable_csv;

pub use export::DelayExporter;
pub use sqlite::SqliteStore;
pub use timetable_csv::CsvTimetableSource;

use crate::calendar::DayCode;
use crate::model::{DelayHistoryRow, PositionRecord};
use crate::timetable::TimetableStop;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Durable store for one operational day's raw positions, scanned and
/// cleared at end of day.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Inserts records, refreshing the observation timestamps of rows that
    /// already exist under the same (line, station, train, status) key.
    async fn upsert(&self, records: &[PositionRecord], op_date: NaiveDate) -> Result<()>;

    async fn find(&self, op_date: NaiveDate) -> Result<Vec<PositionRecord>>;

    /// Removes the day's rows along with anything older, returning how many
    /// were deleted. Rows from a day whose aggregation failed would otherwise
    /// never fall inside a later date-scoped scan.
    async fn remove(&self, op_date: NaiveDate) -> Result<u64>;
}

/// Append-only delay history, written in bulk at end of day.
#[async_trait]
pub trait DelayStore: Send + Sync {
    async fn insert_many(&self, rows: &[DelayHistoryRow]) -> Result<()>;
}

/// Source of one day's scheduled stops.
#[async_trait]
pub trait TimetableSource: Send + Sync {
    async fn query(&self, op_date: NaiveDate, day_code: DayCode) -> Result<Vec<TimetableStop>>;
}
