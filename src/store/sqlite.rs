//! SQLite-backed stores for raw positions and delay history.

use crate::model::{DelayHistoryRow, Direction, PositionRecord, TrainStatus};
use crate::store::{DelayStore, RealtimeStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Sqlite};
use tracing::warn;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Rows per bulk INSERT statement.
const INSERT_CHUNK: usize = 500;

const CREATE_POSITIONS: &str = r#"
CREATE TABLE IF NOT EXISTS realtime_positions (
    line_id INTEGER NOT NULL,
    line_name TEXT NOT NULL,
    station_id INTEGER NOT NULL,
    station_name TEXT NOT NULL,
    train_id TEXT NOT NULL,
    received_at TEXT NOT NULL,
    up_down INTEGER NOT NULL,
    last_station_id INTEGER NOT NULL,
    last_station_name TEXT NOT NULL,
    train_status INTEGER NOT NULL,
    express INTEGER NOT NULL,
    last_train INTEGER NOT NULL,
    requested_at TEXT NOT NULL,
    op_date TEXT NOT NULL,
    PRIMARY KEY (line_id, station_id, train_id, train_status)
)
"#;

const CREATE_HISTORY: &str = r#"
CREATE TABLE IF NOT EXISTS delay_history (
    line_id INTEGER NOT NULL,
    station_id INTEGER NOT NULL,
    train_id TEXT NOT NULL,
    received_at TEXT NOT NULL,
    train_status INTEGER NOT NULL,
    requested_at TEXT NOT NULL,
    day_code INTEGER NOT NULL,
    stop_no INTEGER NOT NULL,
    delay_secs INTEGER NOT NULL,
    op_date TEXT NOT NULL,
    PRIMARY KEY (line_id, station_id, train_id, train_status, stop_no, op_date)
)
"#;

/// One pool serving both the raw-position table and the delay history table.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects and creates the tables if they do not exist yet. The `url`
    /// follows sqlx conventions, e.g. `sqlite:metro.db?mode=rwc`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(url).await?;
        sqlx::query(CREATE_POSITIONS).execute(&pool).await?;
        sqlx::query(CREATE_HISTORY).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RealtimeStore for SqliteStore {
    async fn upsert(&self, records: &[PositionRecord], op_date: NaiveDate) -> Result<()> {
        let op_date = op_date.format(DATE_FORMAT).to_string();
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO realtime_positions (
                    line_id, line_name, station_id, station_name, train_id,
                    received_at, up_down, last_station_id, last_station_name,
                    train_status, express, last_train, requested_at, op_date
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(line_id, station_id, train_id, train_status) DO UPDATE SET
                    received_at = excluded.received_at,
                    requested_at = excluded.requested_at,
                    op_date = excluded.op_date
                "#,
            )
            .bind(record.line_id)
            .bind(&record.line_name)
            .bind(record.station_id)
            .bind(&record.station_name)
            .bind(&record.train_id)
            .bind(encode_datetime(record.received_at))
            .bind(record.up_down.code())
            .bind(record.last_station_id)
            .bind(&record.last_station_name)
            .bind(record.status.code())
            .bind(record.express)
            .bind(record.last_train)
            .bind(encode_datetime(record.requested_at))
            .bind(&op_date)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, op_date: NaiveDate) -> Result<Vec<PositionRecord>> {
        let rows: Vec<PositionRow> = sqlx::query_as(
            r#"
            SELECT line_id, line_name, station_id, station_name, train_id,
                   received_at, up_down, last_station_id, last_station_name,
                   train_status, express, last_train, requested_at
            FROM realtime_positions
            WHERE op_date = ?
            ORDER BY line_id, train_id, received_at
            "#,
        )
        .bind(op_date.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_record() {
                Some(record) => records.push(record),
                None => warn!("Skipping malformed stored position row"),
            }
        }
        Ok(records)
    }

    async fn remove(&self, op_date: NaiveDate) -> Result<u64> {
        // ISO dates compare lexicographically, so `<=` also sweeps rows left
        // behind by an earlier day whose aggregation failed.
        let result = sqlx::query("DELETE FROM realtime_positions WHERE op_date <= ?")
            .bind(op_date.format(DATE_FORMAT).to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DelayStore for SqliteStore {
    async fn insert_many(&self, rows: &[DelayHistoryRow]) -> Result<()> {
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO delay_history (
                    line_id, station_id, train_id, received_at, train_status,
                    requested_at, day_code, stop_no, delay_secs, op_date
                ) ",
            );
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.line_id)
                    .push_bind(row.station_id)
                    .push_bind(&row.train_id)
                    .push_bind(encode_datetime(row.received_at))
                    .push_bind(row.train_status)
                    .push_bind(encode_datetime(row.requested_at))
                    .push_bind(row.day_code as i64)
                    .push_bind(row.stop_no as i64)
                    .push_bind(row.delay_secs)
                    .push_bind(row.op_date.format(DATE_FORMAT).to_string());
            });
            builder.build().execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    line_id: i64,
    line_name: String,
    station_id: i64,
    station_name: String,
    train_id: String,
    received_at: String,
    up_down: i64,
    last_station_id: i64,
    last_station_name: String,
    train_status: i64,
    express: bool,
    last_train: bool,
    requested_at: String,
}

impl PositionRow {
    fn into_record(self) -> Option<PositionRecord> {
        Some(PositionRecord {
            line_id: self.line_id,
            line_name: self.line_name,
            station_id: self.station_id,
            station_name: self.station_name,
            train_id: self.train_id,
            received_at: decode_datetime(&self.received_at)?,
            up_down: Direction::from_code(self.up_down)?,
            last_station_id: self.last_station_id,
            last_station_name: self.last_station_name,
            status: TrainStatus::from_code(self.train_status)?,
            express: self.express,
            last_train: self.last_train,
            requested_at: decode_datetime(&self.requested_at)?,
        })
    }
}

fn encode_datetime(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

fn decode_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).ok()
}
