//! Environment-backed runtime configuration, loaded once at startup after
//! `dotenvy` has populated the process environment.

use crate::calendar::{HolidayCalendar, ServiceWindow};
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_key: String,
    pub channel_addr: String,
    pub window: ServiceWindow,
    pub holidays: Vec<NaiveDate>,
    pub arrival_lines: Vec<i64>,
    pub sqlite_path: String,
    pub timetable_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("TELEMETRY_API_KEY").context("TELEMETRY_API_KEY must be set")?;
        let api_base_url = env_or(
            "TELEMETRY_BASE_URL",
            "http://swopenapi.seoul.go.kr/api/subway",
        );
        let channel_addr = env_or("CHANNEL_ADDR", "127.0.0.1:9978");

        let start = parse_clock(&env_or("SERVICE_START", "04:50:00"))
            .context("SERVICE_START must be HH:MM:SS")?;
        let end = parse_clock(&env_or("SERVICE_END", "01:30:00"))
            .context("SERVICE_END must be HH:MM:SS")?;

        let holidays = parse_dates(&env_or("HOLIDAYS", ""))?;
        let arrival_lines = parse_line_ids(&env_or("ARRIVAL_LINES", "1077"))?;

        Ok(Self {
            api_base_url,
            api_key,
            channel_addr,
            window: ServiceWindow::new(start, end),
            holidays,
            arrival_lines,
            sqlite_path: env_or("SQLITE_PATH", "metro.db"),
            timetable_dir: env_or("TIMETABLE_DIR", "timetable"),
        })
    }

    pub fn holiday_calendar(&self) -> HolidayCalendar {
        HolidayCalendar::new(self.holidays.iter().copied())
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_clock(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S").map_err(Into::into)
}

/// Comma-separated `YYYY-MM-DD` dates.
fn parse_dates(raw: &str) -> Result<Vec<NaiveDate>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("invalid holiday date {s:?}"))
        })
        .collect()
}

fn parse_line_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("invalid line id {s:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dates() {
        let dates = parse_dates("2024-03-01, 2024-05-05").unwrap();
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        assert!(parse_dates("").unwrap().is_empty());
        assert!(parse_dates("2024/03/01").is_err());
    }

    #[test]
    fn test_parse_line_ids() {
        assert_eq!(parse_line_ids("1077").unwrap(), vec![1077]);
        assert_eq!(parse_line_ids("1077, 1081").unwrap(), vec![1077, 1081]);
        assert!(parse_line_ids("second").is_err());
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(
            parse_clock("04:50:00").unwrap(),
            NaiveTime::from_hms_opt(4, 50, 0).unwrap()
        );
        assert!(parse_clock("4:50").is_err());
    }
}
