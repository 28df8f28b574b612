//! Upstream telemetry API: per-line train positions and whole-network
//! arrival estimates.
//!
//! Every failure mode (timeout, non-200, error envelope, unexpected shape)
//! yields `None`, which callers treat as "no update this tick" and never as
//! "clear the view".

mod client;

pub use client::{BasicClient, HttpClient};

use crate::corrections;
use crate::model::{ArrivalRecord, Direction, PositionRecord, TrainStatus};
use chrono::NaiveDateTime;
use serde_json::Value;
use tracing::warn;

/// Lines polled through the position endpoint, with the names the API
/// addresses them by.
pub const LINES: [(i64, &str); 19] = [
    (1001, "1호선"),
    (1002, "2호선"),
    (1003, "3호선"),
    (1004, "4호선"),
    (1005, "5호선"),
    (1006, "6호선"),
    (1007, "7호선"),
    (1008, "8호선"),
    (1009, "9호선"),
    (1032, "GTX-A"),
    (1063, "경의중앙선"),
    (1065, "공항철도"),
    (1067, "경춘선"),
    (1075, "수인분당선"),
    (1077, "신분당선"),
    (1081, "경강선"),
    (1092, "우이신설선"),
    (1093, "서해선"),
    (1094, "신림선"),
];

/// Lines to poll positions for: everything except the lines covered by the
/// arrival endpoint instead.
pub fn polled_lines(arrival_allow_list: &[i64]) -> Vec<(i64, &'static str)> {
    LINES
        .iter()
        .filter(|(id, _)| !arrival_allow_list.contains(id))
        .copied()
        .collect()
}

/// Success sentinel in the API's status envelope.
const SUCCESS_CODE: &str = "INFO-000";

const POSITION_LIST: &str = "realtimePositionList";
const ARRIVAL_LIST: &str = "realtimeArrivalList";

pub struct TelemetrySource<C> {
    client: C,
    base_url: String,
    api_key: String,
}

impl<C: HttpClient> TelemetrySource<C> {
    pub fn new(client: C, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Positions of every train currently on one line.
    pub async fn fetch_positions(
        &self,
        line_name: &str,
        requested_at: NaiveDateTime,
    ) -> Option<Vec<PositionRecord>> {
        let url = format!(
            "{}/{}/json/realtimePosition/0/1000/{}",
            self.base_url, self.api_key, line_name
        );
        let rows = self.fetch_payload(&url, POSITION_LIST).await?;

        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for row in &rows {
            match parse_position(row, requested_at) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(line = line_name, skipped, "Dropped malformed position rows");
        }
        Some(records)
    }

    /// Arrival estimates for every station on the network.
    pub async fn fetch_arrivals(&self) -> Option<Vec<ArrivalRecord>> {
        let url = format!(
            "{}/{}/json/realtimeStationArrival/ALL",
            self.base_url, self.api_key
        );
        let rows = self.fetch_payload(&url, ARRIVAL_LIST).await?;

        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for row in &rows {
            match parse_arrival(row) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, "Dropped malformed arrival rows");
        }
        Some(records)
    }

    async fn fetch_payload(&self, url: &str, list_key: &str) -> Option<Vec<Value>> {
        let parsed = match reqwest::Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "Invalid telemetry URL");
                return None;
            }
        };
        let req = reqwest::Request::new(reqwest::Method::GET, parsed);

        let resp = match self.client.execute(req).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Telemetry fetch failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "Telemetry fetch returned non-success status");
            return None;
        }
        let body: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Telemetry response was not JSON");
                return None;
            }
        };
        envelope_payload(body, list_key)
    }
}

/// Unwraps the API envelope: either a flat error object carrying a top-level
/// `code`, or a status object that must hold the success sentinel next to
/// the payload list.
fn envelope_payload(mut body: Value, list_key: &str) -> Option<Vec<Value>> {
    if body.get("code").is_some() {
        warn!(
            code = body["code"].as_str().unwrap_or(""),
            message = body["message"].as_str().unwrap_or(""),
            "Telemetry API returned an error envelope"
        );
        return None;
    }

    match body["errorMessage"]["code"].as_str() {
        Some(SUCCESS_CODE) => {}
        other => {
            warn!(
                code = other.unwrap_or("missing"),
                "Telemetry API status is not success"
            );
            return None;
        }
    }

    match body[list_key].take() {
        Value::Array(rows) => Some(rows),
        _ => {
            warn!(list_key, "Telemetry payload missing expected list");
            None
        }
    }
}

fn parse_position(row: &Value, requested_at: NaiveDateTime) -> Option<PositionRecord> {
    let line_id = field_i64(row, "subwayId")?;
    let station_name = field_str(row, "statnNm")?.to_string();
    let station_id = field_i64(row, "statnId")
        .or_else(|| corrections::fix_station_id(line_id, &station_name))?;
    let last_station_name = field_str(row, "statnTnm")?.to_string();
    let last_station_id = field_i64(row, "statnTid")
        .or_else(|| corrections::fix_station_id(line_id, &last_station_name))?;

    Some(PositionRecord {
        line_id,
        line_name: field_str(row, "subwayNm").unwrap_or_default().to_string(),
        station_id,
        station_name,
        train_id: field_str(row, "trainNo")?.trim().to_string(),
        received_at: parse_datetime(field_str(row, "recptnDt")?)?,
        up_down: Direction::from_code(field_i64(row, "updnLine")?)?,
        last_station_id,
        last_station_name,
        status: TrainStatus::from_code(field_i64(row, "trainSttus")?)?,
        express: field_i64(row, "directAt") == Some(1),
        last_train: field_i64(row, "lstcarAt") == Some(1),
        requested_at,
    })
}

// Arrival rows carry no request timestamp; `received_at` is the feed's own
// `recptnDt`.
fn parse_arrival(row: &Value) -> Option<ArrivalRecord> {
    let line_id = field_i64(row, "subwayId")?;
    let station_name = field_str(row, "statnNm")?.to_string();
    let station_id = field_i64(row, "statnId")
        .or_else(|| corrections::fix_station_id(line_id, &station_name))?;
    // The arrival feed spells direction out instead of using codes.
    let up_down = if field_str(row, "updnLine")? == "상행" {
        Direction::Up
    } else {
        Direction::Down
    };

    Some(ArrivalRecord {
        line_id,
        station_id,
        station_name,
        train_id: field_str(row, "btrainNo")?.trim().to_string(),
        last_station_name: field_str(row, "bstatnNm").unwrap_or_default().to_string(),
        current_station_name: field_str(row, "arvlMsg3").unwrap_or_default().to_string(),
        received_at: parse_datetime(field_str(row, "recptnDt")?)?,
        express: field_str(row, "btrainSttus") == Some("급행"),
        status: TrainStatus::from_code(field_i64(row, "arvlCd")?)?,
        up_down,
        seconds_to_arrival: field_i64(row, "barvlDt").filter(|s| *s > 0),
        message: field_str(row, "arvlMsg2").unwrap_or_default().to_string(),
    })
}

// The API serializes numbers inconsistently, sometimes as strings.
fn field_i64(row: &Value, key: &str) -> Option<i64> {
    match &row[key] {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn field_str<'a>(row: &'a Value, key: &str) -> Option<&'a str> {
    row[key].as_str()
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn requested_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_error_envelope_yields_none() {
        let body = json!({"status": 500, "code": "ERROR-0316", "message": "wrong key"});
        assert!(envelope_payload(body, POSITION_LIST).is_none());
    }

    #[test]
    fn test_non_success_status_yields_none() {
        let body = json!({
            "errorMessage": {"status": 200, "code": "INFO-200", "message": "no data"},
            "realtimePositionList": []
        });
        assert!(envelope_payload(body, POSITION_LIST).is_none());
    }

    #[test]
    fn test_missing_list_yields_none() {
        let body = json!({
            "errorMessage": {"status": 200, "code": "INFO-000"}
        });
        assert!(envelope_payload(body, POSITION_LIST).is_none());
    }

    #[test]
    fn test_success_envelope_yields_rows() {
        let body = json!({
            "errorMessage": {"status": 200, "code": "INFO-000"},
            "realtimePositionList": [{"trainNo": "0042"}, {"trainNo": "0043"}]
        });
        let rows = envelope_payload(body, POSITION_LIST).unwrap();
        assert_eq!(rows.len(), 2);
    }

    fn position_row() -> Value {
        json!({
            "subwayId": "1001",
            "subwayNm": "1호선",
            "statnId": "1001000132",
            "statnNm": "시청",
            "trainNo": " 0042 ",
            "recptnDt": "2024-03-05 10:00:13",
            "updnLine": "0",
            "statnTid": "1001000141",
            "statnTnm": "인천",
            "trainSttus": "1",
            "directAt": "0",
            "lstcarAt": "1"
        })
    }

    #[test]
    fn test_parse_position_row() {
        let record = parse_position(&position_row(), requested_at()).unwrap();
        assert_eq!(record.line_id, 1001);
        assert_eq!(record.station_id, 1001000132);
        assert_eq!(record.train_id, "0042");
        assert_eq!(record.status, TrainStatus::Arrived);
        assert_eq!(record.up_down, Direction::Up);
        assert!(!record.express);
        assert!(record.last_train);
        assert_eq!(
            record.received_at,
            NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(10, 0, 13)
                .unwrap()
        );
    }

    #[test]
    fn test_parse_position_tolerates_numeric_fields() {
        let mut row = position_row();
        row["subwayId"] = json!(1001);
        row["trainSttus"] = json!(1);
        let record = parse_position(&row, requested_at()).unwrap();
        assert_eq!(record.line_id, 1001);
        assert_eq!(record.status, TrainStatus::Arrived);
    }

    #[test]
    fn test_parse_position_applies_branch_line_station_fix() {
        let mut row = position_row();
        row["subwayId"] = json!("1067");
        row["statnId"] = json!("");
        row["statnNm"] = json!("광운대");
        let record = parse_position(&row, requested_at()).unwrap();
        assert_eq!(record.station_id, 1067080119);
    }

    #[test]
    fn test_parse_position_rejects_malformed_rows() {
        let mut missing_train = position_row();
        missing_train["trainNo"] = json!(null);
        assert!(parse_position(&missing_train, requested_at()).is_none());

        let mut bad_date = position_row();
        bad_date["recptnDt"] = json!("10:00:13");
        assert!(parse_position(&bad_date, requested_at()).is_none());

        let mut bad_status = position_row();
        bad_status["trainSttus"] = json!("7");
        assert!(parse_position(&bad_status, requested_at()).is_none());
    }

    #[test]
    fn test_parse_arrival_row() {
        let row = json!({
            "subwayId": "1077",
            "statnId": "4307",
            "statnNm": "강남",
            "btrainNo": "D1024",
            "bstatnNm": "광교",
            "arvlMsg2": "전역 출발",
            "arvlMsg3": "양재",
            "recptnDt": "2024-03-05 10:00:13",
            "btrainSttus": "일반",
            "updnLine": "하행",
            "barvlDt": "120",
            "arvlCd": "0"
        });
        let record = parse_arrival(&row).unwrap();
        assert_eq!(record.line_id, 1077);
        assert_eq!(record.up_down, Direction::Down);
        assert_eq!(record.status, TrainStatus::Approaching);
        assert_eq!(record.seconds_to_arrival, Some(120));
        assert!(!record.express);
        assert_eq!(record.message, "전역 출발");
    }

    #[test]
    fn test_parse_arrival_zero_countdown_is_unknown() {
        let row = json!({
            "subwayId": "1077",
            "statnId": "4307",
            "statnNm": "강남",
            "btrainNo": "D1024",
            "bstatnNm": "광교",
            "arvlMsg2": "당역 도착",
            "arvlMsg3": "강남",
            "recptnDt": "2024-03-05 10:00:13",
            "btrainSttus": "급행",
            "updnLine": "상행",
            "barvlDt": "0",
            "arvlCd": "1"
        });
        let record = parse_arrival(&row).unwrap();
        assert_eq!(record.seconds_to_arrival, None);
        assert!(record.express);
        assert_eq!(record.up_down, Direction::Up);
    }

    #[test]
    fn test_polled_lines_exclude_the_allow_list() {
        let polled = polled_lines(&[1077]);
        assert_eq!(polled.len(), LINES.len() - 1);
        assert!(polled.iter().all(|(id, _)| *id != 1077));

        let all = polled_lines(&[]);
        assert_eq!(all.len(), LINES.len());
    }

    /// Answers every request on a local socket with the same status line and
    /// an empty body.
    async fn canned_http_server(status_line: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response =
                    format!("{}\r\nconnection: close\r\ncontent-length: 0\r\n\r\n", status_line);
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_non_success_http_status_yields_none() {
        let addr = canned_http_server("HTTP/1.1 500 Internal Server Error").await;
        let source = TelemetrySource::new(
            BasicClient::new().unwrap(),
            format!("http://{}", addr),
            "key",
        );

        assert!(source.fetch_positions("2호선", requested_at()).await.is_none());
        assert!(source.fetch_arrivals().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_yields_none() {
        // Bind and drop immediately so the port refuses connections.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let source = TelemetrySource::new(
            BasicClient::new().unwrap(),
            format!("http://{}", addr),
            "key",
        );

        assert!(source.fetch_positions("1호선", requested_at()).await.is_none());
    }
}
