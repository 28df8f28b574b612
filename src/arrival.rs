//! Arrival normalization for lines served only by the whole-network arrival
//! endpoint. No timetable join; direction and distance come straight from
//! the feed.

use crate::model::{ArrivalRecord, ArrivalRow, stops_away_message};
use std::collections::HashMap;
use tracing::debug;

/// The feed's "this station" token in two-word status messages.
const THIS_STATION: &str = "당역";

/// Extracts a "stations out" count from a free-text status message.
///
/// Two shapes are recognized: a two-word "<here|previous> <verb>" message
/// (here-token means 0 stops, anything else means 1) and a counted
/// "[N]th station out (name)" message. Everything else yields `None`.
pub fn parse_stops_away(message: &str) -> Option<u32> {
    let parts: Vec<&str> = message.split_whitespace().collect();
    match parts.len() {
        2 => Some(if parts[0] == THIS_STATION { 0 } else { 1 }),
        n if n >= 3 => first_integer(parts[0]),
        _ => None,
    }
}

fn first_integer(s: &str) -> Option<u32> {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

pub struct ArrivalNormalizer {
    allow_list: Vec<i64>,
}

impl ArrivalNormalizer {
    pub fn new(allow_list: Vec<i64>) -> Self {
        Self { allow_list }
    }

    pub fn allow_list(&self) -> &[i64] {
        &self.allow_list
    }

    /// Turns raw arrival telemetry for allow-listed lines into per-station
    /// view rows. Unparseable messages are kept with an unknown distance
    /// rather than dropped.
    pub fn normalize(&self, records: &[ArrivalRecord]) -> HashMap<i64, Vec<ArrivalRow>> {
        let mut buckets: HashMap<i64, Vec<ArrivalRow>> = HashMap::new();

        for r in records {
            if !self.allow_list.contains(&r.line_id) {
                continue;
            }

            let stops_away = parse_stops_away(&r.message);
            if stops_away.is_none() {
                debug!(line = r.line_id, message = %r.message, "Unrecognized arrival message shape");
            }
            let message = match stops_away {
                Some(n) => stops_away_message(n, r.status.label()),
                None => r.message.clone(),
            };

            buckets.entry(r.station_id).or_default().push(ArrivalRow {
                train_id: r.train_id.clone(),
                first_station_name: String::new(),
                last_station_name: r.last_station_name.clone(),
                searched_station_name: r.station_name.clone(),
                current_station_name: r.current_station_name.clone(),
                received_at: r.received_at,
                status: r.status.label().to_string(),
                express: r.express,
                express_skip: false,
                up_down: r.up_down,
                current_delay_secs: None,
                seconds_to_arrival: r.seconds_to_arrival,
                expected_arrival: None,
                stops_away,
                message,
                scheduled_arrival: None,
                scheduled_departure: None,
            });
        }

        for rows in buckets.values_mut() {
            rows.sort_by_key(|r| (r.seconds_to_arrival.is_none(), r.seconds_to_arrival));
        }
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Direction, TrainStatus};
    use chrono::NaiveDate;

    #[test]
    fn test_two_word_messages() {
        assert_eq!(parse_stops_away("당역 도착"), Some(0));
        assert_eq!(parse_stops_away("당역 진입"), Some(0));
        assert_eq!(parse_stops_away("전역 출발"), Some(1));
        assert_eq!(parse_stops_away("전역 진입"), Some(1));
    }

    #[test]
    fn test_counted_messages() {
        assert_eq!(parse_stops_away("[4]번째 전역 (공릉)"), Some(4));
        assert_eq!(parse_stops_away("[10]번째 전역 (판교)"), Some(10));
    }

    #[test]
    fn test_unrecognized_messages_yield_none() {
        assert_eq!(parse_stops_away(""), None);
        assert_eq!(parse_stops_away("도착"), None);
        assert_eq!(parse_stops_away("곧 도착 예정"), None);
    }

    fn arrival(line_id: i64, station_id: i64, message: &str) -> ArrivalRecord {
        ArrivalRecord {
            line_id,
            station_id,
            station_name: "강남".to_string(),
            train_id: "D1024".to_string(),
            last_station_name: "광교".to_string(),
            current_station_name: "양재".to_string(),
            received_at: NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            express: false,
            status: TrainStatus::Approaching,
            up_down: Direction::Down,
            seconds_to_arrival: Some(120),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_normalize_filters_allow_list() {
        let normalizer = ArrivalNormalizer::new(vec![1077]);
        let records = vec![arrival(1077, 4307, "전역 출발"), arrival(1001, 158, "전역 출발")];

        let by_station = normalizer.normalize(&records);
        assert_eq!(by_station.len(), 1);
        assert!(by_station.contains_key(&4307));
    }

    #[test]
    fn test_normalize_rebuilds_known_messages() {
        let normalizer = ArrivalNormalizer::new(vec![1077]);
        let records = vec![arrival(1077, 4307, "[2]번째 전역 (청계산입구)")];

        let rows = &normalizer.normalize(&records)[&4307];
        assert_eq!(rows[0].stops_away, Some(2));
        assert_eq!(rows[0].message, "2 stations out, approaching");
        assert_eq!(rows[0].up_down, Direction::Down);
    }

    #[test]
    fn test_normalize_keeps_unparseable_rows() {
        let normalizer = ArrivalNormalizer::new(vec![1077]);
        let records = vec![arrival(1077, 4307, "운행중")];

        let rows = &normalizer.normalize(&records)[&4307];
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stops_away, None);
        assert_eq!(rows[0].message, "운행중");
    }
}
