//! Poll loop: fetch telemetry, publish snapshots, persist raw positions.

use crate::calendar::ServiceWindow;
use crate::channel::{END_OF_SERVICE, Message, Publisher, START_OF_SERVICE};
use crate::corrections::refine_positions;
use crate::model::Snapshot;
use crate::store::RealtimeStore;
use crate::telemetry::{HttpClient, TelemetrySource, polled_lines};
use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct CollectorWorker<C> {
    source: TelemetrySource<C>,
    publisher: Publisher,
    store: Arc<dyn RealtimeStore>,
    window: ServiceWindow,
    arrival_lines: Vec<i64>,
    interval: Duration,
}

impl<C: HttpClient> CollectorWorker<C> {
    pub fn new(
        source: TelemetrySource<C>,
        publisher: Publisher,
        store: Arc<dyn RealtimeStore>,
        window: ServiceWindow,
        arrival_lines: Vec<i64>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            publisher,
            store,
            window,
            arrival_lines,
            interval,
        }
    }

    pub async fn run(self) -> Result<()> {
        tokio::spawn(self.publisher.clone().run());
        info!(interval_secs = self.interval.as_secs(), "Collector started");
        loop {
            let now = Local::now().naive_local();
            if self.window.is_active(now.time()) {
                self.tick(now).await;
                tokio::time::sleep(self.interval).await;
            } else {
                self.idle_until_next_start(now).await;
            }
        }
    }

    /// One poll cycle. Failures are logged and the cycle is dropped, so a bad
    /// tick never clears the downstream view or blocks the loop.
    async fn tick(&self, requested_at: NaiveDateTime) {
        let Some(snapshot) = self.collect(requested_at).await else {
            warn!("No telemetry this tick, keeping the previous view");
            return;
        };

        if let Err(e) = self.publisher.publish(&Message::Snapshot(snapshot.clone())).await {
            error!(error = %e, "Failed to publish snapshot");
        }

        let op_date = self.window.operational_date(requested_at);
        if let Err(e) = self.store.upsert(&snapshot.positions, op_date).await {
            error!(error = %e, "Failed to persist raw positions");
        }
    }

    /// Fetches every polled line plus the arrival feed. Lines that fail are
    /// simply absent from the snapshot; `None` means nothing came back at all.
    async fn collect(&self, requested_at: NaiveDateTime) -> Option<Snapshot> {
        let mut positions = Vec::new();
        let mut any_update = false;

        for (line_id, line_name) in polled_lines(&self.arrival_lines) {
            match self.source.fetch_positions(line_name, requested_at).await {
                Some(records) => {
                    any_update = true;
                    positions.extend(records);
                }
                None => warn!(line = line_id, "No position update this tick"),
            }
        }

        let arrivals = match self.source.fetch_arrivals().await {
            Some(records) => {
                any_update = true;
                records
            }
            None => {
                warn!("No arrival update this tick");
                Vec::new()
            }
        };

        if !any_update {
            return None;
        }

        let positions = refine_positions(positions);
        info!(
            positions = positions.len(),
            arrivals = arrivals.len(),
            "Snapshot collected"
        );
        Some(Snapshot {
            positions,
            arrivals,
            requested_at,
        })
    }

    async fn idle_until_next_start(&self, now: NaiveDateTime) {
        info!("Service hours ended, entering idle");
        if let Err(e) = self.publisher.publish(&Message::Control(END_OF_SERVICE)).await {
            error!(error = %e, "Failed to publish end-of-service");
        }

        let pause = self.window.until_next_start(now);
        info!(minutes = pause.num_minutes(), "Sleeping until start of service");
        let pause = pause.to_std().unwrap_or_else(|_| Duration::from_secs(60));
        tokio::time::sleep(pause).await;

        if let Err(e) = self.publisher.publish(&Message::Control(START_OF_SERVICE)).await {
            error!(error = %e, "Failed to publish start-of-service");
        }
        info!("Service hours resumed");
    }
}
