//! Snapshot consumer: delay computation, view maintenance, end-of-day
//! aggregation.

use crate::arrival::ArrivalNormalizer;
use crate::calendar::{HolidayCalendar, OperationalDay, ServiceWindow};
use crate::channel::{END_OF_SERVICE, Message, START_OF_SERVICE, Subscriber};
use crate::corrections::refine_positions;
use crate::delay::DelayEngine;
use crate::model::Snapshot;
use crate::store::{DelayExporter, DelayStore, RealtimeStore, TimetableSource};
use crate::timetable::TimetableIndex;
use crate::view::{ComputedView, ViewHandle};
use anyhow::{Result, ensure};
use chrono::Local;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct TransformWorker {
    subscriber: Subscriber,
    realtime: Arc<dyn RealtimeStore>,
    delays: Arc<dyn DelayStore>,
    timetable: Arc<dyn TimetableSource>,
    exporter: Option<DelayExporter>,
    view: ViewHandle,
    window: ServiceWindow,
    holidays: HolidayCalendar,
    normalizer: ArrivalNormalizer,
}

impl TransformWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subscriber: Subscriber,
        realtime: Arc<dyn RealtimeStore>,
        delays: Arc<dyn DelayStore>,
        timetable: Arc<dyn TimetableSource>,
        exporter: Option<DelayExporter>,
        view: ViewHandle,
        window: ServiceWindow,
        holidays: HolidayCalendar,
        normalizer: ArrivalNormalizer,
    ) -> Self {
        Self {
            subscriber,
            realtime,
            delays,
            timetable,
            exporter,
            view,
            window,
            holidays,
            normalizer,
        }
    }

    /// Runs forever. Only the initial timetable load is fatal; once the
    /// worker is up, every per-message failure is logged and the previous
    /// view stays in place.
    pub async fn run(mut self) -> Result<()> {
        let mut index = self.load_index().await?;
        info!(
            stops = index.len(),
            date = %index.op_day().date,
            "Timetable loaded"
        );

        loop {
            match self.subscriber.recv().await {
                Message::Snapshot(snapshot) => self.apply_snapshot(&index, snapshot),
                Message::Control(END_OF_SERVICE) => {
                    if let Err(e) = self.end_of_day(&index).await {
                        error!(error = %e, "End-of-day aggregation failed");
                    }
                }
                Message::Control(START_OF_SERVICE) => match self.load_index().await {
                    Ok(next) => {
                        index = next;
                        info!(
                            stops = index.len(),
                            date = %index.op_day().date,
                            "Timetable reloaded for the new day"
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "Timetable reload failed, keeping the previous day")
                    }
                },
                Message::Control(code) => warn!(code, "Unknown control code"),
            }
        }
    }

    async fn load_index(&self) -> Result<TimetableIndex> {
        let now = Local::now().naive_local();
        let op_day = OperationalDay::at(now, &self.window, &self.holidays);
        let rows = self.timetable.query(op_day.date, op_day.day_code).await?;
        ensure!(
            !rows.is_empty(),
            "timetable partition for {:?} is empty",
            op_day.day_code
        );
        Ok(TimetableIndex::build(rows, op_day, &self.window))
    }

    fn apply_snapshot(&self, index: &TimetableIndex, snapshot: Snapshot) {
        let positions = refine_positions(snapshot.positions);
        let engine = DelayEngine::new(index, self.window);

        let mut arrivals = engine.arrivals_by_station(&positions);
        for (station, rows) in self.normalizer.normalize(&snapshot.arrivals) {
            arrivals.entry(station).or_default().extend(rows);
        }

        info!(
            trains = positions.len(),
            stations = arrivals.len(),
            "View updated"
        );
        self.view
            .publish(ComputedView::new(positions, arrivals, snapshot.requested_at));
    }

    /// Scans the day's raw positions, writes the delay history, optionally
    /// exports it, then clears the scanned rows plus any leftovers from
    /// earlier failed days.
    async fn end_of_day(&self, index: &TimetableIndex) -> Result<()> {
        let op_day = index.op_day();
        let positions = self.realtime.find(op_day.date).await?;
        let engine = DelayEngine::new(index, self.window);
        let rows = engine.history_rows(&positions);
        info!(
            positions = positions.len(),
            rows = rows.len(),
            date = %op_day.date,
            "Running end-of-day aggregation"
        );

        self.delays.insert_many(&rows).await?;

        if let Some(exporter) = &self.exporter {
            if let Err(e) = exporter.export_day(op_day.date, &rows).await {
                error!(error = %e, "Delay history export failed");
            }
        }

        let removed = self.realtime.remove(op_day.date).await?;
        info!(removed, "Cleared the day's raw positions");
        Ok(())
    }
}
