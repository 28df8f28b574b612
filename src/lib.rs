pub mod arrival;
pub mod calendar;
pub mod channel;
pub mod config;
pub mod corrections;
pub mod delay;
pub mod model;
pub mod store;
pub mod telemetry;
pub mod timetable;
pub mod view;
pub mod worker;
