//! The two long-running halves of the pipeline.

pub mod collector;
pub mod transform;

pub use collector::CollectorWorker;
pub use transform::TransformWorker;
