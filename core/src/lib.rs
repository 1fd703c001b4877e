//! Core of the dose map export.
//!
//! Raw device measurements are filtered, projected into a fixed-zoom Web
//! Mercator pixel grid, normalized to µSv/h, binned per pixel with a
//! recency window and written in quadtree cluster order, gated by a
//! persisted change checkpoint.

pub mod config;
pub mod export;
pub mod gate;
pub mod math;
pub mod model;
pub mod prelude;
pub mod processing;
pub mod source;
pub mod state;
pub mod telemetry;

pub use config::ExportConfig;
pub use prelude::{ProcessingStage, StageError, StageResult};
