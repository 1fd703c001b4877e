pub mod cell;
pub mod measurement;

pub use cell::{ExportRecord, GridCell, NormalizedPoint};
pub use measurement::{parse_timestamp, CleanMeasurement, Measurement, Unit};
