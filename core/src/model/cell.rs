use serde::{Deserialize, Serialize};

/// A filtered measurement moved into pixel space with a normalized dose rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedPoint {
    pub pixel_x: u32,
    pub pixel_y: u32,
    /// Days since the epoch, after any per-source day offset.
    pub captured_day: i16,
    /// µSv/h.
    pub dose_rate: f32,
}

/// Aggregate of every point that landed on one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub x: u32,
    pub y: u32,
    pub cutoff_day: i32,
    pub aggregated_dose: f32,
}

/// Fixed-point row written to the export stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub x: u32,
    pub y: u32,
    pub z: i64,
}

impl ExportRecord {
    pub fn from_cell(cell: &GridCell, scale: f64) -> Self {
        Self {
            x: cell.x,
            y: cell.y,
            z: (f64::from(cell.aggregated_dose) * scale).round() as i64,
        }
    }
}
