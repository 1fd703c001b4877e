use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ExportConfig;
use crate::math::MeanAccumulator;
use crate::model::{GridCell, NormalizedPoint};
use crate::prelude::{ProcessingStage, StageError, StageResult};
use crate::telemetry::{LogManager, MetricsRecorder};

#[derive(Debug, Default)]
struct CellWindow {
    latest_day: i32,
    recent: MeanAccumulator,
}

/// Aggregates points per pixel with a window anchored at each cell's own
/// latest capture day.
///
/// Pass one finds the latest day per cell; pass two averages the points
/// newer than `latest - window_days`. The point defining the latest day
/// always survives, so every cell has a mean.
pub fn bin_points(points: &[NormalizedPoint], window_days: i32) -> Vec<GridCell> {
    let mut cells: HashMap<(u32, u32), CellWindow> = HashMap::new();
    for point in points {
        let day = i32::from(point.captured_day);
        cells
            .entry((point.pixel_x, point.pixel_y))
            .and_modify(|cell| cell.latest_day = cell.latest_day.max(day))
            .or_insert_with(|| CellWindow {
                latest_day: day,
                ..Default::default()
            });
    }

    for point in points {
        if let Some(cell) = cells.get_mut(&(point.pixel_x, point.pixel_y)) {
            if i32::from(point.captured_day) > cell.latest_day - window_days {
                cell.recent.push(point.dose_rate);
            }
        }
    }

    cells
        .into_iter()
        .filter_map(|((x, y), cell)| {
            cell.recent.mean().map(|mean| GridCell {
                x,
                y,
                cutoff_day: cell.latest_day - window_days,
                aggregated_dose: mean as f32,
            })
        })
        .collect()
}

/// Reduces projected points to one [`GridCell`] per occupied pixel.
pub struct BinningStage {
    window_days: Option<i32>,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl BinningStage {
    pub fn new(metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            window_days: None,
            metrics,
            logger: LogManager::new("binning"),
        }
    }
}

impl ProcessingStage for BinningStage {
    type Input = Vec<NormalizedPoint>;
    type Output = Vec<GridCell>;

    fn name(&self) -> &'static str {
        "binning"
    }

    fn initialize(&mut self, config: &ExportConfig) -> StageResult<()> {
        if config.binning.window_days <= 0 {
            return Err(StageError::InvalidConfig(
                "binning window must be positive".into(),
            ));
        }
        self.window_days = Some(config.binning.window_days);
        Ok(())
    }

    fn execute(&mut self, input: Self::Input) -> StageResult<Self::Output> {
        let window_days = self
            .window_days
            .ok_or(StageError::NotInitialized("binning"))?;

        let cells = bin_points(&input, window_days);
        self.metrics.record_cells(cells.len());
        self.logger.record(&format!(
            "binned {} points into {} cells ({}-day window)",
            input.len(),
            cells.len(),
            window_days
        ));
        Ok(cells)
    }

    fn cleanup(&mut self) {
        self.window_days = None;
    }
}
