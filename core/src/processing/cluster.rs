use crate::config::{ExportConfig, ProjectionConfig};
use crate::math::cluster_key;
use crate::model::GridCell;
use crate::prelude::{ProcessingStage, StageError, StageResult};
use crate::telemetry::LogManager;

/// Sorts cells so every ancestor tile's cells form one contiguous run.
///
/// Cells sharing the finest tile are ordered by `(y, x)` so the output is
/// fully determined by the set of cells.
pub fn sort_cells(cells: &mut [GridCell], projection: &ProjectionConfig) {
    cells.sort_by_cached_key(|cell| (cluster_key(cell.x, cell.y, projection), cell.y, cell.x));
}

pub struct ClusterStage {
    projection: Option<ProjectionConfig>,
    logger: LogManager,
}

impl ClusterStage {
    pub fn new() -> Self {
        Self {
            projection: None,
            logger: LogManager::new("cluster"),
        }
    }
}

impl Default for ClusterStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for ClusterStage {
    type Input = Vec<GridCell>;
    type Output = Vec<GridCell>;

    fn name(&self) -> &'static str {
        "cluster"
    }

    fn initialize(&mut self, config: &ExportConfig) -> StageResult<()> {
        self.projection = Some(config.projection);
        Ok(())
    }

    fn execute(&mut self, mut input: Self::Input) -> StageResult<Self::Output> {
        let projection = self
            .projection
            .as_ref()
            .ok_or(StageError::NotInitialized("cluster"))?;

        sort_cells(&mut input, projection);
        self.logger.record(&format!(
            "ordered {} cells across {} zoom levels",
            input.len(),
            projection.zoom_level
        ));
        Ok(input)
    }

    fn cleanup(&mut self) {
        self.projection = None;
    }
}
