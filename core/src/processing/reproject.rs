use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ExportConfig, SourceCorrection};
use crate::math::WebMercator;
use crate::model::{CleanMeasurement, NormalizedPoint};
use crate::prelude::{ProcessingStage, StageError, StageResult};
use crate::processing::filter::RejectReason;
use crate::processing::normalize::DoseNormalizer;
use crate::telemetry::{LogManager, MetricsRecorder};

/// Projects measurements into pixel space, applying per-source corrections.
pub struct Reprojector {
    projection: WebMercator,
    corrections: HashMap<i64, SourceCorrection>,
}

impl Reprojector {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            projection: WebMercator::new(&config.projection),
            corrections: config
                .source_corrections
                .iter()
                .map(|correction| (correction.user_id, correction.clone()))
                .collect(),
        }
    }

    pub fn project(&self, longitude: f64, latitude: f64, user_id: i64) -> (u32, u32) {
        let offset = self
            .corrections
            .get(&user_id)
            .map(|c| (c.pixel_offset_x, c.pixel_offset_y))
            .unwrap_or((0, 0));
        self.projection.project(longitude, latitude, offset)
    }

    /// Capture day after the source's day offset, saturated into `i16`.
    pub fn captured_day(&self, measurement: &CleanMeasurement) -> i16 {
        let offset = self
            .corrections
            .get(&measurement.user_id)
            .map_or(0, |c| i64::from(c.day_offset));
        let day = measurement.captured_day() + offset;
        day.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
    }
}

/// Turns filtered measurements into [`NormalizedPoint`]s.
pub struct ReprojectStage {
    reprojector: Option<Reprojector>,
    normalizer: Option<DoseNormalizer>,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl ReprojectStage {
    pub fn new(metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            reprojector: None,
            normalizer: None,
            metrics,
            logger: LogManager::new("reproject"),
        }
    }
}

impl ProcessingStage for ReprojectStage {
    type Input = Vec<CleanMeasurement>;
    type Output = Vec<NormalizedPoint>;

    fn name(&self) -> &'static str {
        "reproject"
    }

    fn initialize(&mut self, config: &ExportConfig) -> StageResult<()> {
        self.reprojector = Some(Reprojector::new(config));
        self.normalizer = Some(DoseNormalizer::new(&config.sensitivity));
        Ok(())
    }

    fn execute(&mut self, input: Self::Input) -> StageResult<Self::Output> {
        let (reprojector, normalizer) = match (&self.reprojector, &self.normalizer) {
            (Some(reprojector), Some(normalizer)) => (reprojector, normalizer),
            _ => return Err(StageError::NotInitialized("reproject")),
        };

        let mut points = Vec::with_capacity(input.len());
        for measurement in &input {
            let Some(dose_rate) =
                normalizer.normalize(measurement.unit, measurement.device_id, measurement.value)
            else {
                self.metrics
                    .record_rejected(RejectReason::UnknownSensitivity.label());
                continue;
            };
            let (pixel_x, pixel_y) =
                reprojector.project(measurement.longitude, measurement.latitude, measurement.user_id);
            points.push(NormalizedPoint {
                pixel_x,
                pixel_y,
                captured_day: reprojector.captured_day(measurement),
                dose_rate: dose_rate as f32,
            });
        }

        self.metrics.record_projected(points.len());
        self.logger
            .record(&format!("projected {} points", points.len()));
        Ok(points)
    }

    fn cleanup(&mut self) {
        self.reprojector = None;
        self.normalizer = None;
    }
}
