use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{ExportConfig, FilterRules, IdExclusion};
use crate::model::{CleanMeasurement, Measurement, Unit};
use crate::prelude::{ProcessingStage, StageError, StageResult};
use crate::telemetry::{LogManager, MetricsRecorder};

/// Why a measurement was left out of the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    ExcludedId,
    BannedUser,
    MissingCaptureTime,
    CaptureTimeOutOfRange,
    MissingValue,
    MissingLocation,
    ValueOutOfBounds,
    UncataloguedDevice,
    NullIsland,
    LatitudeOutOfRange,
    LongitudeOutOfRange,
    Geofenced,
    UnknownSensitivity,
}

impl RejectReason {
    pub fn label(self) -> &'static str {
        match self {
            RejectReason::ExcludedId => "excluded_id",
            RejectReason::BannedUser => "banned_user",
            RejectReason::MissingCaptureTime => "missing_captured_at",
            RejectReason::CaptureTimeOutOfRange => "captured_at_out_of_range",
            RejectReason::MissingValue => "missing_value",
            RejectReason::MissingLocation => "missing_location",
            RejectReason::ValueOutOfBounds => "value_out_of_bounds",
            RejectReason::UncataloguedDevice => "uncatalogued_device",
            RejectReason::NullIsland => "null_island",
            RejectReason::LatitudeOutOfRange => "latitude_out_of_range",
            RejectReason::LongitudeOutOfRange => "longitude_out_of_range",
            RejectReason::Geofenced => "geofenced",
            RejectReason::UnknownSensitivity => "unknown_sensitivity",
        }
    }
}

/// Predicate set compiled from [`FilterRules`] for one reference time.
pub struct Sanitizer {
    rules: FilterRules,
    excluded_ids: HashSet<i64>,
    excluded_ranges: Vec<IdExclusion>,
    banned_users: HashSet<i64>,
    latest_capture: DateTime<Utc>,
}

impl Sanitizer {
    pub fn new(rules: &FilterRules, now: DateTime<Utc>) -> Self {
        let mut excluded_ids = HashSet::new();
        let mut excluded_ranges = Vec::new();
        for exclusion in &rules.excluded_ids {
            match *exclusion {
                IdExclusion::Single(id) => {
                    excluded_ids.insert(id);
                }
                range @ IdExclusion::Range { .. } => excluded_ranges.push(range),
            }
        }

        Self {
            rules: rules.clone(),
            excluded_ids,
            excluded_ranges,
            banned_users: rules.banned_users.iter().copied().collect(),
            latest_capture: now + Duration::hours(rules.future_tolerance_hours),
        }
    }

    /// Returns the row with its nulls resolved, or the first predicate it fails.
    pub fn check(&self, row: &Measurement) -> Result<CleanMeasurement, RejectReason> {
        if self.is_excluded(row.id) {
            return Err(RejectReason::ExcludedId);
        }
        if self.banned_users.contains(&row.user_id) {
            return Err(RejectReason::BannedUser);
        }

        let captured_at = row.captured_at.ok_or(RejectReason::MissingCaptureTime)?;
        if captured_at < self.rules.earliest_capture || captured_at > self.latest_capture {
            return Err(RejectReason::CaptureTimeOutOfRange);
        }

        let value = row.value.ok_or(RejectReason::MissingValue)?;
        let (latitude, longitude) = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => (latitude, longitude),
            _ => return Err(RejectReason::MissingLocation),
        };

        self.check_value(row.unit, row.device_id, value)?;

        if latitude == 0.0 && longitude == 0.0 {
            return Err(RejectReason::NullIsland);
        }
        if latitude.is_nan() || latitude.abs() > self.rules.max_abs_latitude {
            return Err(RejectReason::LatitudeOutOfRange);
        }
        if longitude.is_nan() || longitude.abs() > self.rules.max_abs_longitude {
            return Err(RejectReason::LongitudeOutOfRange);
        }

        if let Some(fence) = self
            .rules
            .geofences
            .iter()
            .find(|fence| !fence.permits(row.user_id, value, latitude, longitude))
        {
            log::trace!("measurement {} blocked by geofence {}", row.id, fence.name);
            return Err(RejectReason::Geofenced);
        }

        Ok(CleanMeasurement {
            id: row.id,
            user_id: row.user_id,
            device_id: row.device_id,
            unit: row.unit,
            value,
            latitude,
            longitude,
            captured_at,
        })
    }

    fn is_excluded(&self, id: i64) -> bool {
        self.excluded_ids.contains(&id)
            || self.excluded_ranges.iter().any(|range| range.contains(id))
    }

    fn check_value(&self, unit: Unit, device_id: Option<i64>, value: f64) -> Result<(), RejectReason> {
        let (min, max) = match unit {
            Unit::Cpm => {
                let bounds = &self.rules.cpm;
                match device_id {
                    None => (bounds.min, bounds.max_without_device),
                    Some(device) if device <= bounds.max_device_id => {
                        (bounds.min, bounds.max_with_device)
                    }
                    Some(_) => return Err(RejectReason::UncataloguedDevice),
                }
            }
            Unit::Microsievert => (self.rules.dose_rate.min, self.rules.dose_rate.max),
        };
        // NaN fails both comparisons and is rejected with the out-of-range rows
        if value >= min && value <= max {
            Ok(())
        } else {
            Err(RejectReason::ValueOutOfBounds)
        }
    }
}

/// Drops every measurement that fails a [`Sanitizer`] predicate.
pub struct FilterStage {
    now: DateTime<Utc>,
    sanitizer: Option<Sanitizer>,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl FilterStage {
    pub fn new(now: DateTime<Utc>, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            now,
            sanitizer: None,
            metrics,
            logger: LogManager::new("filter"),
        }
    }
}

impl ProcessingStage for FilterStage {
    type Input = Vec<Measurement>;
    type Output = Vec<CleanMeasurement>;

    fn name(&self) -> &'static str {
        "filter"
    }

    fn initialize(&mut self, config: &ExportConfig) -> StageResult<()> {
        self.sanitizer = Some(Sanitizer::new(&config.filter, self.now));
        Ok(())
    }

    fn execute(&mut self, input: Self::Input) -> StageResult<Self::Output> {
        let sanitizer = self
            .sanitizer
            .as_ref()
            .ok_or(StageError::NotInitialized("filter"))?;

        let total = input.len();
        let mut kept = Vec::with_capacity(total);
        for row in &input {
            match sanitizer.check(row) {
                Ok(clean) => {
                    self.metrics.record_accepted();
                    kept.push(clean);
                }
                Err(reason) => {
                    self.metrics.record_rejected(reason.label());
                    self.logger.detail(&format!(
                        "dropped {} measurement {}: {}",
                        row.unit.label(),
                        row.id,
                        reason.label()
                    ));
                }
            }
        }

        self.logger
            .record(&format!("kept {} of {} measurements", kept.len(), total));
        Ok(kept)
    }

    fn cleanup(&mut self) {
        self.sanitizer = None;
    }
}
