//! Configuration surface of the export.
//!
//! Everything here is business data rather than behavior: exclusion lists,
//! geofences, sensitivity tables and projection constants. The `Default`
//! impls reproduce the reference deployment so an empty YAML document yields
//! a compatible export.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::prelude::{StageError, StageResult};

/// Root configuration shared by every stage of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub filter: FilterRules,
    pub projection: ProjectionConfig,
    pub sensitivity: SensitivityTable,
    pub source_corrections: Vec<SourceCorrection>,
    pub binning: BinningConfig,
    pub output: OutputConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            filter: FilterRules::default(),
            projection: ProjectionConfig::default(),
            sensitivity: SensitivityTable::default(),
            source_corrections: vec![SourceCorrection::default()],
            binning: BinningConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> StageResult<()> {
        self.filter.validate()?;
        self.projection.validate()?;
        self.sensitivity.validate()?;
        if self.binning.window_days <= 0 {
            return Err(StageError::InvalidConfig(format!(
                "binning window must be positive, got {} days",
                self.binning.window_days
            )));
        }
        if !(self.output.scale.is_finite() && self.output.scale > 0.0) {
            return Err(StageError::InvalidConfig(format!(
                "output scale must be a positive number, got {}",
                self.output.scale
            )));
        }
        Ok(())
    }
}

/// Either one known-bad measurement id or an inclusive range of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdExclusion {
    Single(i64),
    Range { from: i64, to: i64 },
}

impl IdExclusion {
    pub fn contains(&self, id: i64) -> bool {
        match *self {
            IdExclusion::Single(excluded) => excluded == id,
            IdExclusion::Range { from, to } => (from..=to).contains(&id),
        }
    }
}

/// Inclusive value interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Count-rate sanity bounds, which depend on what is known about the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpmBounds {
    pub min: f64,
    /// Ceiling when the row carries no device id.
    pub max_without_device: f64,
    /// Ceiling for catalogued devices.
    pub max_with_device: f64,
    /// Highest catalogued device id; CPM rows from later devices are rejected.
    pub max_device_id: i64,
}

impl Default for CpmBounds {
    fn default() -> Self {
        Self {
            min: 10.0,
            max_without_device: 350_000.0,
            max_with_device: 30_000.0,
            max_device_id: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }
}

/// Allows a user's data everywhere except readings at or above `threshold`
/// inside `area`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceException {
    pub name: String,
    pub user_id: i64,
    /// Compared against the raw value, in the unit the row was reported in.
    pub threshold: f64,
    pub area: BoundingBox,
}

impl GeofenceException {
    pub fn permits(&self, user_id: i64, value: f64, latitude: f64, longitude: f64) -> bool {
        user_id != self.user_id || value < self.threshold || !self.area.contains(latitude, longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    pub excluded_ids: Vec<IdExclusion>,
    pub banned_users: Vec<i64>,
    pub earliest_capture: DateTime<Utc>,
    /// How far past the run's reference time a capture may lie.
    pub future_tolerance_hours: i64,
    pub cpm: CpmBounds,
    pub dose_rate: ValueRange,
    pub max_abs_latitude: f64,
    pub max_abs_longitude: f64,
    pub geofences: Vec<GeofenceException>,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            excluded_ids: vec![
                IdExclusion::Range {
                    from: 13_194_822,
                    to: 13_195_356,
                },
                IdExclusion::Range {
                    from: 14_591_971,
                    to: 14_598_163,
                },
                IdExclusion::Single(11_573_046),
                IdExclusion::Single(20_041_733),
            ],
            banned_users: vec![345, 902],
            earliest_capture: Utc
                .with_ymd_and_hms(2011, 3, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            future_tolerance_hours: 48,
            cpm: CpmBounds::default(),
            dose_rate: ValueRange { min: 0.02, max: 5.0 },
            max_abs_latitude: 85.05,
            max_abs_longitude: 180.0,
            geofences: vec![
                GeofenceException {
                    name: "tokyo-bay-drift".into(),
                    user_id: 366,
                    threshold: 110.0,
                    area: BoundingBox {
                        min_latitude: 35.38,
                        max_latitude: 35.78,
                        min_longitude: 139.62,
                        max_longitude: 140.12,
                    },
                },
                GeofenceException {
                    name: "iitate-static-station".into(),
                    user_id: 1183,
                    threshold: 0.6,
                    area: BoundingBox {
                        min_latitude: 37.55,
                        max_latitude: 37.72,
                        min_longitude: 140.62,
                        max_longitude: 140.82,
                    },
                },
                GeofenceException {
                    name: "kiev-lab-source".into(),
                    user_id: 1571,
                    threshold: 60.0,
                    area: BoundingBox {
                        min_latitude: 50.35,
                        max_latitude: 50.55,
                        min_longitude: 30.35,
                        max_longitude: 30.65,
                    },
                },
            ],
        }
    }
}

impl FilterRules {
    fn validate(&self) -> StageResult<()> {
        for exclusion in &self.excluded_ids {
            if let IdExclusion::Range { from, to } = *exclusion {
                if from > to {
                    return Err(StageError::InvalidConfig(format!(
                        "excluded id range {from}..={to} is empty"
                    )));
                }
            }
        }
        for fence in &self.geofences {
            let area = &fence.area;
            if area.min_latitude > area.max_latitude || area.min_longitude > area.max_longitude {
                return Err(StageError::InvalidConfig(format!(
                    "geofence {} has an inverted bounding box",
                    fence.name
                )));
            }
        }
        if self.cpm.min > self.cpm.max_with_device || self.cpm.min > self.cpm.max_without_device {
            return Err(StageError::InvalidConfig("cpm floor exceeds a ceiling".into()));
        }
        if self.dose_rate.min > self.dose_rate.max {
            return Err(StageError::InvalidConfig("dose rate bounds are inverted".into()));
        }
        if self.future_tolerance_hours < 0 {
            return Err(StageError::InvalidConfig(
                "future tolerance must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Fixed-zoom Web Mercator pixel grid and its tile pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub zoom_level: u8,
    pub tile_size: u32,
    /// Width and height of pixel space; always `tile_size << zoom_level`.
    pub pixel_width: u32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            zoom_level: 13,
            tile_size: 256,
            pixel_width: 1 << 21,
        }
    }
}

impl ProjectionConfig {
    /// `log2(tile_size)`.
    pub fn tile_shift(&self) -> u32 {
        self.tile_size.trailing_zeros()
    }

    fn validate(&self) -> StageResult<()> {
        if !self.tile_size.is_power_of_two() {
            return Err(StageError::InvalidConfig(format!(
                "tile size {} is not a power of two",
                self.tile_size
            )));
        }
        if self.zoom_level == 0 || u32::from(self.zoom_level) + self.tile_shift() > 31 {
            return Err(StageError::InvalidConfig(format!(
                "zoom level {} does not fit a 32-bit pixel space",
                self.zoom_level
            )));
        }
        if self.tile_size << self.zoom_level != self.pixel_width {
            return Err(StageError::InvalidConfig(format!(
                "pixel width {} disagrees with tile size {} at zoom {}",
                self.pixel_width, self.tile_size, self.zoom_level
            )));
        }
        Ok(())
    }
}

/// What to do with a CPM row whose device has no sensitivity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownDevicePolicy {
    /// Keep the row with a dose rate of zero.
    #[default]
    Zero,
    /// Drop the row like any other rejected input.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSensitivity {
    pub device_id: i64,
    /// Counts per minute that correspond to 1 µSv/h.
    pub cpm_per_usvh: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityTable {
    /// Applied when a CPM row has no device id (bGeigie with an LND 7317 tube).
    pub default_cpm_per_usvh: f64,
    pub devices: Vec<DeviceSensitivity>,
    pub unknown_device: UnknownDevicePolicy,
}

impl Default for SensitivityTable {
    fn default() -> Self {
        let lnd_7317 = |device_id| DeviceSensitivity {
            device_id,
            cpm_per_usvh: 334.0,
            label: Some("LND 7317".into()),
        };
        let mut devices: Vec<DeviceSensitivity> = (1..=12).map(lnd_7317).collect();
        devices.extend((13..=20).map(|device_id| DeviceSensitivity {
            device_id,
            cpm_per_usvh: 108.0,
            label: Some("LND 712".into()),
        }));
        devices.push(DeviceSensitivity {
            device_id: 21,
            cpm_per_usvh: 1750.0,
            label: Some("SBM-20 pair".into()),
        });
        devices.push(lnd_7317(24));

        Self {
            default_cpm_per_usvh: 334.0,
            devices,
            unknown_device: UnknownDevicePolicy::Zero,
        }
    }
}

impl SensitivityTable {
    fn validate(&self) -> StageResult<()> {
        let valid = |value: f64| value.is_finite() && value > 0.0;
        if !valid(self.default_cpm_per_usvh) {
            return Err(StageError::InvalidConfig(
                "default sensitivity must be positive".into(),
            ));
        }
        if let Some(bad) = self.devices.iter().find(|d| !valid(d.cpm_per_usvh)) {
            return Err(StageError::InvalidConfig(format!(
                "device {} has a non-positive sensitivity",
                bad.device_id
            )));
        }
        Ok(())
    }
}

/// Pixel and day corrections for one submission channel, matched by user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCorrection {
    pub name: String,
    pub user_id: i64,
    pub pixel_offset_x: i32,
    pub pixel_offset_y: i32,
    /// Added to the capture day; a large negative value ranks the source as
    /// older than co-located points from other sources.
    pub day_offset: i32,
}

impl Default for SourceCorrection {
    /// Firmware that truncated coordinates to three decimals; half a step is
    /// about three pixels at zoom 13, north-east of the truncated corner.
    fn default() -> Self {
        Self {
            name: "truncated-firmware-import".into(),
            user_id: 347,
            pixel_offset_x: 3,
            pixel_offset_y: -3,
            day_offset: -16_384,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinningConfig {
    pub window_days: i32,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self { window_days: 270 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Fixed-point multiplier applied to the aggregated dose rate.
    pub scale: f64,
    pub include_header: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            scale: 1000.0,
            include_header: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ExportConfig::default();
        config.validate().unwrap();
        assert_eq!(config.projection.tile_shift(), 8);
        assert_eq!(config.binning.window_days, 270);
        assert_eq!(config.filter.geofences.len(), 3);
        assert_eq!(
            config.filter.earliest_capture.to_rfc3339(),
            "2011-03-01T00:00:00+00:00"
        );
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let config: ExportConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, ExportConfig::default());
    }

    #[test]
    fn id_exclusions_accept_singles_and_ranges() {
        let yaml = "excluded_ids:\n  - 42\n  - { from: 100, to: 200 }\n";
        let rules: FilterRules = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules.excluded_ids[0], IdExclusion::Single(42));
        assert!(rules.excluded_ids[1].contains(100));
        assert!(rules.excluded_ids[1].contains(200));
        assert!(!rules.excluded_ids[1].contains(201));
    }

    #[test]
    fn geofence_blocks_only_hot_readings_inside_area() {
        let fence = GeofenceException {
            name: "test".into(),
            user_id: 9,
            threshold: 100.0,
            area: BoundingBox {
                min_latitude: 10.0,
                max_latitude: 11.0,
                min_longitude: 20.0,
                max_longitude: 21.0,
            },
        };
        assert!(!fence.permits(9, 150.0, 10.5, 20.5));
        assert!(fence.permits(9, 50.0, 10.5, 20.5));
        assert!(fence.permits(9, 150.0, 12.0, 20.5));
        assert!(fence.permits(8, 150.0, 10.5, 20.5));
    }

    #[test]
    fn mismatched_pixel_width_is_rejected() {
        let mut config = ExportConfig::default();
        config.projection.pixel_width = 1 << 20;
        assert!(matches!(
            config.validate(),
            Err(StageError::InvalidConfig(_))
        ));
    }

    #[test]
    fn non_power_of_two_tiles_are_rejected() {
        let mut config = ExportConfig::default();
        config.projection.tile_size = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_device_policy_parses_lowercase() {
        let table: SensitivityTable = serde_yaml::from_str("unknown_device: reject\n").unwrap();
        assert_eq!(table.unknown_device, UnknownDevicePolicy::Reject);
        assert_eq!(table.default_cpm_per_usvh, 334.0);
    }
}
