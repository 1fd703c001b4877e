use std::collections::HashMap;

use crate::config::{SensitivityTable, UnknownDevicePolicy};
use crate::model::Unit;

/// Converts reported values into µSv/h.
pub struct DoseNormalizer {
    default_cpm_per_usvh: f64,
    devices: HashMap<i64, f64>,
    unknown_device: UnknownDevicePolicy,
}

impl DoseNormalizer {
    pub fn new(table: &SensitivityTable) -> Self {
        Self {
            default_cpm_per_usvh: table.default_cpm_per_usvh,
            devices: table
                .devices
                .iter()
                .map(|device| (device.device_id, device.cpm_per_usvh))
                .collect(),
            unknown_device: table.unknown_device,
        }
    }

    /// Returns `None` only when a CPM row names a device without a
    /// sensitivity entry and the policy is [`UnknownDevicePolicy::Reject`].
    pub fn normalize(&self, unit: Unit, device_id: Option<i64>, value: f64) -> Option<f64> {
        if unit.is_dose_rate() {
            return Some(value);
        }
        let sensitivity = match device_id {
            None => Some(self.default_cpm_per_usvh),
            Some(device) => self.devices.get(&device).copied(),
        };
        match (sensitivity, self.unknown_device) {
            (Some(cpm_per_usvh), _) => Some(value / cpm_per_usvh),
            (None, UnknownDevicePolicy::Zero) => Some(0.0),
            (None, UnknownDevicePolicy::Reject) => None,
        }
    }
}
