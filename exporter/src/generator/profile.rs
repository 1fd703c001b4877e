use anyhow::Context;
use chrono::{DateTime, Duration, TimeZone, Utc};
use dosecore::model::{Measurement, Unit};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for generating a synthetic measurement table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub count: usize,
    pub seed: u64,
    pub first_id: i64,
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub spread_degrees: f64,
    pub start: DateTime<Utc>,
    pub span_days: i64,
    /// Share of rows deliberately broken so the filter has work to do.
    pub defect_rate: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            count: 1_000,
            seed: 0,
            first_id: 1,
            center_latitude: 37.42,
            center_longitude: 141.03,
            spread_degrees: 0.05,
            start: Utc
                .with_ymd_and_hms(2012, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            span_days: 3_000,
            defect_rate: 0.05,
        }
    }
}

impl GeneratorConfig {
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.spread_degrees.is_finite() && self.spread_degrees > 0.0,
            "generator spread must be positive"
        );
        anyhow::ensure!(self.span_days > 0, "generator span must be positive");
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.defect_rate),
            "defect rate must lie in [0, 1]"
        );
        Ok(())
    }
}

fn build_measurement(rng: &mut StdRng, config: &GeneratorConfig, id: i64) -> Measurement {
    let latitude =
        config.center_latitude + rng.gen_range(-config.spread_degrees..config.spread_degrees);
    let longitude =
        config.center_longitude + rng.gen_range(-config.spread_degrees..config.spread_degrees);
    let captured_at = config.start
        + Duration::days(rng.gen_range(0..config.span_days))
        + Duration::seconds(rng.gen_range(0..86_400));

    // Background around 0.1-0.4 µSv/h expressed in whatever the device reports.
    let dose_rate = rng.gen_range(0.1..0.4);
    let (unit, device_id, value) = match rng.gen_range(0..10) {
        0..=4 => (Unit::Cpm, None, dose_rate * 334.0),
        5..=7 => (Unit::Cpm, Some(21), dose_rate * 1750.0),
        _ => (Unit::Microsievert, Some(rng.gen_range(30..40)), dose_rate),
    };

    let mut measurement = Measurement {
        id,
        user_id: rng.gen_range(1..=40),
        device_id,
        unit,
        value: Some(value),
        latitude: Some(latitude),
        longitude: Some(longitude),
        captured_at: Some(captured_at),
    };

    if rng.gen_bool(config.defect_rate) {
        match rng.gen_range(0..4) {
            0 => measurement.value = None,
            1 => {
                measurement.latitude = Some(0.0);
                measurement.longitude = Some(0.0);
            }
            2 => {
                measurement.unit = Unit::Cpm;
                measurement.device_id = None;
                measurement.value = Some(5.0);
            }
            _ => measurement.captured_at = Some(captured_at + Duration::days(365 * 50)),
        }
    }
    measurement
}

/// Builds `config.count` measurements with consecutive ids.
pub fn build_measurements(config: &GeneratorConfig) -> anyhow::Result<Vec<Measurement>> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let count = i64::try_from(config.count).context("generator count does not fit an id")?;
    let last_id = config
        .first_id
        .checked_add(count)
        .context("overflow computing generator ids")?;
    Ok((config.first_id..last_id)
        .map(|id| build_measurement(&mut rng, config, id))
        .collect())
}

/// Dumps measurements in the layout the CSV source reads.
pub fn write_measurements_csv<P: AsRef<Path>>(path: P, rows: &[Measurement]) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating measurement table {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("writing measurement {}", row.id))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dosecore::source::{CsvMeasurementSource, MeasurementSource};

    #[test]
    fn generator_builds_expected_row_count() {
        let rows = build_measurements(&GeneratorConfig {
            count: 250,
            first_id: 100,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(rows.len(), 250);
        assert_eq!(rows[0].id, 100);
        assert_eq!(rows[249].id, 349);
    }

    #[test]
    fn same_seed_same_rows() {
        let config = GeneratorConfig {
            count: 50,
            seed: 13,
            ..Default::default()
        };
        assert_eq!(
            build_measurements(&config).unwrap(),
            build_measurements(&config).unwrap()
        );
    }

    #[test]
    fn defects_only_when_requested() {
        let clean = build_measurements(&GeneratorConfig {
            count: 200,
            defect_rate: 0.0,
            ..Default::default()
        })
        .unwrap();
        assert!(clean.iter().all(|row| row.value.is_some()));
        assert!(build_measurements(&GeneratorConfig {
            defect_rate: 1.5,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn csv_dump_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("measurements.csv");
        let rows = build_measurements(&GeneratorConfig {
            count: 40,
            seed: 5,
            ..Default::default()
        })
        .unwrap();
        write_measurements_csv(&path, &rows).unwrap();

        let mut source = CsvMeasurementSource::new(&path);
        assert_eq!(source.max_id().unwrap(), Some(40));
        let read = source.load_all().unwrap();
        assert_eq!(read.len(), rows.len());
        assert_eq!(read[3].id, rows[3].id);
        assert_eq!(read[3].captured_at, rows[3].captured_at);
    }
}
