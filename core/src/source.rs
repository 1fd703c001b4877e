use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::model::Measurement;
use crate::prelude::StageResult;

/// Read-only access to the upstream measurement table.
pub trait MeasurementSource {
    /// Largest id present, `None` for an empty table.
    fn max_id(&mut self) -> StageResult<Option<i64>>;
    fn load_all(&mut self) -> StageResult<Vec<Measurement>>;
}

#[derive(Deserialize)]
struct IdColumn {
    id: i64,
}

/// Measurement table dumped as CSV with a header row.
pub struct CsvMeasurementSource {
    path: PathBuf,
}

impl CsvMeasurementSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn reader(&self) -> StageResult<csv::Reader<std::fs::File>> {
        Ok(csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)?)
    }
}

impl MeasurementSource for CsvMeasurementSource {
    fn max_id(&mut self) -> StageResult<Option<i64>> {
        let mut max_id = None;
        for row in self.reader()?.deserialize::<IdColumn>() {
            let id = row?.id;
            max_id = Some(max_id.map_or(id, |max: i64| max.max(id)));
        }
        Ok(max_id)
    }

    fn load_all(&mut self) -> StageResult<Vec<Measurement>> {
        let rows = self
            .reader()?
            .deserialize::<Measurement>()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Measurements held in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    rows: Vec<Measurement>,
}

impl InMemorySource {
    pub fn new(rows: Vec<Measurement>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: Measurement) {
        self.rows.push(row);
    }
}

impl MeasurementSource for InMemorySource {
    fn max_id(&mut self) -> StageResult<Option<i64>> {
        Ok(self.rows.iter().map(|row| row.id).max())
    }

    fn load_all(&mut self) -> StageResult<Vec<Measurement>> {
        Ok(self.rows.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Unit;
    use std::io::Write;

    const TABLE: &str = "\
id, user_id, device_id, unit, value, latitude, longitude, captured_at
3, 1, , cpm, 40, 37.5, 140.5, 2015-06-01T00:00:00Z
9, 1, 21, cpm, 1750, 37.5, 140.5, 2015-06-02 00:00:00
4, 2, , microsievert, 0.1, 35.6, 139.7, 2015-06-03T00:00:00Z
";

    #[test]
    fn csv_source_reads_rows_and_max_id() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();

        let mut source = CsvMeasurementSource::new(file.path());
        assert_eq!(source.max_id().unwrap(), Some(9));

        let rows = source.load_all().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].device_id, Some(21));
        assert_eq!(rows[2].unit, Unit::Microsievert);
        assert_eq!(rows[0].device_id, None);
    }

    #[test]
    fn header_only_table_is_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"id,user_id,device_id,unit,value,latitude,longitude,captured_at\n")
            .unwrap();
        let mut source = CsvMeasurementSource::new(file.path());
        assert_eq!(source.max_id().unwrap(), None);
        assert!(source.load_all().unwrap().is_empty());
    }

    #[test]
    fn malformed_rows_fail_the_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"id,user_id,device_id,unit,value,latitude,longitude,captured_at\n1,1,,gamma,1,1,1,\n")
            .unwrap();
        let mut source = CsvMeasurementSource::new(file.path());
        assert!(source.load_all().is_err());
    }

    #[test]
    fn bad_timestamp_drops_to_null_instead_of_failing_the_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"id,user_id,device_id,unit,value,latitude,longitude,captured_at\n\
1,1,,cpm,40,37.5,140.5,2013-01-01 00:00:00.25\n\
2,1,,cpm,40,37.5,140.5,13/01/2013\n",
        )
        .unwrap();
        let mut source = CsvMeasurementSource::new(file.path());
        let rows = source.load_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].captured_at.is_some());
        assert_eq!(rows[1].captured_at, None);

        let filter = crate::processing::Sanitizer::new(
            &crate::config::FilterRules::default(),
            chrono::Utc::now(),
        );
        assert_eq!(
            filter.check(&rows[1]).unwrap_err(),
            crate::processing::RejectReason::MissingCaptureTime
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut source = CsvMeasurementSource::new("/definitely/not/here.csv");
        assert!(source.max_id().is_err());
    }
}
