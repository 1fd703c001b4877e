use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::OutputConfig;
use crate::model::{ExportRecord, GridCell};
use crate::prelude::{StageError, StageResult};
use crate::telemetry::LogManager;

/// Streams cluster-ordered cells as fixed-point CSV records.
pub struct Exporter<W: Write> {
    writer: csv::Writer<W>,
    scale: f64,
    written: usize,
}

impl<W: Write> Exporter<W> {
    pub fn new(inner: W, output: &OutputConfig) -> StageResult<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        if output.include_header {
            writer.write_record(["x", "y", "z"])?;
        }
        Ok(Self {
            writer,
            scale: output.scale,
            written: 0,
        })
    }

    pub fn write_cell(&mut self, cell: &GridCell) -> StageResult<()> {
        self.writer
            .serialize(ExportRecord::from_cell(cell, self.scale))?;
        self.written += 1;
        Ok(())
    }

    pub fn write_cells(&mut self, cells: &[GridCell]) -> StageResult<usize> {
        for cell in cells {
            self.write_cell(cell)?;
        }
        Ok(cells.len())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flushes and hands back the underlying writer.
    pub fn finish(self) -> StageResult<W> {
        self.writer.into_inner().map_err(|err| {
            StageError::Io(std::io::Error::new(err.error().kind(), err.to_string()))
        })
    }
}

/// Destination of a finished export. Nothing is visible to consumers until
/// `publish` returns successfully.
pub trait ExportSink {
    fn publish(&mut self, cells: &[GridCell], output: &OutputConfig) -> StageResult<usize>;
}

/// Writes beside the target and renames into place.
pub struct AtomicFileSink {
    path: PathBuf,
    logger: LogManager,
}

impl AtomicFileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            logger: LogManager::new("export"),
        }
    }
}

impl ExportSink for AtomicFileSink {
    fn publish(&mut self, cells: &[GridCell], output: &OutputConfig) -> StageResult<usize> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&directory)?;

        let staged = tempfile::NamedTempFile::new_in(&directory)?;
        let mut exporter = Exporter::new(std::io::BufWriter::new(staged), output)?;
        let written = exporter.write_cells(cells)?;
        let staged = exporter
            .finish()?
            .into_inner()
            .map_err(|err| StageError::Io(err.into_error()))?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|err| err.error)?;

        self.logger
            .record(&format!("wrote {} records to {}", written, self.path.display()));
        Ok(written)
    }
}

/// Collects the export in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub bytes: Vec<u8>,
    pub publications: usize,
}

impl ExportSink for MemorySink {
    fn publish(&mut self, cells: &[GridCell], output: &OutputConfig) -> StageResult<usize> {
        let mut exporter = Exporter::new(Vec::new(), output)?;
        let written = exporter.write_cells(cells)?;
        self.bytes = exporter.finish()?;
        self.publications += 1;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells() -> Vec<GridCell> {
        vec![
            GridCell {
                x: 1,
                y: 2,
                cutoff_day: 0,
                aggregated_dose: 0.25,
            },
            GridCell {
                x: 3,
                y: 4,
                cutoff_day: 0,
                aggregated_dose: 1.5,
            },
        ]
    }

    #[test]
    fn records_are_scaled_and_kept_in_order() {
        let mut sink = MemorySink::default();
        let written = sink.publish(&cells(), &OutputConfig::default()).unwrap();
        assert_eq!(written, 2);
        assert_eq!(
            String::from_utf8(sink.bytes).unwrap(),
            "x,y,z\n1,2,250\n3,4,1500\n"
        );
    }

    #[test]
    fn header_can_be_disabled() {
        let output = OutputConfig {
            include_header: false,
            ..OutputConfig::default()
        };
        let mut exporter = Exporter::new(Vec::new(), &output).unwrap();
        exporter.write_cells(&cells()[..1]).unwrap();
        assert_eq!(exporter.written(), 1);
        assert_eq!(exporter.finish().unwrap(), b"1,2,250\n".to_vec());
    }

    #[test]
    fn file_sink_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("export.csv");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "stale").unwrap();

        let mut sink = AtomicFileSink::new(&path);
        sink.publish(&cells(), &OutputConfig::default()).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("x,y,z\n1,2,250\n"));

        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
