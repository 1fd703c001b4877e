//! Checkpoint recording which measurements the last export covered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::prelude::StageResult;
use crate::telemetry::LogManager;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportState {
    pub last_max_id: i64,
    pub export_date: DateTime<Utc>,
}

/// Load/commit access to the single persisted [`ExportState`].
pub trait StateStore {
    /// `None` when no usable state exists yet.
    fn load(&self) -> StageResult<Option<ExportState>>;
    fn commit(&mut self, state: &ExportState) -> StageResult<()>;
}

/// On-disk shape, lenient so a damaged document resets instead of failing.
#[derive(Deserialize)]
struct StoredState {
    last_max_id: Option<i64>,
    export_date: Option<DateTime<Utc>>,
}

/// JSON document replaced atomically on every commit.
pub struct FileStateStore {
    path: PathBuf,
    logger: LogManager,
}

impl FileStateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            logger: LogManager::new("state"),
        }
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> StageResult<Option<ExportState>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let stored = match serde_json::from_str::<StoredState>(&contents) {
            Ok(stored) => stored,
            Err(err) => {
                self.logger.warn(&format!(
                    "ignoring unreadable state {}: {}",
                    self.path.display(),
                    err
                ));
                return Ok(None);
            }
        };

        match stored {
            StoredState {
                last_max_id: Some(last_max_id),
                export_date: Some(export_date),
            } if last_max_id > 0 => Ok(Some(ExportState {
                last_max_id,
                export_date,
            })),
            _ => {
                self.logger.warn(&format!(
                    "resetting empty or zero state in {}",
                    self.path.display()
                ));
                Ok(None)
            }
        }
    }

    fn commit(&mut self, state: &ExportState) -> StageResult<()> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&directory)?;

        let mut staged = tempfile::NamedTempFile::new_in(&directory)?;
        serde_json::to_writer_pretty(&mut staged, state)?;
        staged.write_all(b"\n")?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.path)
            .map_err(|err| err.error)?;

        self.logger.record(&format!(
            "committed last_max_id {} to {}",
            state.last_max_id,
            self.path.display()
        ));
        Ok(())
    }
}

/// Keeps the state in memory; lets runs be exercised with fabricated state.
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    state: Option<ExportState>,
}

impl MemoryStateStore {
    pub fn new(state: Option<ExportState>) -> Self {
        Self { state }
    }

    pub fn current(&self) -> Option<&ExportState> {
        self.state.as_ref()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> StageResult<Option<ExportState>> {
        Ok(self.state.clone().filter(|state| state.last_max_id > 0))
    }

    fn commit(&mut self, state: &ExportState) -> StageResult<()> {
        self.state = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn state(last_max_id: i64) -> ExportState {
        ExportState {
            last_max_id,
            export_date: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn missing_file_means_no_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn commit_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStateStore::new(dir.path().join("nested").join("state.json"));
        store.commit(&state(42)).unwrap();
        assert_eq!(store.load().unwrap(), Some(state(42)));

        store.commit(&state(43)).unwrap();
        assert_eq!(store.load().unwrap().unwrap().last_max_id, 43);
    }

    #[test]
    fn corrupt_documents_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStateStore::new(&path);

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(store.load().unwrap(), None);

        fs::write(&path, r#"{"last_max_id": null, "export_date": null}"#).unwrap();
        assert_eq!(store.load().unwrap(), None);

        fs::write(
            &path,
            r#"{"last_max_id": 0, "export_date": "2024-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn memory_store_ignores_zero_state() {
        let mut store = MemoryStateStore::new(Some(state(0)));
        assert_eq!(store.load().unwrap(), None);
        store.commit(&state(9)).unwrap();
        assert_eq!(store.load().unwrap(), Some(state(9)));
        assert_eq!(store.current().map(|s| s.last_max_id), Some(9));
    }
}
