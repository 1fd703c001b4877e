use anyhow::Context;
use dosecore::ExportConfig;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a run reads, writes and checkpoints, plus the export rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub state: PathBuf,
    #[serde(default)]
    pub pipeline: ExportConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::from_args(
            "data/measurements.csv",
            "data/export.csv",
            "data/export_state.json",
        )
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .pipeline
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args<P: Into<PathBuf>>(input: P, output: P, state: P) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            state: state.into(),
            pipeline: ExportConfig::default(),
        }
    }

    pub fn apply_overrides(
        &mut self,
        input: Option<PathBuf>,
        output: Option<PathBuf>,
        state: Option<PathBuf>,
    ) {
        if let Some(input) = input {
            self.input = input;
        }
        if let Some(output) = output {
            self.output = output;
        }
        if let Some(state) = state {
            self.state = state;
        }
    }

    pub fn to_export_config(&self) -> ExportConfig {
        self.pipeline.clone()
    }

    /// Lock file guarding the state and output against concurrent runs.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .state
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("export_state"));
        name.push(".lock");
        self.state.with_file_name(name)
    }
}
