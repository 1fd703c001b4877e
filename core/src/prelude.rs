use crate::config::ExportConfig;

/// Common error type for stage execution and the surrounding I/O.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{0} stage used before initialization")]
    NotInitialized(&'static str),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv failure: {0}")]
    Csv(#[from] csv::Error),
    #[error("state document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type StageResult<T> = Result<T, StageError>;

/// Trait describing the batch stages of the export pipeline.
///
/// A stage is initialized once per run from the validated configuration,
/// executed exactly once on the output of the previous stage, and cleaned up
/// before the run ends so no intermediate data outlives it.
pub trait ProcessingStage {
    type Input;
    type Output;

    fn name(&self) -> &'static str;
    fn initialize(&mut self, config: &ExportConfig) -> StageResult<()>;
    fn execute(&mut self, input: Self::Input) -> StageResult<Self::Output>;
    fn cleanup(&mut self);
}
