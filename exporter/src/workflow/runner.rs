use crate::workflow::config::WorkflowConfig;
use crate::workflow::lock::RunLock;
use anyhow::Context;
use chrono::{DateTime, Utc};
use dosecore::export::{AtomicFileSink, ExportSink};
use dosecore::gate::ChangeGate;
use dosecore::model::{GridCell, Measurement};
use dosecore::prelude::ProcessingStage;
use dosecore::processing::{BinningStage, ClusterStage, FilterStage, ReprojectStage};
use dosecore::source::{CsvMeasurementSource, MeasurementSource};
use dosecore::state::{ExportState, FileStateStore, StateStore};
use dosecore::telemetry::{MetricsRecorder, MetricsSnapshot};
use dosecore::ExportConfig;
use log::info;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Reference time for the capture window and the committed export date.
    pub now: DateTime<Utc>,
    /// Recompute even when the change gate reports nothing new.
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub exported: bool,
    pub previous_max_id: i64,
    pub max_id: i64,
    pub records: usize,
    pub metrics: MetricsSnapshot,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    /// Runs against the files named in the workflow config under a run lock.
    pub fn execute(&self, options: &RunOptions) -> anyhow::Result<RunReport> {
        let _lock = RunLock::acquire(self.config.lock_path())?;
        let mut source = CsvMeasurementSource::new(&self.config.input);
        let mut store = FileStateStore::new(&self.config.state);
        let mut sink = AtomicFileSink::new(&self.config.output);
        self.execute_with(&mut source, &mut store, &mut sink, options)
    }

    /// Gate, recompute, publish, commit. State is only committed after the
    /// sink has published, so any failure leaves the checkpoint untouched.
    pub fn execute_with<S, T, K>(
        &self,
        source: &mut S,
        store: &mut T,
        sink: &mut K,
        options: &RunOptions,
    ) -> anyhow::Result<RunReport>
    where
        S: MeasurementSource,
        T: StateStore,
        K: ExportSink,
    {
        let export_config = self.config.to_export_config();
        export_config
            .validate()
            .context("validating export configuration")?;

        let previous = store.load().context("loading export state")?;
        let current = source
            .max_id()
            .context("reading latest measurement id")?;
        let gate = ChangeGate::new(previous.as_ref(), current);
        let metrics = Arc::new(MetricsRecorder::new());

        if !gate.should_run() && !options.force {
            info!(
                "no measurements beyond id {} (latest {}), skipping export",
                gate.stored_max_id(),
                gate.current_max_id()
            );
            return Ok(RunReport {
                exported: false,
                previous_max_id: gate.stored_max_id(),
                max_id: gate.current_max_id(),
                records: 0,
                metrics: metrics.snapshot(),
            });
        }

        let rows = source.load_all().context("loading measurements")?;
        metrics.record_read(rows.len());
        info!(
            "recomputing export from {} measurements (ids up to {})",
            rows.len(),
            gate.current_max_id()
        );

        let cells = compute_cells(&export_config, rows, options.now, &metrics)?;
        let records = sink
            .publish(&cells, &export_config.output)
            .context("publishing export")?;
        metrics.record_exported(records);

        let max_id = gate.current_max_id().max(gate.stored_max_id());
        if max_id > 0 {
            store
                .commit(&ExportState {
                    last_max_id: max_id,
                    export_date: options.now,
                })
                .context("committing export state")?;
        }

        let snapshot = metrics.snapshot();
        info!(
            "export complete: read {}, accepted {}, rejected {}, cells {}, records {}",
            snapshot.read,
            snapshot.accepted,
            snapshot.rejected_total(),
            snapshot.cells,
            snapshot.exported
        );

        Ok(RunReport {
            exported: true,
            previous_max_id: gate.stored_max_id(),
            max_id,
            records,
            metrics: snapshot,
        })
    }
}

/// Filter, reproject, bin and order; the pure part of a run.
pub fn compute_cells(
    config: &ExportConfig,
    rows: Vec<Measurement>,
    now: DateTime<Utc>,
    metrics: &Arc<MetricsRecorder>,
) -> anyhow::Result<Vec<GridCell>> {
    let clean = run_stage(&mut FilterStage::new(now, metrics.clone()), config, rows)?;
    let points = run_stage(&mut ReprojectStage::new(metrics.clone()), config, clean)?;
    let cells = run_stage(&mut BinningStage::new(metrics.clone()), config, points)?;
    run_stage(&mut ClusterStage::new(), config, cells)
}

fn run_stage<P: ProcessingStage>(
    stage: &mut P,
    config: &ExportConfig,
    input: P::Input,
) -> anyhow::Result<P::Output> {
    stage
        .initialize(config)
        .with_context(|| format!("initializing {} stage", stage.name()))?;
    let output = stage
        .execute(input)
        .with_context(|| format!("executing {} stage", stage.name()));
    stage.cleanup();
    output
}
