use crate::state::ExportState;

/// Decides whether the source changed since the last successful export.
///
/// Measurement ids only grow, so a larger maximum id than the checkpoint is
/// the whole change signal. A positive answer means the full dataset is
/// recomputed, not just the new rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeGate {
    stored_max_id: i64,
    current_max_id: i64,
}

impl ChangeGate {
    pub fn new(state: Option<&ExportState>, current_max_id: Option<i64>) -> Self {
        Self {
            stored_max_id: state.map_or(0, |state| state.last_max_id),
            current_max_id: current_max_id.unwrap_or(0),
        }
    }

    pub fn should_run(&self) -> bool {
        self.current_max_id > self.stored_max_id
    }

    pub fn current_max_id(&self) -> i64 {
        self.current_max_id
    }

    pub fn stored_max_id(&self) -> i64 {
        self.stored_max_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn state(last_max_id: i64) -> ExportState {
        ExportState {
            last_max_id,
            export_date: Utc::now(),
        }
    }

    #[test]
    fn first_run_with_data_proceeds() {
        let gate = ChangeGate::new(None, Some(10));
        assert!(gate.should_run());
        assert_eq!(gate.stored_max_id(), 0);
        assert_eq!(gate.current_max_id(), 10);
    }

    #[test]
    fn empty_source_never_runs() {
        assert!(!ChangeGate::new(None, None).should_run());
    }

    #[test]
    fn unchanged_source_is_skipped() {
        assert!(!ChangeGate::new(Some(&state(10)), Some(10)).should_run());
        assert!(!ChangeGate::new(Some(&state(12)), Some(10)).should_run());
        assert!(ChangeGate::new(Some(&state(10)), Some(11)).should_run());
    }
}
