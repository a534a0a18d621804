//! Pipeline orchestration.
//!
//! ```text
//! extract_tasks -> enrich -> propose_schedule -> detect_conflicts
//!     -> [needs_repair ? repair_conflicts] -> finalize -> END
//! ```
//!
//! Each stage takes a [`RunState`] by value and returns the next one. Stages
//! run strictly in sequence; independent runs may proceed in parallel as long
//! as each owns its state. Stage failures become log messages, so a run always
//! reaches `finalize`.

mod config;
mod stages;
mod state;

pub use config::PipelineConfig;
pub use state::{RunInput, RunState, RunStatus, Stage};

use tracing::info;

use crate::collaborators::{Completer, SimilarityMemory, TextExtractor};
use crate::conflicts::ConflictDetector;
use crate::repair::RepairLoop;

/// The stage to run after the one recorded in `state`, or `None` when done.
pub fn next_stage(state: &RunState) -> Option<Stage> {
    match state.stage {
        Stage::Start => Some(Stage::ExtractTasks),
        Stage::ExtractTasks => Some(Stage::Enrich),
        Stage::Enrich => Some(Stage::ProposeSchedule),
        Stage::ProposeSchedule => Some(Stage::DetectConflicts),
        Stage::DetectConflicts if state.needs_repair() => Some(Stage::RepairConflicts),
        Stage::DetectConflicts => Some(Stage::Finalize),
        Stage::RepairConflicts => Some(Stage::Finalize),
        Stage::Finalize => None,
    }
}

/// Stage sequencer with its collaborators injected at construction.
#[derive(Debug, Clone)]
pub struct Pipeline<X, C, M> {
    extractor: X,
    completer: C,
    memory: M,
    config: PipelineConfig,
    detector: ConflictDetector,
    repair: RepairLoop,
}

impl<X, C, M> Pipeline<X, C, M>
where
    X: TextExtractor,
    C: Completer,
    M: SimilarityMemory,
{
    pub fn new(extractor: X, completer: C, memory: M, config: PipelineConfig) -> Self {
        let detector = ConflictDetector::new(config.detector);
        let repair = RepairLoop::new(config.repair, detector);
        Self {
            extractor,
            completer,
            memory,
            config,
            detector,
            repair,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage from a fresh state to the end.
    pub fn run(&self, input: RunInput) -> RunState {
        let mut state = RunState::new(input);
        while let Some(stage) = next_stage(&state) {
            state = self.run_stage(stage, state);
        }
        info!(
            status = ?state.status,
            slots = state.schedule.len(),
            conflicts = state.conflicts().len(),
            "pipeline finished"
        );
        state
    }

    /// Run a single stage on `state`.
    pub fn run_stage(&self, stage: Stage, state: RunState) -> RunState {
        info!(%stage, "running stage");
        match stage {
            // Start only marks a fresh state.
            Stage::Start => state,
            Stage::ExtractTasks => self.extract_tasks(state),
            Stage::Enrich => self.enrich(state),
            Stage::ProposeSchedule => self.propose_schedule(state),
            Stage::DetectConflicts => self.detect_conflicts(state),
            Stage::RepairConflicts => self.repair_conflicts(state),
            Stage::Finalize => self.finalize(state),
        }
    }
}
