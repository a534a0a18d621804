//! RunState: the record threaded through one pipeline run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::collaborators::MemoryHit;
use crate::conflicts::Conflict;
use crate::task::{ScheduleSlot, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    ExtractTasks,
    Enrich,
    ProposeSchedule,
    DetectConflicts,
    RepairConflicts,
    Finalize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::ExtractTasks => "extract_tasks",
            Stage::Enrich => "enrich",
            Stage::ProposeSchedule => "propose_schedule",
            Stage::DetectConflicts => "detect_conflicts",
            Stage::RepairConflicts => "repair_conflicts",
            Stage::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Initialized,
    Success,
    Error,
}

/// What the caller hands to a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInput {
    pub raw_input: String,
    pub documents: Vec<PathBuf>,
    /// Reference date shown to the model as "today".
    pub today: NaiveDate,
}

impl RunInput {
    pub fn text(raw_input: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            raw_input: raw_input.into(),
            documents: Vec::new(),
            today,
        }
    }

    pub fn with_documents(mut self, documents: Vec<PathBuf>) -> Self {
        self.documents = documents;
        self
    }
}

/// Accumulated data and progress log for one run.
///
/// The message log only grows. Conflicts and the repair flag change together
/// through [`RunState::set_conflicts`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    pub raw_input: String,
    pub documents: Vec<PathBuf>,
    pub today: NaiveDate,

    messages: Vec<String>,
    pub stage: Stage,

    pub tasks: Vec<Task>,
    pub similar_past_tasks: Vec<MemoryHit>,
    pub recommended_time_slots: Vec<MemoryHit>,

    pub schedule: Vec<ScheduleSlot>,
    conflicts: Vec<Conflict>,
    needs_repair: bool,

    pub final_schedule: Option<String>,
    pub status: RunStatus,
}

impl RunState {
    pub fn new(input: RunInput) -> Self {
        let messages = vec![format!("State initialized for {}", input.today.format("%Y-%m-%d"))];
        Self {
            raw_input: input.raw_input,
            documents: input.documents,
            today: input.today,
            messages,
            stage: Stage::Start,
            tasks: Vec::new(),
            similar_past_tasks: Vec::new(),
            recommended_time_slots: Vec::new(),
            schedule: Vec::new(),
            conflicts: Vec::new(),
            needs_repair: false,
            final_schedule: None,
            status: RunStatus::Initialized,
        }
    }

    /// Append a progress message.
    pub fn log(&mut self, msg: impl Into<String>) {
        self.messages.push(msg.into());
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// True iff the cached conflict list is non-empty.
    pub fn needs_repair(&self) -> bool {
        self.needs_repair
    }

    /// Replace the cached conflicts; the repair flag follows.
    pub fn set_conflicts(&mut self, conflicts: Vec<Conflict>) {
        self.needs_repair = !conflicts.is_empty();
        self.conflicts = conflicts;
    }
}
