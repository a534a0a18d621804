//! studyplan-core: task extraction, scheduling and conflict repair for study plans

pub mod collaborators;
pub mod completion;
pub mod conflicts;
pub mod memory;
pub mod pipeline;
pub mod prompts;
pub mod repair;
pub mod task;
pub mod time;

pub use collaborators::{Completer, CompletionPurpose, MemoryHit, NoMemory, SimilarityMemory, TextExtractor};
pub use completion::{find_json_array, request_json_array, Completion, NoResult};
pub use conflicts::{detect, Conflict, ConflictDetector, DetectorConfig, OverlapMode};
pub use memory::{LocalMemory, MemoryRecord, SchedulePattern, TaskCompletion};
pub use pipeline::{next_stage, Pipeline, PipelineConfig, RunInput, RunState, RunStatus, Stage};
pub use repair::{Attempt, RepairConfig, RepairLoop, RepairPolicy, RepairReport, Repaired};
pub use task::{Priority, ScheduleSlot, Task, TaskId, TaskStatus};
pub use time::TimeRange;
