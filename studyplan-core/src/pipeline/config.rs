use serde::{Deserialize, Serialize};

use crate::conflicts::DetectorConfig;
use crate::repair::RepairConfig;

/// Tunables for one pipeline. Every field has a default, so a partial TOML
/// table is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detector: DetectorConfig,
    pub repair: RepairConfig,
    /// Past tasks retrieved per extracted task.
    pub similar_tasks_k: usize,
    /// Productivity patterns retrieved for the schedule prompt.
    pub time_slots_k: usize,
    pub time_slot_query: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            repair: RepairConfig::default(),
            similar_tasks_k: 2,
            time_slots_k: 3,
            time_slot_query: "Productive time for study tasks".to_string(),
        }
    }
}
