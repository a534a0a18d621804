//! Conflict detection over a proposed schedule.
//!
//! Detection is pure and total: slots whose dates or time ranges do not parse
//! are left out of the checks that need them, never reported as errors.
//!
//! Output order is fixed: overlaps, then deadline violations, then duration
//! issues, each in detection order. Users and the repair prompt both see this
//! order, so it must not depend on hashing or timing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::task::{ScheduleSlot, Task, TaskId};
use crate::time::{format_hours, parse_iso_date, TimeRange};

/// Longest single session (hours) accepted before flagging a duration issue.
pub const DEFAULT_DURATION_CEILING_HOURS: f64 = 5.0;

/// A structural defect in a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    /// Two slots on the same date whose time ranges intersect.
    Overlap {
        slot_a: ScheduleSlot,
        slot_b: ScheduleSlot,
    },
    /// A slot dated after its task's deadline.
    DeadlineViolation {
        task_id: Option<TaskId>,
        task_name: String,
        scheduled_date: String,
        deadline: String,
    },
    /// A slot longer than the configured ceiling.
    DurationIssue {
        task_id: Option<TaskId>,
        task_name: String,
        hours: f64,
    },
}

impl Conflict {
    /// Names of the tasks this conflict involves.
    pub fn task_names(&self) -> Vec<&str> {
        match self {
            Conflict::Overlap { slot_a, slot_b } => {
                vec![slot_a.task_name.as_str(), slot_b.task_name.as_str()]
            }
            Conflict::DeadlineViolation { task_name, .. } | Conflict::DurationIssue { task_name, .. } => {
                vec![task_name.as_str()]
            }
        }
    }

    /// Each involved task as `(id, name)`; the name is only a fallback key
    /// when `id` is `None`.
    pub fn involved(&self) -> Vec<(Option<&TaskId>, &str)> {
        match self {
            Conflict::Overlap { slot_a, slot_b } => vec![
                (slot_a.task_id.as_ref(), slot_a.task_name.as_str()),
                (slot_b.task_id.as_ref(), slot_b.task_name.as_str()),
            ],
            Conflict::DeadlineViolation { task_id, task_name, .. }
            | Conflict::DurationIssue { task_id, task_name, .. } => {
                vec![(task_id.as_ref(), task_name.as_str())]
            }
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::Overlap { slot_a, slot_b } => write!(
                f,
                "Overlap on {}: {} ({}) and {} ({})",
                slot_a.date, slot_a.task_name, slot_a.time_slot, slot_b.task_name, slot_b.time_slot
            ),
            Conflict::DeadlineViolation {
                task_name,
                scheduled_date,
                deadline,
                ..
            } => write!(
                f,
                "Deadline violation: {task_name} scheduled on {scheduled_date} but due on {deadline}"
            ),
            Conflict::DurationIssue { task_name, hours, .. } => write!(
                f,
                "Duration issue: {task_name} scheduled for {}h (consider breaking into smaller sessions)",
                format_hours(*hours)
            ),
        }
    }
}

/// How same-day overlaps are searched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapMode {
    /// Compare only neighbours in `(date, start)` order. A long slot that
    /// spans several later slots is reported against its first neighbour only.
    #[default]
    AdjacentSweep,
    /// Keep every still-open interval of the day and report every
    /// intersecting pair.
    ActiveSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub duration_ceiling_hours: f64,
    pub overlap_mode: OverlapMode,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            duration_ceiling_hours: DEFAULT_DURATION_CEILING_HOURS,
            overlap_mode: OverlapMode::AdjacentSweep,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector {
    config: DetectorConfig,
}

impl ConflictDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn detect(&self, schedule: &[ScheduleSlot], tasks: &[Task]) -> Vec<Conflict> {
        let mut out = match self.config.overlap_mode {
            OverlapMode::AdjacentSweep => adjacent_overlaps(schedule),
            OverlapMode::ActiveSet => active_set_overlaps(schedule),
        };
        out.extend(deadline_violations(schedule, tasks));
        out.extend(duration_issues(schedule, self.config.duration_ceiling_hours));
        out
    }
}

/// Detect conflicts with the default configuration.
pub fn detect(schedule: &[ScheduleSlot], tasks: &[Task]) -> Vec<Conflict> {
    ConflictDetector::default().detect(schedule, tasks)
}

/// Slot indices in `(date, start)` order; ties keep input order.
///
/// Slots whose range does not parse sort by their raw `time_slot` text.
fn sweep_order(schedule: &[ScheduleSlot]) -> Vec<usize> {
    let keys: Vec<String> = schedule
        .iter()
        .map(|s| match s.time_range() {
            Some(r) => r.start_label(),
            None => s.time_slot.clone(),
        })
        .collect();

    let mut order: Vec<usize> = (0..schedule.len()).collect();
    order.sort_by(|&a, &b| {
        schedule[a]
            .date
            .cmp(&schedule[b].date)
            .then_with(|| keys[a].cmp(&keys[b]))
    });
    order
}

fn overlap(a: &ScheduleSlot, b: &ScheduleSlot) -> Conflict {
    Conflict::Overlap {
        slot_a: a.clone(),
        slot_b: b.clone(),
    }
}

fn adjacent_overlaps(schedule: &[ScheduleSlot]) -> Vec<Conflict> {
    let order = sweep_order(schedule);
    let mut out = Vec::new();

    for pair in order.windows(2) {
        let (cur, next) = (&schedule[pair[0]], &schedule[pair[1]]);
        if cur.date != next.date {
            continue;
        }
        let (Some(a), Some(b)) = (cur.time_range(), next.time_range()) else {
            continue;
        };
        if a.end > b.start {
            out.push(overlap(cur, next));
        }
    }

    out
}

fn active_set_overlaps(schedule: &[ScheduleSlot]) -> Vec<Conflict> {
    let order = sweep_order(schedule);
    let mut out = Vec::new();

    let mut day: Option<&str> = None;
    let mut active: Vec<(usize, TimeRange)> = Vec::new();

    for idx in order {
        let slot = &schedule[idx];
        let Some(range) = slot.time_range() else {
            continue;
        };

        if day != Some(slot.date.as_str()) {
            day = Some(slot.date.as_str());
            active.clear();
        }

        active.retain(|(_, open)| open.end > range.start);
        for (open_idx, _) in &active {
            out.push(overlap(&schedule[*open_idx], slot));
        }
        active.push((idx, range));
    }

    out
}

fn deadline_violations(schedule: &[ScheduleSlot], tasks: &[Task]) -> Vec<Conflict> {
    let mut by_id: HashMap<&TaskId, &Task> = HashMap::new();
    let mut by_name: HashMap<&str, &Task> = HashMap::new();
    for t in tasks {
        by_id.entry(&t.id).or_insert(t);
        by_name.entry(t.name.as_str()).or_insert(t);
    }

    let mut out = Vec::new();
    for slot in schedule {
        let task = slot
            .task_id
            .as_ref()
            .and_then(|id| by_id.get(id))
            .or_else(|| by_name.get(slot.task_name.as_str()));
        let Some(task) = task else { continue };

        // "Not specified" and other non-dates fall out here.
        let (Some(scheduled), Some(due)) = (parse_iso_date(&slot.date), task.deadline_date()) else {
            continue;
        };

        if scheduled > due {
            out.push(Conflict::DeadlineViolation {
                task_id: Some(task.id.clone()),
                task_name: slot.task_name.clone(),
                scheduled_date: slot.date.clone(),
                deadline: task.deadline.clone(),
            });
        }
    }
    out
}

fn duration_issues(schedule: &[ScheduleSlot], ceiling: f64) -> Vec<Conflict> {
    schedule
        .iter()
        .filter(|s| s.duration_hours > ceiling)
        .map(|s| Conflict::DurationIssue {
            task_id: s.task_id.clone(),
            task_name: s.task_name.clone(),
            hours: s.duration_hours,
        })
        .collect()
}
