//! Schedule repair: ask the completer for a revised schedule, then check it.
//!
//! Each attempt sends the current schedule, the conflict list and the repair
//! rules. A candidate replaces the current schedule only if it
//! - parses as a slot array,
//! - is non-empty and still covers every task the current schedule covers,
//! - has strictly fewer conflicts when run back through the detector.
//!
//! Attempts stop when the schedule is clean or `max_attempts` is reached.
//! Nothing here returns an error; a failed attempt is recorded in the report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::collaborators::{Completer, CompletionPurpose};
use crate::completion::{request_json_array, Completion, NoResult};
use crate::conflicts::{Conflict, ConflictDetector};
use crate::prompts;
use crate::task::{ScheduleSlot, Task, TaskId};

/// Fixed rules sent with every repair request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairPolicy {
    /// Sessions longer than this (hours) should be split.
    pub split_threshold_hours: f64,
    /// Minimum break between consecutive slots on one date.
    pub min_gap_minutes: u32,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            split_threshold_hours: 3.0,
            min_gap_minutes: 15,
        }
    }
}

impl RepairPolicy {
    pub fn rules(&self) -> Vec<String> {
        vec![
            "For time overlaps: Shift one task to a different time slot".to_string(),
            "For deadline violations: Move task earlier to meet deadline".to_string(),
            format!(
                "For duration issues: Split sessions longer than {}h into multiple shorter sessions",
                crate::time::format_hours(self.split_threshold_hours)
            ),
            "Maintain task priorities (High priority gets better slots)".to_string(),
            format!(
                "Keep at least {}-min breaks between tasks on the same date",
                self.min_gap_minutes
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub max_attempts: u32,
    pub policy: RepairPolicy,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            policy: RepairPolicy::default(),
        }
    }
}

/// Outcome of one repair attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Accepted { remaining: usize },
    Rejected(NoResult),
}

/// An accepted, re-validated schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub schedule: Vec<ScheduleSlot>,
    /// Conflicts the detector still finds in `schedule` (empty when clean).
    pub conflicts: Vec<Conflict>,
}

impl Repaired {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RepairReport {
    pub attempts: Vec<Attempt>,
    pub repaired: Option<Repaired>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RepairLoop {
    config: RepairConfig,
    detector: ConflictDetector,
}

impl RepairLoop {
    pub fn new(config: RepairConfig, detector: ConflictDetector) -> Self {
        Self { config, detector }
    }

    /// Best accepted schedule, or `None` when no attempt improved on the input.
    pub fn repair<C: Completer + ?Sized>(
        &self,
        completer: &C,
        schedule: &[ScheduleSlot],
        conflicts: &[Conflict],
        tasks: &[Task],
    ) -> Option<Repaired> {
        self.run(completer, schedule, conflicts, tasks).repaired
    }

    /// Like [`RepairLoop::repair`], keeping the outcome of every attempt.
    pub fn run<C: Completer + ?Sized>(
        &self,
        completer: &C,
        schedule: &[ScheduleSlot],
        conflicts: &[Conflict],
        tasks: &[Task],
    ) -> RepairReport {
        let mut report = RepairReport::default();
        if conflicts.is_empty() || schedule.is_empty() {
            return report;
        }

        let mut current_schedule = schedule.to_vec();
        let mut current_conflicts = conflicts.to_vec();

        for n in 1..=self.config.max_attempts.max(1) {
            debug!(attempt = n, conflicts = current_conflicts.len(), "repair attempt");

            match self.attempt(completer, &current_schedule, &current_conflicts, tasks) {
                Completion::Value(accepted) => {
                    info!(attempt = n, remaining = accepted.conflicts.len(), "repair accepted");
                    report.attempts.push(Attempt::Accepted {
                        remaining: accepted.conflicts.len(),
                    });
                    current_schedule = accepted.schedule.clone();
                    current_conflicts = accepted.conflicts.clone();
                    let clean = accepted.is_clean();
                    report.repaired = Some(accepted);
                    if clean {
                        break;
                    }
                }
                Completion::NoResult(reason) => {
                    info!(attempt = n, %reason, "repair rejected");
                    report.attempts.push(Attempt::Rejected(reason));
                }
            }
        }

        report
    }

    fn attempt<C: Completer + ?Sized>(
        &self,
        completer: &C,
        schedule: &[ScheduleSlot],
        conflicts: &[Conflict],
        tasks: &[Task],
    ) -> Completion<Repaired> {
        let prompt = prompts::repair_prompt(schedule, conflicts, tasks, &self.config.policy);

        let values = match request_json_array(completer, CompletionPurpose::Repair, &prompt) {
            Completion::Value(v) => v,
            Completion::NoResult(r) => return Completion::NoResult(r),
        };

        let (mut candidate, _skipped) = ScheduleSlot::parse_many(values);
        if candidate.is_empty() {
            return Completion::NoResult(NoResult::EmptyCandidate);
        }
        for slot in candidate.iter_mut() {
            slot.resolve_task_id(tasks);
        }

        let dropped = dropped_tasks(schedule, &candidate);
        if !dropped.is_empty() {
            return Completion::NoResult(NoResult::DroppedTasks(dropped));
        }

        let after = self.detector.detect(&candidate, tasks);
        if after.len() >= conflicts.len() {
            return Completion::NoResult(NoResult::NotImproved {
                before: conflicts.len(),
                after: after.len(),
            });
        }

        Completion::Value(Repaired {
            schedule: candidate,
            conflicts: after,
        })
    }
}

/// Tasks covered by `before` but not by `after`, as sorted names.
///
/// Coverage is keyed by task id; slots without one are matched by name.
fn dropped_tasks(before: &[ScheduleSlot], after: &[ScheduleSlot]) -> Vec<String> {
    let kept_ids: BTreeSet<&TaskId> = after.iter().filter_map(|s| s.task_id.as_ref()).collect();
    let kept_names: BTreeSet<&str> = after.iter().map(|s| s.task_name.as_str()).collect();
    before
        .iter()
        .filter(|s| match &s.task_id {
            Some(id) => !kept_ids.contains(id),
            None => !kept_names.contains(s.task_name.as_str()),
        })
        .map(|s| s.task_name.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflicts::detect;
    use std::cell::RefCell;

    /// Replays canned replies in order and records prompts.
    struct Scripted {
        replies: RefCell<Vec<String>>,
        prompts: RefCell<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: RefCell::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl Completer for Scripted {
        fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.borrow_mut().push(prompt.to_string());
            Ok(self.replies.borrow_mut().pop().unwrap_or_default())
        }
    }

    fn tasks() -> Vec<Task> {
        vec![
            Task::new(TaskId::nth(1), "Essay").with_deadline("2026-01-20"),
            Task::new(TaskId::nth(2), "Lab").with_deadline("2026-01-22"),
        ]
    }

    fn overlapping() -> Vec<ScheduleSlot> {
        vec![
            ScheduleSlot::new("Essay", "2026-01-19", "09:00 - 11:00", 2.0),
            ScheduleSlot::new("Lab", "2026-01-19", "10:00 - 12:00", 2.0),
        ]
    }

    const CLEAN: &str = r#"Here you go:
[
  {"task_name": "Essay", "date": "2026-01-19", "time_slot": "09:00 - 11:00", "duration_hours": 2.0, "priority": "High"},
  {"task_name": "Lab", "date": "2026-01-19", "time_slot": "11:15 - 13:15", "duration_hours": 2.0, "priority": "Medium"}
]"#;

    #[test]
    fn non_json_reply_yields_none() {
        let schedule = overlapping();
        let conflicts = detect(&schedule, &tasks());
        let completer = Scripted::new(&["Sorry, I cannot do that."]);

        let looped = RepairLoop::new(
            RepairConfig {
                max_attempts: 1,
                ..Default::default()
            },
            ConflictDetector::default(),
        );
        let report = looped.run(&completer, &schedule, &conflicts, &tasks());

        assert!(report.repaired.is_none());
        assert_eq!(report.attempts, vec![Attempt::Rejected(NoResult::NoJsonArray)]);
    }

    #[test]
    fn clean_candidate_is_accepted_and_stops_early() {
        let schedule = overlapping();
        let conflicts = detect(&schedule, &tasks());
        let completer = Scripted::new(&[CLEAN, CLEAN]);

        let report = RepairLoop::default().run(&completer, &schedule, &conflicts, &tasks());

        let repaired = report.repaired.unwrap();
        assert!(repaired.is_clean());
        assert_eq!(repaired.schedule[1].time_slot, "11:15 - 13:15");
        assert_eq!(repaired.schedule[1].task_id, Some(TaskId::nth(2)));
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(completer.prompts.borrow().len(), 1);
    }

    #[test]
    fn prompt_carries_schedule_conflicts_and_rules() {
        let schedule = overlapping();
        let conflicts = detect(&schedule, &tasks());
        let completer = Scripted::new(&[CLEAN]);

        RepairLoop::default().repair(&completer, &schedule, &conflicts, &tasks());

        let prompt = completer.prompts.borrow()[0].clone();
        assert!(prompt.contains("CURRENT SCHEDULE:"));
        assert!(prompt.contains("\"time_slot\": \"10:00 - 12:00\""));
        assert!(prompt.contains("- Overlap on 2026-01-19: Essay (09:00 - 11:00) and Lab (10:00 - 12:00)"));
        assert!(prompt.contains("Split sessions longer than 3.0h"));
        assert!(prompt.contains("15-min breaks"));
    }

    #[test]
    fn candidates_that_do_not_help_are_rejected() {
        let schedule = overlapping();
        let conflicts = detect(&schedule, &tasks());
        let same = r#"[{"task_name": "Essay", "date": "2026-01-19", "time_slot": "09:00 - 11:00", "duration_hours": 2.0},
                       {"task_name": "Lab", "date": "2026-01-19", "time_slot": "10:30 - 12:00", "duration_hours": 1.5}]"#;
        let dropped = r#"[{"task_name": "Essay", "date": "2026-01-19", "time_slot": "09:00 - 11:00", "duration_hours": 2.0}]"#;
        let completer = Scripted::new(&[same, dropped, "[]"]);

        let report = RepairLoop::default().run(&completer, &schedule, &conflicts, &tasks());

        assert!(report.repaired.is_none());
        assert_eq!(
            report.attempts,
            vec![
                Attempt::Rejected(NoResult::NotImproved { before: 1, after: 1 }),
                Attempt::Rejected(NoResult::DroppedTasks(vec!["Lab".to_string()])),
                Attempt::Rejected(NoResult::EmptyCandidate),
            ]
        );
    }

    #[test]
    fn partial_improvement_is_kept_while_retrying() {
        let tasks = tasks();
        let schedule = vec![
            ScheduleSlot::new("Essay", "2026-01-21", "09:00 - 15:00", 6.0),
            ScheduleSlot::new("Lab", "2026-01-21", "14:00 - 15:00", 1.0),
        ];
        let conflicts = detect(&schedule, &tasks);
        assert_eq!(conflicts.len(), 3);

        // Fixes the overlap and the length but leaves Essay late.
        let partial = r#"[{"task_name": "Essay", "date": "2026-01-21", "time_slot": "09:00 - 12:00", "duration_hours": 3.0},
                          {"task_name": "Lab", "date": "2026-01-21", "time_slot": "14:00 - 15:00", "duration_hours": 1.0}]"#;
        let completer = Scripted::new(&[partial, "no idea"]);

        let report = RepairLoop::new(
            RepairConfig {
                max_attempts: 2,
                ..Default::default()
            },
            ConflictDetector::default(),
        )
        .run(&completer, &schedule, &conflicts, &tasks);

        let repaired = report.repaired.unwrap();
        assert_eq!(repaired.conflicts.len(), 1);
        assert!(matches!(repaired.conflicts[0], Conflict::DeadlineViolation { .. }));
        assert_eq!(report.attempts.len(), 2);
    }

    #[test]
    fn nothing_to_repair_makes_no_calls() {
        let completer = Scripted::new(&[CLEAN]);
        let report = RepairLoop::default().run(&completer, &overlapping(), &[], &tasks());
        assert!(report.attempts.is_empty());
        assert!(completer.prompts.borrow().is_empty());
    }

    #[test]
    fn split_sessions_keep_their_task_id() {
        let tasks = tasks();
        let schedule = vec![
            ScheduleSlot::new("Essay", "2026-01-19", "09:00 - 11:00", 2.0).with_task_id(TaskId::nth(1)),
            ScheduleSlot::new("Lab", "2026-01-19", "10:00 - 12:00", 2.0).with_task_id(TaskId::nth(2)),
        ];
        let conflicts = detect(&schedule, &tasks);
        let split = r#"[
  {"task_id": "task-1", "task_name": "Essay (part 1)", "date": "2026-01-18", "time_slot": "09:00 - 10:00", "duration_hours": 1.0},
  {"task_id": "task-1", "task_name": "Essay (part 2)", "date": "2026-01-19", "time_slot": "08:00 - 09:00", "duration_hours": 1.0, "priority": null},
  {"task_id": "task-2", "task_name": "Lab", "date": "2026-01-19", "time_slot": "10:00 - 12:00", "duration_hours": "2"}
]"#;
        let completer = Scripted::new(&[split]);

        let report = RepairLoop::default().run(&completer, &schedule, &conflicts, &tasks);

        assert_eq!(report.attempts, vec![Attempt::Accepted { remaining: 0 }]);
        assert_eq!(report.repaired.unwrap().schedule.len(), 3);
    }

    #[test]
    fn renamed_slot_without_id_counts_as_dropped() {
        let before = vec![ScheduleSlot::new("Essay", "2026-01-19", "09:00 - 11:00", 2.0)];
        let after = vec![ScheduleSlot::new("Essay draft", "2026-01-19", "09:00 - 11:00", 2.0)];
        assert_eq!(dropped_tasks(&before, &after), vec!["Essay".to_string()]);

        let before = vec![before[0].clone().with_task_id(TaskId::nth(1))];
        let after = vec![after[0].clone().with_task_id(TaskId::nth(1))];
        assert!(dropped_tasks(&before, &after).is_empty());
    }
}
