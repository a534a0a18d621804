use std::collections::HashSet;
use tracing::{debug, warn};

use super::{Pipeline, RunState, RunStatus, Stage};
use crate::collaborators::{Completer, CompletionPurpose, SimilarityMemory, TextExtractor};
use crate::completion::{request_json_array, Completion};
use crate::prompts;
use crate::repair::Attempt;
use crate::task::{ScheduleSlot, Task, TaskId, TaskStatus};
use crate::time::format_hours;

/// Rounded to one decimal place.
fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn placed_ids(schedule: &[ScheduleSlot]) -> HashSet<TaskId> {
    schedule.iter().filter_map(|s| s.task_id.clone()).collect()
}

impl<X, C, M> Pipeline<X, C, M>
where
    X: TextExtractor,
    C: Completer,
    M: SimilarityMemory,
{
    pub fn extract_tasks(&self, mut state: RunState) -> RunState {
        state.log("Task Extractor: Starting extraction...");
        state.stage = Stage::ExtractTasks;

        let mut all_text = String::new();

        if !state.raw_input.trim().is_empty() {
            all_text.push_str(&state.raw_input);
            all_text.push_str("\n\n");
            let chars = state.raw_input.chars().count();
            state.log(format!("Processing text input ({chars} chars)"));
        }

        let documents = state.documents.clone();
        if !documents.is_empty() {
            let total = documents.len();
            state.log(format!("Processing {total} uploaded file(s)..."));

            for (idx, path) in documents.iter().enumerate() {
                if !path.exists() {
                    state.log(format!("File not found: {}", path.display()));
                    continue;
                }
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                state.log(format!("[{}/{total}] Processing {name}...", idx + 1));

                let text = self.extractor.extract_text(path);
                if text.trim().is_empty() {
                    warn!(file = %path.display(), "no text extracted");
                    state.log(format!("   No text extracted from {name}, skipping"));
                    continue;
                }
                all_text.push_str(&format!("\n\n--- Content from {name} ---\n\n{text}\n\n"));
            }
        }

        if all_text.trim().is_empty() {
            state.log("No content to process");
            state.status = RunStatus::Error;
            return state;
        }

        state.log(format!(
            "Analyzing {} characters of content...",
            all_text.chars().count()
        ));

        match request_json_array(
            &self.completer,
            CompletionPurpose::Extract,
            &prompts::extraction_prompt(&all_text),
        ) {
            Completion::Value(items) => {
                let mut tasks: Vec<Task> = Vec::with_capacity(items.len());
                let mut skipped = 0;
                for item in &items {
                    match Task::from_extracted(tasks.len() + 1, item) {
                        Some(t) => tasks.push(t),
                        None => skipped += 1,
                    }
                }

                state.log(format!("Extracted {} task(s)", tasks.len()));
                for (i, t) in tasks.iter().enumerate() {
                    state.log(format!(
                        "   {}. {} - Due: {} ({}h, {})",
                        i + 1,
                        t.name,
                        t.deadline,
                        format_hours(t.estimated_hours),
                        t.priority
                    ));
                }
                if skipped > 0 {
                    state.log(format!("   Skipped {skipped} malformed task(s)"));
                }
                state.tasks = tasks;
            }
            Completion::NoResult(reason) => {
                state.log(format!("Task extraction returned nothing: {reason}"));
                state.tasks = Vec::new();
            }
        }

        state
    }

    pub fn enrich(&self, mut state: RunState) -> RunState {
        state.log("Enrichment: Analyzing past patterns...");
        state.stage = Stage::Enrich;

        if state.tasks.is_empty() {
            state.log("No tasks to enrich");
            return state;
        }

        let mut similar_all = Vec::new();
        let mut adjustments = Vec::new();

        for task in state.tasks.iter_mut() {
            let query = format!("{} {}", task.name, task.course.as_deref().unwrap_or(""));
            let hits = self
                .memory
                .retrieve_similar(query.trim(), self.config.similar_tasks_k);
            if hits.is_empty() {
                continue;
            }

            let avg_actual =
                hits.iter().map(|h| h.metadata_f64("actual_hours").unwrap_or(0.0)).sum::<f64>() / hits.len() as f64;
            if avg_actual > 0.0 {
                let adjusted = round1((task.estimated_hours + avg_actual) / 2.0);
                debug!(task = %task.name, from = task.estimated_hours, to = adjusted, "estimate blended");
                task.estimated_hours = adjusted;
                adjustments.push(format!(
                    "   Adjusted {}: {}h (based on similar tasks)",
                    task.name,
                    format_hours(adjusted)
                ));
            }
            similar_all.extend(hits);
        }

        for line in adjustments {
            state.log(line);
        }

        state.recommended_time_slots = self
            .memory
            .retrieve_similar(&self.config.time_slot_query, self.config.time_slots_k);
        state.log(format!(
            "Enrichment complete with {} similar task(s)",
            similar_all.len()
        ));
        state.similar_past_tasks = similar_all;

        state
    }

    pub fn propose_schedule(&self, mut state: RunState) -> RunState {
        state.log("Scheduler: Creating optimal timetable...");
        state.stage = Stage::ProposeSchedule;

        if state.tasks.is_empty() {
            state.log("No tasks to schedule");
            return state;
        }

        let prompt = prompts::schedule_prompt(
            &state.tasks,
            &state.recommended_time_slots,
            &state.similar_past_tasks,
            &self.config.repair.policy,
            state.today,
        );

        let values = match request_json_array(&self.completer, CompletionPurpose::Schedule, &prompt) {
            Completion::Value(v) => v,
            Completion::NoResult(reason) => {
                state.log(format!("Failed to parse schedule from LLM: {reason}"));
                state.schedule = Vec::new();
                return state;
            }
        };

        let (mut slots, skipped) = ScheduleSlot::parse_many(values);
        for slot in slots.iter_mut() {
            slot.resolve_task_id(&state.tasks);
            if let Some(span) = slot.span_hours() {
                if (span - slot.duration_hours).abs() > 0.25 {
                    debug!(
                        task = %slot.task_name,
                        span,
                        reported = slot.duration_hours,
                        "slot duration disagrees with its time range"
                    );
                }
            }
        }

        state.log(format!("Created schedule with {} time slot(s)", slots.len()));
        if skipped > 0 {
            state.log(format!("   Skipped {skipped} malformed slot(s)"));
        }
        for (i, slot) in slots.iter().enumerate() {
            state.log(format!(
                "   {}. {} {}: {}",
                i + 1,
                slot.date,
                slot.time_slot,
                slot.task_name
            ));
        }

        let placed = placed_ids(&slots);
        let mut unplaced = Vec::new();
        for task in state.tasks.iter_mut() {
            if placed.contains(&task.id) {
                task.advance(TaskStatus::Scheduled);
            } else {
                unplaced.push(task.name.clone());
            }
        }
        for name in unplaced {
            state.log(format!("   Not placed: {name}"));
        }

        state.schedule = slots;
        state
    }

    pub fn detect_conflicts(&self, mut state: RunState) -> RunState {
        state.log("Conflict Checker: Analyzing schedule for conflicts...");
        state.stage = Stage::DetectConflicts;

        if state.schedule.is_empty() {
            state.log("   No schedule to check");
            state.set_conflicts(Vec::new());
            return state;
        }

        let conflicts = self.detector.detect(&state.schedule, &state.tasks);
        if conflicts.is_empty() {
            state.log("No conflicts detected");
        } else {
            state.log(format!("Found {} conflict(s):", conflicts.len()));
            for c in &conflicts {
                state.log(format!("      - {c}"));
            }
        }
        state.set_conflicts(conflicts);

        state
    }

    pub fn repair_conflicts(&self, mut state: RunState) -> RunState {
        state.log("Conflict Resolver: Fixing conflicts...");
        state.stage = Stage::RepairConflicts;

        if state.conflicts().is_empty() || state.schedule.is_empty() {
            state.log("   Nothing to resolve");
            return state;
        }

        let report = self
            .repair
            .run(&self.completer, &state.schedule, state.conflicts(), &state.tasks);

        for (i, attempt) in report.attempts.iter().enumerate() {
            let line = match attempt {
                Attempt::Accepted { remaining } => {
                    format!("   Attempt {}: accepted, {remaining} conflict(s) remain", i + 1)
                }
                Attempt::Rejected(reason) => format!("   Attempt {}: rejected ({reason})", i + 1),
            };
            state.log(line);
        }

        match report.repaired {
            Some(repaired) => {
                let remaining = repaired.conflicts.len();
                state.schedule = repaired.schedule;
                state.set_conflicts(repaired.conflicts);
                if remaining == 0 {
                    state.log("Resolved conflicts, updated schedule");
                } else {
                    state.log(format!("Partially resolved conflicts, {remaining} remain"));
                }

                let placed = placed_ids(&state.schedule);
                for task in state.tasks.iter_mut() {
                    if placed.contains(&task.id) {
                        task.advance(TaskStatus::Scheduled);
                    }
                }
            }
            None => state.log("Could not fully resolve conflicts"),
        }

        let mut involved_ids: HashSet<TaskId> = HashSet::new();
        let mut involved_names: HashSet<String> = HashSet::new();
        for c in state.conflicts() {
            for (id, name) in c.involved() {
                match id {
                    Some(id) => {
                        involved_ids.insert(id.clone());
                    }
                    None => {
                        involved_names.insert(name.to_string());
                    }
                }
            }
        }
        let mut marked = Vec::new();
        for task in state.tasks.iter_mut() {
            let involved = involved_ids.contains(&task.id) || involved_names.contains(&task.name);
            if involved && task.status != TaskStatus::Conflicted && task.advance(TaskStatus::Conflicted) {
                marked.push(task.name.clone());
            }
        }
        for name in marked {
            state.log(format!("   Marked conflicted: {name}"));
        }

        state
    }

    pub fn finalize(&self, mut state: RunState) -> RunState {
        state.log("Finalizing schedule...");
        state.stage = Stage::Finalize;
        state.status = RunStatus::Success;

        if state.schedule.is_empty() {
            state.log("No schedule to display");
            return state;
        }

        let mut formatted = String::from("**Your Schedule:**\n\n");
        for slot in &state.schedule {
            formatted.push_str(&format!(
                "• {} {}: {} ({}h)\n",
                slot.date,
                slot.time_slot,
                slot.task_name,
                format_hours(slot.duration_hours)
            ));
        }

        if !state.conflicts().is_empty() {
            formatted.push_str("\n**Unresolved conflicts:**\n\n");
            for c in state.conflicts() {
                formatted.push_str(&format!("- {c}\n"));
            }
        }

        state.final_schedule = Some(formatted);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MemoryHit, NoMemory};
    use crate::conflicts::Conflict;
    use crate::memory::LocalMemory;
    use crate::pipeline::{next_stage, PipelineConfig, RunInput};
    use crate::task::Priority;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    struct NoExtractor;
    impl TextExtractor for NoExtractor {
        fn extract_text(&self, _document: &Path) -> String {
            String::new()
        }
    }

    struct Scripted(RefCell<Vec<String>>);
    impl Scripted {
        fn new(replies: &[&str]) -> Self {
            Self(RefCell::new(replies.iter().rev().map(|s| s.to_string()).collect()))
        }
    }
    impl Completer for Scripted {
        fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.borrow_mut().pop().unwrap_or_default())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 18).unwrap()
    }

    fn fixture() -> RunState {
        let mut s = RunState::new(RunInput::text("", today()));
        s.tasks = vec![
            Task::new(TaskId::nth(1), "Essay")
                .with_deadline("2026-01-20")
                .with_hours(3.0)
                .with_priority(Priority::High),
            Task::new(TaskId::nth(2), "Lab").with_deadline("2026-01-22"),
        ];
        s
    }

    fn pipeline(replies: &[&str]) -> Pipeline<NoExtractor, Scripted, NoMemory> {
        Pipeline::new(NoExtractor, Scripted::new(replies), NoMemory, PipelineConfig::default())
    }

    #[test]
    fn next_stage_branches_on_repair_flag() {
        let mut s = fixture();
        s.stage = Stage::DetectConflicts;
        assert_eq!(next_stage(&s), Some(Stage::Finalize));

        s.set_conflicts(vec![Conflict::DurationIssue {
            task_id: None,
            task_name: "Essay".into(),
            hours: 6.0,
        }]);
        assert_eq!(next_stage(&s), Some(Stage::RepairConflicts));

        s.stage = Stage::RepairConflicts;
        assert_eq!(next_stage(&s), Some(Stage::Finalize));
        s.stage = Stage::Finalize;
        assert_eq!(next_stage(&s), None);
    }

    #[test]
    fn extract_without_content_marks_error() {
        let p = pipeline(&[]);
        let s = p.extract_tasks(RunState::new(RunInput::text("   ", today())));
        assert_eq!(s.status, RunStatus::Error);
        assert_eq!(s.messages().last().map(String::as_str), Some("No content to process"));
    }

    #[test]
    fn extract_reports_missing_files_and_uses_text() {
        let p = pipeline(&[r#"[{"task_name": "Essay", "deadline": "2026-01-20", "estimated_hours": 3, "priority": "High"}, "junk"]"#]);
        let input = RunInput::text("Essay due Jan 20", today())
            .with_documents(vec![PathBuf::from("/definitely/not/here.pdf")]);

        let s = p.extract_tasks(RunState::new(input));

        assert!(s.messages().iter().any(|m| m == "File not found: /definitely/not/here.pdf"));
        assert_eq!(s.tasks.len(), 1);
        assert_eq!(s.tasks[0].id, TaskId::nth(1));
        assert!(s.messages().iter().any(|m| m == "   1. Essay - Due: 2026-01-20 (3.0h, High)"));
        assert!(s.messages().iter().any(|m| m.contains("Skipped 1 malformed")));
        assert_eq!(s.status, RunStatus::Initialized);
    }

    #[test]
    fn enrich_blends_estimates_with_history() {
        let mut memory = LocalMemory::new();
        let mut meta = serde_json::Map::new();
        meta.insert("task_name".into(), json!("Essay draft"));
        meta.insert("actual_hours".into(), json!(5.0));
        memory.add("Task: Essay draft", meta);

        let p = Pipeline::new(NoExtractor, Scripted::new(&[]), memory, PipelineConfig::default());
        let s = p.enrich(fixture());

        // Essay: (3 + 5) / 2; Lab also hits the single record at score 0.
        assert_eq!(s.tasks[0].estimated_hours, 4.0);
        assert_eq!(s.tasks[1].estimated_hours, 3.5);
        assert!(s.messages().iter().any(|m| m == "   Adjusted Essay: 4.0h (based on similar tasks)"));
        assert_eq!(s.similar_past_tasks.len(), 2);
        assert_eq!(s.recommended_time_slots.len(), 1);
    }

    #[test]
    fn enrich_without_history_changes_nothing() {
        let p = pipeline(&[]);
        let before = fixture();
        let after = p.enrich(before.clone());
        assert_eq!(after.tasks, before.tasks);
        assert!(after.similar_past_tasks.is_empty());
    }

    #[test]
    fn propose_marks_placed_tasks_scheduled() {
        let p = pipeline(&[r#"[{"task_id": "task-1", "task_name": "Essay", "date": "2026-01-19", "time_slot": "09:00 - 12:00", "duration_hours": 3.0, "priority": "High"}]"#]);
        let s = p.propose_schedule(fixture());

        assert_eq!(s.schedule.len(), 1);
        assert_eq!(s.tasks[0].status, TaskStatus::Scheduled);
        assert_eq!(s.tasks[1].status, TaskStatus::Pending);
        assert!(s.messages().iter().any(|m| m == "   Not placed: Lab"));
    }

    #[test]
    fn propose_with_unparsable_reply_leaves_empty_schedule() {
        let p = pipeline(&["I would suggest studying in the morning."]);
        let s = p.propose_schedule(fixture());
        assert!(s.schedule.is_empty());
        assert!(s.messages().iter().any(|m| m.starts_with("Failed to parse schedule from LLM")));
        assert!(s.tasks.iter().all(|t| t.status == TaskStatus::Pending));
    }

    #[test]
    fn conflicted_marking_follows_task_ids_not_shared_names() {
        let p = pipeline(&["no schedule for you"]);
        let mut s = RunState::new(RunInput::text("", today()));
        s.tasks = vec![
            Task::new(TaskId::nth(1), "Reading").with_deadline("2026-01-30"),
            Task::new(TaskId::nth(2), "Reading").with_deadline("2026-01-10"),
        ];
        s.schedule = vec![
            ScheduleSlot::new("Reading", "2026-01-09", "09:00 - 10:00", 1.0).with_task_id(TaskId::nth(1)),
            ScheduleSlot::new("Reading", "2026-01-20", "09:00 - 10:00", 1.0).with_task_id(TaskId::nth(2)),
        ];
        for t in s.tasks.iter_mut() {
            t.advance(TaskStatus::Scheduled);
        }

        let s = p.detect_conflicts(s);
        assert_eq!(s.conflicts().len(), 1);
        let s = p.repair_conflicts(s);

        let statuses: Vec<(&str, TaskStatus)> = s.tasks.iter().map(|t| (t.id.as_str(), t.status)).collect();
        assert_eq!(
            statuses,
            vec![("task-1", TaskStatus::Scheduled), ("task-2", TaskStatus::Conflicted)]
        );
    }

    #[test]
    fn conflicts_without_ids_fall_back_to_names() {
        let p = pipeline(&[]);
        let mut s = fixture();
        for t in s.tasks.iter_mut() {
            t.advance(TaskStatus::Scheduled);
        }
        s.schedule = vec![ScheduleSlot::new("Lab", "2026-01-19", "09:00 - 16:00", 7.0)];
        s.set_conflicts(vec![Conflict::DurationIssue {
            task_id: None,
            task_name: "Lab".into(),
            hours: 7.0,
        }]);

        let s = p.repair_conflicts(s);
        assert_eq!(s.tasks[0].status, TaskStatus::Scheduled);
        assert_eq!(s.tasks[1].status, TaskStatus::Conflicted);
    }

    #[test]
    fn failed_repair_keeps_schedule_and_conflicts() {
        let p = pipeline(&["not json", "still not json", "nope"]);
        let mut s = fixture();
        s.schedule = vec![
            ScheduleSlot::new("Essay", "2026-01-19", "09:00 - 11:00", 2.0).with_task_id(TaskId::nth(1)),
            ScheduleSlot::new("Lab", "2026-01-19", "10:00 - 12:00", 2.0).with_task_id(TaskId::nth(2)),
        ];
        for t in s.tasks.iter_mut() {
            t.advance(TaskStatus::Scheduled);
        }
        let s = p.detect_conflicts(s);
        let schedule_before = s.schedule.clone();
        let conflicts_before = s.conflicts().to_vec();
        assert!(s.needs_repair());

        let s = p.repair_conflicts(s);

        assert_eq!(s.schedule, schedule_before);
        assert_eq!(s.conflicts(), conflicts_before.as_slice());
        assert!(s.needs_repair());
        assert!(s.messages().iter().any(|m| m == "Could not fully resolve conflicts"));
        assert!(s.tasks.iter().all(|t| t.status == TaskStatus::Conflicted));
    }

    #[test]
    fn stages_are_repeatable_from_a_snapshot() {
        let reply = r#"[{"task_name": "Essay", "date": "2026-01-21", "time_slot": "09:00 - 11:00", "duration_hours": 2.0}]"#;
        let snapshot = fixture();

        let a = pipeline(&[reply]).propose_schedule(snapshot.clone());
        let b = pipeline(&[reply]).propose_schedule(snapshot);
        assert_eq!(a, b);

        let p = pipeline(&[]);
        assert_eq!(p.detect_conflicts(a.clone()), p.detect_conflicts(a));
    }

    #[test]
    fn finalize_renders_schedule_and_leftover_conflicts() {
        let p = pipeline(&[]);
        let mut s = fixture();
        s.schedule = vec![ScheduleSlot::new("Essay", "2026-01-21", "09:00 - 11:00", 2.0)];
        s.set_conflicts(vec![Conflict::DeadlineViolation {
            task_id: Some(TaskId::nth(1)),
            task_name: "Essay".into(),
            scheduled_date: "2026-01-21".into(),
            deadline: "2026-01-20".into(),
        }]);

        let s = p.finalize(s);

        assert_eq!(s.status, RunStatus::Success);
        let text = s.final_schedule.unwrap();
        assert!(text.starts_with("**Your Schedule:**\n\n• 2026-01-21 09:00 - 11:00: Essay (2.0h)\n"));
        assert!(text.contains("- Deadline violation: Essay scheduled on 2026-01-21 but due on 2026-01-20"));
    }

    #[test]
    fn memory_hit_metadata_reads_strings() {
        let hit = MemoryHit {
            content: String::new(),
            metadata: json!({"actual_hours": "2.5"}).as_object().cloned().unwrap(),
            score: 0.0,
        };
        assert_eq!(hit.metadata_f64("actual_hours"), Some(2.5));
    }
}
