//! Prompt text for the three completion calls: task extraction, schedule
//! proposal and schedule repair.

use chrono::NaiveDate;

use crate::collaborators::MemoryHit;
use crate::conflicts::Conflict;
use crate::repair::RepairPolicy;
use crate::task::{ScheduleSlot, Task};
use crate::time::format_hours;

const SLOT_FORMAT: &str = r#"[
  {
    "task_id": "task-1",
    "task_name": "Task name",
    "date": "YYYY-MM-DD",
    "time_slot": "HH:MM - HH:MM",
    "duration_hours": 2.0,
    "priority": "High",
    "notes": "NOTE"
  }
]"#;

pub fn extraction_prompt(text: &str) -> String {
    format!(
        r#"You are a task extraction expert. Extract all tasks, assignments, and deadlines from the following text.

For each task, identify:
- Task name/title
- Due date/deadline (extract exact date as YYYY-MM-DD if available, or "Not specified")
- Estimated duration in hours (your best estimate based on task complexity)
- Priority (High/Medium/Low based on proximity to deadline and importance)
- Course/Subject (if mentioned)

Text to analyze:
{text}

Return ONLY a valid JSON array of tasks in this exact format:
[
  {{
    "task_name": "Complete assignment 1",
    "deadline": "2026-01-25",
    "estimated_hours": 3,
    "priority": "High",
    "course": "Data Mining"
  }}
]

If no tasks found, return: []
"#
    )
}

pub fn format_tasks(tasks: &[Task]) -> String {
    tasks
        .iter()
        .enumerate()
        .map(|(i, t)| {
            format!(
                "{}. {} [id: {}]\n   Course: {}\n   Deadline: {}\n   Estimated Duration: {} hours\n   Priority: {}",
                i + 1,
                t.name,
                t.id,
                t.course.as_deref().unwrap_or("General"),
                t.deadline,
                format_hours(t.estimated_hours),
                t.priority
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Productivity insights block built from memory hits.
pub fn format_memory_context(recommended: &[MemoryHit], similar: &[MemoryHit]) -> String {
    let mut lines = Vec::new();

    if !recommended.is_empty() {
        lines.push("Best Time Slots (from past productivity):".to_string());
        for hit in recommended.iter().take(3) {
            lines.push(format!(
                "- {}: {} productivity ({}% success rate)",
                hit.metadata_str("time_slot").unwrap_or_else(|| "N/A".to_string()),
                hit.metadata_str("productivity").unwrap_or_else(|| "Medium".to_string()),
                hit.metadata_str("success_rate").unwrap_or_else(|| "0".to_string()),
            ));
        }
    }

    if !similar.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Similar Past Tasks:".to_string());
        for hit in similar.iter().take(3) {
            lines.push(format!(
                "- {}: Estimated {}h, Actually took {}h",
                hit.metadata_str("task_name").unwrap_or_else(|| "Unknown".to_string()),
                format_hours(hit.metadata_f64("estimated_hours").unwrap_or(0.0)),
                format_hours(hit.metadata_f64("actual_hours").unwrap_or(0.0)),
            ));
        }
    }

    if lines.is_empty() {
        "No historical data available".to_string()
    } else {
        lines.join("\n")
    }
}

pub fn schedule_prompt(
    tasks: &[Task],
    recommended: &[MemoryHit],
    similar: &[MemoryHit],
    policy: &RepairPolicy,
    today: NaiveDate,
) -> String {
    format!(
        r#"You are an intelligent scheduling assistant. Create an optimal weekly schedule for the following tasks.

TASKS TO SCHEDULE:
{tasks}

PRODUCTIVITY INSIGHTS (from past data):
{context}

SCHEDULING GUIDELINES:
1. Consider task priorities (High priority tasks get better time slots)
2. Use recommended high-productivity time slots when available
3. Break large tasks (>{split}h) into multiple sessions
4. Add {gap}-min breaks between tasks
5. Consider deadlines - schedule urgent tasks earlier, never after the deadline
6. Today's date: {today}

OUTPUT FORMAT (return ONLY valid JSON array, copy each task's id into "task_id"):
{format}

Return ONLY the JSON array, no other text.
"#,
        tasks = format_tasks(tasks),
        context = format_memory_context(recommended, similar),
        split = format_hours(policy.split_threshold_hours),
        gap = policy.min_gap_minutes,
        today = today.format("%Y-%m-%d"),
        format = SLOT_FORMAT.replace("NOTE", "Why this time slot"),
    )
}

pub fn repair_prompt(
    schedule: &[ScheduleSlot],
    conflicts: &[Conflict],
    tasks: &[Task],
    policy: &RepairPolicy,
) -> String {
    let schedule_json = serde_json::to_string_pretty(schedule).unwrap_or_else(|_| "[]".to_string());
    let conflict_lines = conflicts
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n");
    let rules = policy
        .rules()
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {r}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    let deadlines = tasks
        .iter()
        .map(|t| format!("- {} [id: {}]: due {}", t.name, t.id, t.deadline))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a scheduling conflict resolver. Fix the following conflicts in the schedule.

CURRENT SCHEDULE:
{schedule_json}

CONFLICTS DETECTED:
{conflict_lines}

TASK DEADLINES:
{deadlines}

RESOLUTION RULES:
{rules}

OUTPUT FORMAT (return ONLY valid JSON array, include every task from the current schedule):
{format}

Return ONLY the resolved schedule as JSON array, no other text.
"#,
        format = SLOT_FORMAT.replace("NOTE", "Reason for change"),
    )
}
