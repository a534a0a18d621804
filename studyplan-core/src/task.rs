//! Task and schedule-slot model shared by every pipeline stage.
//!
//! Tasks are identified by a [`TaskId`] assigned at extraction time. Slots
//! returned by the model carry the id when it was echoed back; otherwise they
//! are joined to tasks by name.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use crate::time::TimeRange;

/// Deadline placeholder used when the source text gives no date.
pub const DEADLINE_NOT_SPECIFIED: &str = "Not specified";

/// Fallback estimate (hours) for tasks the model could not size.
pub const DEFAULT_ESTIMATED_HOURS: f64 = 2.0;

/// Stable task identifier, e.g. `task-3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Id for the task extracted at 1-based position `n`.
    pub fn nth(n: usize) -> Self {
        Self(format!("task-{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Value")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }

    /// Case-insensitive parse; anything unrecognised is `Medium`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "urgent" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl From<String> for Priority {
    fn from(s: String) -> Self {
        Priority::parse_lenient(&s)
    }
}

/// Strings parse leniently; null or any other JSON value is `Medium`.
impl From<Value> for Priority {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => Priority::parse_lenient(&s),
            _ => Priority::default(),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Conflicted,
}

impl TaskStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// pending -> scheduled -> {scheduled | conflicted}; conflicted is terminal.
    pub fn can_advance(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Scheduled)
                | (TaskStatus::Scheduled, TaskStatus::Scheduled)
                | (TaskStatus::Scheduled, TaskStatus::Conflicted)
                | (TaskStatus::Conflicted, TaskStatus::Conflicted)
        )
    }
}

/// A unit of academic work extracted from the user's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "task_name")]
    pub name: String,
    /// ISO date (`YYYY-MM-DD`) or [`DEADLINE_NOT_SPECIFIED`].
    pub deadline: String,
    pub estimated_hours: f64,
    pub priority: Priority,
    pub course: Option<String>,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(id: TaskId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            deadline: DEADLINE_NOT_SPECIFIED.to_string(),
            estimated_hours: DEFAULT_ESTIMATED_HOURS,
            priority: Priority::Medium,
            course: None,
            status: TaskStatus::Pending,
        }
    }

    pub fn with_deadline(mut self, deadline: impl Into<String>) -> Self {
        self.deadline = deadline.into();
        self
    }

    pub fn with_hours(mut self, hours: f64) -> Self {
        self.estimated_hours = hours;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_course(mut self, course: impl Into<String>) -> Self {
        self.course = Some(course.into());
        self
    }

    /// Build a task from one element of the model's extraction array.
    ///
    /// Returns `None` when the element is not a JSON object.
    pub fn from_extracted(position: usize, value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        let name = obj
            .get("task_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Unnamed Task");

        let deadline = obj
            .get("deadline")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEADLINE_NOT_SPECIFIED);

        let hours = obj
            .get("estimated_hours")
            .and_then(hours_from_value)
            .filter(|h| h.is_finite() && *h > 0.0)
            .unwrap_or(DEFAULT_ESTIMATED_HOURS);

        let priority = obj
            .get("priority")
            .and_then(Value::as_str)
            .map(Priority::parse_lenient)
            .unwrap_or_default();

        let course = obj
            .get("course")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Some(Self {
            id: TaskId::nth(position),
            name: name.to_string(),
            deadline: deadline.to_string(),
            estimated_hours: hours,
            priority,
            course,
            status: TaskStatus::Pending,
        })
    }

    /// Parsed deadline, if it is a `YYYY-MM-DD` date.
    pub fn deadline_date(&self) -> Option<NaiveDate> {
        crate::time::parse_iso_date(&self.deadline)
    }

    /// Apply a lifecycle transition. Returns `false` (and leaves the status
    /// untouched) when the transition is not allowed.
    pub fn advance(&mut self, next: TaskStatus) -> bool {
        if self.status.can_advance(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}

/// Hours given as a JSON number or a numeric string.
fn hours_from_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn lenient_hours<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(hours_from_value(&v).filter(|h| h.is_finite()).unwrap_or(0.0))
}

/// One scheduled occurrence of a task.
///
/// Fields mirror the JSON the model is asked to produce. `duration_hours` is
/// taken as reported and may disagree with `time_slot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub task_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: String,
    /// `"HH:MM - HH:MM"`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub time_slot: String,
    #[serde(default, deserialize_with = "lenient_hours")]
    pub duration_hours: f64,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ScheduleSlot {
    pub fn new(
        task_name: impl Into<String>,
        date: impl Into<String>,
        time_slot: impl Into<String>,
        duration_hours: f64,
    ) -> Self {
        Self {
            task_id: None,
            task_name: task_name.into(),
            date: date.into(),
            time_slot: time_slot.into(),
            duration_hours,
            priority: Priority::Medium,
            notes: None,
        }
    }

    pub fn with_task_id(mut self, id: TaskId) -> Self {
        self.task_id = Some(id);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn time_range(&self) -> Option<TimeRange> {
        TimeRange::parse(&self.time_slot)
    }

    /// Length of `time_slot` in hours, when it parses.
    pub fn span_hours(&self) -> Option<f64> {
        self.time_range().map(|r| r.hours())
    }

    /// Fill in `task_id` from `tasks` by exact name when the model omitted it,
    /// and drop ids that do not belong to any task.
    pub fn resolve_task_id(&mut self, tasks: &[Task]) {
        if let Some(id) = &self.task_id {
            if tasks.iter().any(|t| &t.id == id) {
                return;
            }
        }
        self.task_id = tasks
            .iter()
            .find(|t| t.name == self.task_name)
            .map(|t| t.id.clone());
    }

    /// Parse the model's slot array element by element.
    ///
    /// Returns the slots that deserialised and the number that did not.
    pub fn parse_many(values: Vec<Value>) -> (Vec<ScheduleSlot>, usize) {
        let mut slots = Vec::with_capacity(values.len());
        let mut skipped = 0;
        for v in values {
            match serde_json::from_value::<ScheduleSlot>(v) {
                Ok(s) => slots.push(s),
                Err(_) => skipped += 1,
            }
        }
        (slots, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_lifecycle_is_monotonic() {
        let mut t = Task::new(TaskId::nth(1), "Essay");
        assert!(!t.advance(TaskStatus::Conflicted));
        assert!(t.advance(TaskStatus::Scheduled));
        assert!(t.advance(TaskStatus::Scheduled));
        assert!(!t.advance(TaskStatus::Pending));
        assert!(t.advance(TaskStatus::Conflicted));
        assert!(!t.advance(TaskStatus::Scheduled));
        assert_eq!(t.status, TaskStatus::Conflicted);
    }

    #[test]
    fn extracted_task_normalises_missing_fields() {
        let t = Task::from_extracted(4, &json!({"estimated_hours": "-1", "priority": "HIGH"})).unwrap();
        assert_eq!(t.id, TaskId::nth(4));
        assert_eq!(t.name, "Unnamed Task");
        assert_eq!(t.deadline, DEADLINE_NOT_SPECIFIED);
        assert_eq!(t.estimated_hours, DEFAULT_ESTIMATED_HOURS);
        assert_eq!(t.priority, Priority::High);
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.deadline_date().is_none());
    }

    #[test]
    fn extracted_task_accepts_numeric_strings() {
        let t = Task::from_extracted(
            1,
            &json!({"task_name": "Lab", "deadline": "2026-01-22", "estimated_hours": "3.5", "course": "Physics"}),
        )
        .unwrap();
        assert_eq!(t.estimated_hours, 3.5);
        assert_eq!(t.course.as_deref(), Some("Physics"));
        assert_eq!(t.deadline_date(), NaiveDate::from_ymd_opt(2026, 1, 22));
        assert!(Task::from_extracted(2, &json!("not an object")).is_none());
    }

    #[test]
    fn slot_parsing_skips_malformed_elements() {
        let (slots, skipped) = ScheduleSlot::parse_many(vec![
            json!({"task_name": "Essay", "date": "2026-01-19", "time_slot": "09:00 - 11:00", "duration_hours": 2.0, "priority": "high"}),
            json!({"date": "2026-01-19"}),
            json!(42),
        ]);
        assert_eq!(slots.len(), 1);
        assert_eq!(skipped, 2);
        assert_eq!(slots[0].priority, Priority::High);
        assert_eq!(slots[0].span_hours(), Some(2.0));
    }

    #[test]
    fn slot_parsing_tolerates_nulls_and_numeric_strings() {
        let (slots, skipped) = ScheduleSlot::parse_many(vec![
            json!({"task_name": "Essay", "date": "2026-01-19", "time_slot": "09:00 - 11:00", "duration_hours": 2.0, "priority": null}),
            json!({"task_name": "Lab", "date": null, "time_slot": "13:00 - 15:00", "duration_hours": "2", "priority": 1, "task_id": null, "notes": null}),
            json!({"task_name": "Quiz", "date": "2026-01-20", "time_slot": "09:00 - 10:00", "duration_hours": "about an hour"}),
        ]);
        assert_eq!(skipped, 0);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].priority, Priority::Medium);
        assert_eq!(slots[1].date, "");
        assert_eq!(slots[1].duration_hours, 2.0);
        assert_eq!(slots[1].priority, Priority::Medium);
        assert_eq!(slots[1].task_id, None);
        assert_eq!(slots[2].duration_hours, 0.0);
    }

    #[test]
    fn resolve_task_id_prefers_valid_echoed_id() {
        let tasks = vec![
            Task::new(TaskId::nth(1), "Reading"),
            Task::new(TaskId::nth(2), "Reading"),
        ];
        let mut echoed = ScheduleSlot::new("Reading", "2026-01-19", "09:00 - 10:00", 1.0).with_task_id(TaskId::nth(2));
        echoed.resolve_task_id(&tasks);
        assert_eq!(echoed.task_id, Some(TaskId::nth(2)));

        let mut bogus = ScheduleSlot::new("Reading", "2026-01-19", "09:00 - 10:00", 1.0).with_task_id("task-9".into());
        bogus.resolve_task_id(&tasks);
        assert_eq!(bogus.task_id, Some(TaskId::nth(1)));
    }
}
