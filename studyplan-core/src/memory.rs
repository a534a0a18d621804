//! Local similarity memory of past task completions and productivity patterns.
//!
//! Records are plain text plus a JSON metadata object. Retrieval ranks by
//! cosine similarity over lower-cased word counts, which is enough for the
//! short, keyword-heavy records kept here. Persistence is a single JSON file.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::collaborators::{MemoryHit, SimilarityMemory};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A finished task, as remembered for future estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub task_name: String,
    pub course: Option<String>,
    pub estimated_hours: f64,
    pub actual_hours: f64,
    pub priority: String,
    pub status: String,
    pub notes: Option<String>,
}

/// When and how well a kind of work tends to go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePattern {
    pub time_slot: String,
    pub day_type: String,
    pub productivity: String,
    pub task_type: String,
    pub success_rate: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalMemory {
    records: Vec<MemoryRecord>,
}

fn tokenize(s: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for t in s
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *counts.entry(t.to_string()).or_insert(0.0) += 1.0;
    }
    counts
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .filter_map(|(t, x)| b.get(t).map(|y| x * y))
        .sum();
    let norm = |v: &HashMap<String, f64>| v.values().map(|x| x * x).sum::<f64>().sqrt();
    dot / (norm(a) * norm(b))
}

impl LocalMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    pub fn add(&mut self, content: impl Into<String>, metadata: Map<String, Value>) {
        self.records.push(MemoryRecord {
            content: content.into(),
            metadata,
        });
    }

    pub fn add_task_completion(&mut self, task: &TaskCompletion) {
        let course = task.course.as_deref().unwrap_or("General");
        let content = format!(
            "Task: {}\nCourse: {}\nEstimated Hours: {}\nActual Hours: {}\nPriority: {}\nCompletion Status: {}\nNotes: {}",
            task.task_name,
            course,
            task.estimated_hours,
            task.actual_hours,
            task.priority,
            task.status,
            task.notes.as_deref().unwrap_or("None"),
        );
        let metadata = json!({
            "task_name": task.task_name,
            "course": course,
            "estimated_hours": task.estimated_hours,
            "actual_hours": task.actual_hours,
            "priority": task.priority,
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.add(content, as_map(metadata));
    }

    pub fn add_schedule_pattern(&mut self, pattern: &SchedulePattern) {
        let content = format!(
            "Productive time slot: {}\nDay Type: {}\nProductivity Level: {}\nTask Type Completed: {}\nSuccess Rate: {}%",
            pattern.time_slot, pattern.day_type, pattern.productivity, pattern.task_type, pattern.success_rate,
        );
        let metadata = serde_json::to_value(pattern).map(as_map).unwrap_or_default();
        self.add(content, metadata);
    }

    /// Sample history so a fresh install has something to retrieve.
    pub fn seed_initial_data(&mut self) {
        let tasks = [
            ("Data Mining Assignment", "Data Mining", 3.0, 4.0, "Took longer due to debugging"),
            ("Theory of Computation Problem Set", "Theory of Computation", 2.0, 2.5, "Complex proofs required extra time"),
            ("Database Lab Report", "Database Systems", 2.0, 1.5, "Finished faster than expected"),
            ("Graph Algorithms Implementation", "Advanced Algorithms", 4.0, 5.0, "Implementation was complex"),
        ];
        for (name, course, est, actual, notes) in tasks {
            let priority = if name.contains("Lab") { "Medium" } else { "High" };
            self.add_task_completion(&TaskCompletion {
                task_name: name.to_string(),
                course: Some(course.to_string()),
                estimated_hours: est,
                actual_hours: actual,
                priority: priority.to_string(),
                status: "Completed".to_string(),
                notes: Some(notes.to_string()),
            });
        }

        let patterns = [
            ("9 AM - 12 PM", "Weekday", "High", "Coding/Implementation", 85),
            ("2 PM - 5 PM", "Weekday", "Medium", "Reading/Theory", 70),
            ("7 PM - 10 PM", "Weekday", "Medium", "Assignments", 75),
            ("10 AM - 1 PM", "Weekend", "High", "Projects", 90),
        ];
        for (slot, day, productivity, kind, rate) in patterns {
            self.add_schedule_pattern(&SchedulePattern {
                time_slot: slot.to_string(),
                day_type: day.to_string(),
                productivity: productivity.to_string(),
                task_type: kind.to_string(),
                success_rate: rate,
            });
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        let s = serde_json::to_string_pretty(self).context("serialize memory")?;
        fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

fn as_map(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

impl SimilarityMemory for LocalMemory {
    fn retrieve_similar(&self, query: &str, k: usize) -> Vec<MemoryHit> {
        let q = tokenize(query);
        let mut scored: Vec<(usize, f64)> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (i, cosine(&q, &tokenize(&r.content))))
            .collect();

        // Stable: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| MemoryHit {
                content: self.records[i].content.clone(),
                metadata: self.records[i].metadata.clone(),
                score,
            })
            .collect()
    }
}
