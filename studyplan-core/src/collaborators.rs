//! Narrow interfaces to the systems the pipeline depends on but does not own:
//! document text extraction, LLM completion and similarity memory.
//!
//! Implementations are injected into [`crate::pipeline::Pipeline`]; tests use
//! scripted fakes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Turns a document into plain text.
///
/// Fails soft: any extraction problem yields an empty string, which callers
/// treat as "no content".
pub trait TextExtractor {
    fn extract_text(&self, document: &Path) -> String;
}

/// Which pipeline call a completion serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPurpose {
    Extract,
    Schedule,
    Repair,
}

/// A text-completion capability (usually an LLM).
///
/// The returned text is best effort and may wrap a JSON payload in prose.
pub trait Completer {
    fn complete(&self, prompt: &str) -> anyhow::Result<String>;

    /// Completion for a known pipeline call. Implementations may tune
    /// sampling per purpose; the default ignores it.
    fn complete_for(&self, purpose: CompletionPurpose, prompt: &str) -> anyhow::Result<String> {
        let _ = purpose;
        self.complete(prompt)
    }
}

/// One retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub content: String,
    pub metadata: Map<String, Value>,
    /// Higher is more similar.
    pub score: f64,
}

impl MemoryHit {
    /// Numeric metadata field, accepting numbers or numeric strings.
    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        match self.metadata.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Metadata field rendered as text, if present.
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Similarity search over past tasks and productivity patterns.
///
/// Best effort: may return fewer than `k` hits, never fails for "no results".
pub trait SimilarityMemory {
    fn retrieve_similar(&self, query: &str, k: usize) -> Vec<MemoryHit>;
}

impl<T: TextExtractor + ?Sized> TextExtractor for &T {
    fn extract_text(&self, document: &Path) -> String {
        (**self).extract_text(document)
    }
}

impl<T: Completer + ?Sized> Completer for &T {
    fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        (**self).complete(prompt)
    }

    fn complete_for(&self, purpose: CompletionPurpose, prompt: &str) -> anyhow::Result<String> {
        (**self).complete_for(purpose, prompt)
    }
}

impl<T: SimilarityMemory + ?Sized> SimilarityMemory for &T {
    fn retrieve_similar(&self, query: &str, k: usize) -> Vec<MemoryHit> {
        (**self).retrieve_similar(query, k)
    }
}

/// Memory with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemory;

impl SimilarityMemory for NoMemory {
    fn retrieve_similar(&self, _query: &str, _k: usize) -> Vec<MemoryHit> {
        Vec::new()
    }
}
