//! Getting structured data out of free-form completions.
//!
//! The model is asked for a bare JSON array but often wraps it in prose or
//! code fences. [`find_json_array`] scans for the first balanced `[...]`
//! that parses; [`request_json_array`] runs a prompt through a [`Completer`]
//! and reports absence as data, not as an error.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::collaborators::{Completer, CompletionPurpose};

/// Why a completion produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoResult {
    #[error("completion failed: {0}")]
    CompletionFailed(String),
    #[error("no JSON array found in response")]
    NoJsonArray,
    #[error("malformed JSON array: {0}")]
    MalformedJson(String),
    #[error("candidate schedule is empty")]
    EmptyCandidate,
    #[error("candidate schedule drops task(s): {}", .0.join(", "))]
    DroppedTasks(Vec<String>),
    #[error("candidate does not reduce conflicts ({before} -> {after})")]
    NotImproved { before: usize, after: usize },
}

/// Success-with-value or no-result-with-reason.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion<T> {
    Value(T),
    NoResult(NoResult),
}

impl<T> Completion<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Completion::Value(v) => Some(v),
            Completion::NoResult(_) => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Completion::Value(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Completion<U> {
        match self {
            Completion::Value(v) => Completion::Value(f(v)),
            Completion::NoResult(r) => Completion::NoResult(r),
        }
    }
}

/// Byte offset one past the `]` that closes the `[` at `start`.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (off, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + off + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Locate and parse the first well-formed JSON array in `text`.
pub fn find_json_array(text: &str) -> Result<Vec<Value>, NoResult> {
    let mut first_error: Option<String> = None;

    for (start, _) in text.match_indices('[') {
        let Some(end) = balanced_end(text, start) else {
            continue;
        };
        match serde_json::from_str::<Vec<Value>>(&text[start..end]) {
            Ok(items) => return Ok(items),
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    Err(match first_error {
        Some(e) => NoResult::MalformedJson(e),
        None => NoResult::NoJsonArray,
    })
}

/// Send `prompt` and parse the first JSON array out of the reply.
pub fn request_json_array<C: Completer + ?Sized>(
    completer: &C,
    purpose: CompletionPurpose,
    prompt: &str,
) -> Completion<Vec<Value>> {
    let reply = match completer.complete_for(purpose, prompt) {
        Ok(r) => r,
        Err(e) => {
            warn!(?purpose, error = %e, "completion request failed");
            return Completion::NoResult(NoResult::CompletionFailed(format!("{e:#}")));
        }
    };

    debug!(?purpose, chars = reply.len(), "completion received");
    match find_json_array(&reply) {
        Ok(items) => Completion::Value(items),
        Err(reason) => {
            warn!(?purpose, %reason, "completion had no usable JSON array");
            Completion::NoResult(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Canned(&'static str);
    impl Completer for Canned {
        fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;
    impl Completer for Failing {
        fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("rate limited")
        }
    }

    #[test]
    fn finds_array_inside_prose_and_fences() {
        let text = "Sure! Here it is:\n```json\n[{\"a\": [1, 2]}, {\"b\": \"]\"}]\n```\nLet me know [if] you need more.";
        let items = find_json_array(text).unwrap();
        assert_eq!(items, vec![json!({"a": [1, 2]}), json!({"b": "]"})]);
    }

    #[test]
    fn skips_bracketed_prose_before_the_payload() {
        let text = "Note [see below]: [1, 2, 3]";
        assert_eq!(find_json_array(text).unwrap(), vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn reports_absent_and_malformed_arrays() {
        assert_eq!(find_json_array("no data here"), Err(NoResult::NoJsonArray));
        assert_eq!(find_json_array("[unclosed"), Err(NoResult::NoJsonArray));
        assert!(matches!(find_json_array("[oops, not json]"), Err(NoResult::MalformedJson(_))));
    }

    #[test]
    fn completion_failures_become_no_result() {
        assert!(matches!(
            request_json_array(&Failing, CompletionPurpose::Extract, "p"),
            Completion::NoResult(NoResult::CompletionFailed(msg)) if msg.contains("rate limited")
        ));
        assert_eq!(request_json_array(&Canned("[]"), CompletionPurpose::Schedule, "p"), Completion::Value(vec![]));
        assert!(!request_json_array(&Canned("I can't help with that."), CompletionPurpose::Repair, "p").is_value());
    }
}
