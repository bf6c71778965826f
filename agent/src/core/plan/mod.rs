//! Plan extraction and repair.
//!
//! Turns an arbitrary model reply into an ordered [`Plan`] or an empty plan
//! plus a [`PlanDiagnostic`]. The pipeline is pure apart from `tracing`
//! events and never returns an error: a malformed reply is an expected
//! outcome, not a failure.
//!
//! ```text
//! raw -> normalize -> extract -> parse
//!                                  | fails
//!                                  v
//!                    fragment-merge -> parse
//!                    inline-newline-strip -> parse
//!                    pure-alphabet-clip -> parse
//!                                  | ok
//!                                  v
//!                     decode entries -> validate -> Plan
//! ```

pub mod decode;
pub mod document;
pub mod extract;
pub mod normalize;
pub mod repair;
pub mod validate;

use std::fmt;

use tracing::{debug, info, warn};

use crate::core::types::Plan;

use self::decode::{DroppedEntry, decode_entries};
use self::document::{FilesField, PlanDocument, parse_document};
use self::extract::extract_balanced_object;
use self::normalize::normalize;
use self::repair::REPAIR_CHAIN;
use self::validate::validate_entries;

/// Characters of offending text kept in a diagnostic.
pub const DIAGNOSTIC_EXCERPT_CHARS: usize = 2500;

/// Why a pipeline run produced an empty plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDiagnostic {
    /// The reply was empty or whitespace-only.
    EmptyResponse,
    /// No parseable object, even after every repair.
    NoExtractableObject { excerpt: String },
    /// The object parsed but `files` is missing or not a list.
    MalformedPayload { excerpt: String },
    /// Every entry was invalid, undecodable, or absent.
    EmptyPlan { excerpt: String },
}

impl PlanDiagnostic {
    pub fn excerpt(&self) -> Option<&str> {
        match self {
            PlanDiagnostic::EmptyResponse => None,
            PlanDiagnostic::NoExtractableObject { excerpt }
            | PlanDiagnostic::MalformedPayload { excerpt }
            | PlanDiagnostic::EmptyPlan { excerpt } => Some(excerpt),
        }
    }
}

impl fmt::Display for PlanDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanDiagnostic::EmptyResponse => f.write_str("empty response"),
            PlanDiagnostic::NoExtractableObject { .. } => {
                f.write_str("no parseable plan object (JSON decode error after repairs)")
            }
            PlanDiagnostic::MalformedPayload { .. } => {
                f.write_str("`files` is missing or not a list")
            }
            PlanDiagnostic::EmptyPlan { .. } => f.write_str("no valid file entries"),
        }
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOutcome {
    pub plan: Plan,
    /// Set whenever `plan` is empty.
    pub diagnostic: Option<PlanDiagnostic>,
    /// Entries dropped for undecodable content (the plan may still be non-empty).
    pub dropped: Vec<DroppedEntry>,
    /// Name of the repair step that made the reply parse, if any was needed.
    pub repaired_by: Option<&'static str>,
}

impl PlanOutcome {
    fn failed(diagnostic: PlanDiagnostic) -> Self {
        warn!(
            diagnostic = %diagnostic,
            excerpt = diagnostic.excerpt().unwrap_or(""),
            "model reply yielded no plan"
        );
        Self {
            diagnostic: Some(diagnostic),
            ..Self::default()
        }
    }
}

/// Recover a plan from a raw model reply.
pub fn parse_plan(raw: &str) -> PlanOutcome {
    let Some(normalized) = normalize(raw) else {
        return PlanOutcome::failed(PlanDiagnostic::EmptyResponse);
    };

    let (document, repaired_by) = match parse_with_repairs(&normalized) {
        Ok(parsed) => parsed,
        Err(last_attempt) => {
            return PlanOutcome::failed(PlanDiagnostic::NoExtractableObject {
                excerpt: excerpt(&last_attempt),
            });
        }
    };

    let slots = match document.files {
        FilesField::List(slots) => slots,
        FilesField::Missing | FilesField::NotAList => {
            return PlanOutcome::failed(PlanDiagnostic::MalformedPayload {
                excerpt: excerpt(&normalized),
            });
        }
    };

    let (decoded, dropped) = decode_entries(slots);
    let plan = validate_entries(decoded);
    if plan.is_empty() {
        return PlanOutcome {
            dropped,
            repaired_by,
            ..PlanOutcome::failed(PlanDiagnostic::EmptyPlan {
                excerpt: excerpt(&normalized),
            })
        };
    }

    debug!(files = plan.len(), dropped = dropped.len(), "plan recovered");
    PlanOutcome {
        plan,
        diagnostic: None,
        dropped,
        repaired_by,
    }
}

/// Parse the normalized text, falling back to the repair chain.
///
/// Repairs run on the whole normalized text (a split fragment can sit across
/// the boundary a premature extraction would cut at); every attempt
/// re-extracts. On failure returns the last text that was attempted.
fn parse_with_repairs(normalized: &str) -> Result<(PlanDocument, Option<&'static str>), String> {
    if let Some(document) = attempt_parse(normalized) {
        return Ok((document, None));
    }

    let mut text = normalized.to_string();
    for step in REPAIR_CHAIN {
        let repaired = (step.apply)(&text);
        if repaired == text {
            continue;
        }
        text = repaired;
        if let Some(document) = attempt_parse(&text) {
            info!(repair = step.name, "plan object recovered by repair");
            return Ok((document, Some(step.name)));
        }
        debug!(repair = step.name, "repair applied, still not parseable");
    }

    let candidate = extract_balanced_object(&text);
    Err(if candidate.is_empty() {
        text
    } else {
        candidate.to_string()
    })
}

/// Extract the balanced candidate (or take the whole text when there is none)
/// and parse it.
fn attempt_parse(text: &str) -> Option<PlanDocument> {
    let candidate = extract_balanced_object(text);
    if candidate.is_empty() {
        parse_document(text)
    } else {
        parse_document(candidate)
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(DIAGNOSTIC_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FileEdit;

    #[test]
    fn fenced_encoded_plan() {
        let raw = "```json\n{\"files\":[{\"path\":\"a.py\",\"content_base64\":\"eD0x\"}]}\n```";
        let outcome = parse_plan(raw);
        assert_eq!(outcome.plan.files, vec![FileEdit::new("a.py", "x=1")]);
        assert_eq!(outcome.diagnostic, None);
        assert_eq!(outcome.repaired_by, None);
    }

    #[test]
    fn split_fragment_is_merged_then_decoded() {
        let raw = r#"{"files": [{"path":"b.py","content_base64":"eQ=="}, "content_base64":"PT0y"}]}"#;
        let outcome = parse_plan(raw);
        assert_eq!(outcome.plan.files, vec![FileEdit::new("b.py", "y==2")]);
        assert_eq!(outcome.repaired_by, Some("fragment-merge"));
    }

    #[test]
    fn prose_around_object_is_ignored() {
        let raw = r#"Sure! Here is the result: {"files":[{"path":"c.py","content":"z=3"}]} Hope this helps!"#;
        let outcome = parse_plan(raw);
        assert_eq!(outcome.plan.files, vec![FileEdit::new("c.py", "z=3")]);
    }

    #[test]
    fn empty_input_is_empty_plan_with_diagnostic() {
        let outcome = parse_plan("");
        assert!(outcome.plan.is_empty());
        assert_eq!(outcome.diagnostic, Some(PlanDiagnostic::EmptyResponse));
        assert_eq!(
            parse_plan(" \n ").diagnostic,
            Some(PlanDiagnostic::EmptyResponse)
        );
    }

    #[test]
    fn undecodable_only_entry_yields_empty_plan() {
        let raw = r#"{"files":[{"path":"d.py","content_base64":"bm90-base64!!"}]}"#;
        let outcome = parse_plan(raw);
        assert!(outcome.plan.is_empty());
        assert!(matches!(
            outcome.diagnostic,
            Some(PlanDiagnostic::EmptyPlan { .. })
        ));
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].path, "d.py");
    }

    #[test]
    fn newline_inside_payload_is_repaired() {
        let raw = "{\"files\":[{\"path\":\"a.py\",\"content_base64\":\"eD\n0x\"}]}";
        let outcome = parse_plan(raw);
        assert_eq!(outcome.plan.files, vec![FileEdit::new("a.py", "x=1")]);
        assert_eq!(outcome.repaired_by, Some("inline-newline-strip"));
    }

    #[test]
    fn trailing_garbage_in_payload_is_clipped() {
        let raw = r#"{"files":[{"path":"a.py","content_base64":"eD0x" extra"}]}"#;
        let outcome = parse_plan(raw);
        assert_eq!(outcome.plan.files, vec![FileEdit::new("a.py", "x=1")]);
        assert_eq!(outcome.repaired_by, Some("pure-alphabet-clip"));
    }

    #[test]
    fn unrepairable_text_is_no_extractable_object() {
        let outcome = parse_plan("I could not produce a plan, sorry.");
        assert!(outcome.plan.is_empty());
        let Some(PlanDiagnostic::NoExtractableObject { excerpt }) = outcome.diagnostic else {
            panic!("expected NoExtractableObject");
        };
        assert_eq!(excerpt, "I could not produce a plan, sorry.");
    }

    #[test]
    fn truncated_reply_is_no_extractable_object() {
        let raw = r#"{"files":[{"path":"a.py","content":"x=1"#;
        assert!(matches!(
            parse_plan(raw).diagnostic,
            Some(PlanDiagnostic::NoExtractableObject { .. })
        ));
    }

    #[test]
    fn missing_files_is_malformed_payload() {
        let outcome = parse_plan(r#"{"changes":[]}"#);
        assert!(matches!(
            outcome.diagnostic,
            Some(PlanDiagnostic::MalformedPayload { .. })
        ));
    }

    #[test]
    fn files_not_a_list_is_malformed_payload() {
        let outcome = parse_plan(r#"{"files":{"path":"a.py","content":"x"}}"#);
        assert!(matches!(
            outcome.diagnostic,
            Some(PlanDiagnostic::MalformedPayload { .. })
        ));
    }

    #[test]
    fn empty_files_list_is_empty_plan() {
        let outcome = parse_plan(r#"{"files":[]}"#);
        assert!(matches!(
            outcome.diagnostic,
            Some(PlanDiagnostic::EmptyPlan { .. })
        ));
    }

    #[test]
    fn diagnostic_excerpt_is_bounded() {
        let raw = format!("no object here {}", "x".repeat(5000));
        let outcome = parse_plan(&raw);
        let excerpt = outcome
            .diagnostic
            .as_ref()
            .and_then(PlanDiagnostic::excerpt)
            .expect("excerpt");
        assert_eq!(excerpt.chars().count(), DIAGNOSTIC_EXCERPT_CHARS);
    }
}
