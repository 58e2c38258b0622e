//! Audit trail of a classification.
//!
//! Every decision the engine takes (override check, table lookup, each
//! mitigation, cap, floor, composite lookup) is recorded as one
//! [`TraceEntry`] carrying the regulatory [`Citation`] that justifies it.
//! Entries are appended in decision order, so the trace reads as a replayable
//! derivation of the result.
//!
//! Timestamps are metadata: [`TraceEntry`] equality ignores them, which keeps
//! two runs over the same facts comparable.

use crate::errors::{Result, SoraError};
use crate::facts::FactMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference into the regulatory document backing a decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Citation {
    pub doc_id: String,
    pub section: String,
    pub rule_id: String,
}

impl Citation {
    pub fn new(
        doc_id: impl Into<String>,
        section: impl Into<String>,
        rule_id: impl Into<String>,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            section: section.into(),
            rule_id: rule_id.into(),
        }
    }

    /// True when all three parts carry text.
    pub fn is_complete(&self) -> bool {
        [&self.doc_id, &self.section, &self.rule_id]
            .iter()
            .all(|part| !part.trim().is_empty())
    }

    /// Load-time check; `context` names the rule being loaded.
    pub fn check(&self, context: &str) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(SoraError::configuration(format!(
                "{} has an incomplete citation ({})",
                context, self
            )))
        }
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} §{} [{}]", self.doc_id, self.section, self.rule_id)
    }
}

/// One recorded decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: String,
    /// Facts the decision consumed
    #[serde(default, skip_serializing_if = "FactMap::is_empty")]
    pub inputs: FactMap,
    pub result: String,
    pub citation: Citation,
    /// Signed credit movement; positive reduces risk, negative is a penalty or truncation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TraceEntry {
    pub fn new(step: impl Into<String>, result: impl Into<String>, citation: Citation) -> Self {
        Self {
            step: step.into(),
            inputs: FactMap::new(),
            result: result.into(),
            citation,
            delta: None,
            note: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_inputs(mut self, inputs: FactMap) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_delta(mut self, delta: i32) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl PartialEq for TraceEntry {
    fn eq(&self, other: &Self) -> bool {
        self.step == other.step
            && self.inputs == other.inputs
            && self.result == other.result
            && self.citation == other.citation
            && self.delta == other.delta
            && self.note == other.note
    }
}

/// Append-only collector for one classification run.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    entries: Vec<TraceEntry>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: TraceEntry) {
        tracing::trace!(
            step = %entry.step,
            result = %entry.result,
            delta = ?entry.delta,
            citation = %entry.citation,
            "trace"
        );
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(self) -> Vec<TraceEntry> {
        self.entries
    }
}
