//! Ordinal risk scales.
//!
//! Both risk classes are ordinal: GRC is numbered `1..=10`, ARC is lettered
//! `a..=d`. Internally every rank is its 1-based position on the scale so
//! mitigation arithmetic is uniform; labels are only used at the edges.

use crate::errors::{Result, SoraError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A resolved position on a scale together with its display label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rank {
    /// 1-based position; 1 is the lowest-risk rank of the scale.
    pub ordinal: u8,
    pub label: String,
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Outcome of a classification: a rank or the out-of-scope marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    Ranked(Rank),
    /// The facts fall outside what the methodology covers.
    OutOfScope,
}

impl Classification {
    /// Marker accepted in rule files for out-of-scope results.
    pub const OUT_OF_SCOPE_LABEL: &'static str = "out_of_scope";

    pub fn rank(&self) -> Option<&Rank> {
        match self {
            Self::Ranked(rank) => Some(rank),
            Self::OutOfScope => None,
        }
    }

    pub fn ordinal(&self) -> Option<u8> {
        self.rank().map(|r| r.ordinal)
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Ranked(rank) => &rank.label,
            Self::OutOfScope => Self::OUT_OF_SCOPE_LABEL,
        }
    }

    pub fn is_out_of_scope(&self) -> bool {
        matches!(self, Self::OutOfScope)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered labels of one risk class plus its floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scale {
    labels: Vec<String>,
    floor: u8,
}

impl Scale {
    /// Build a scale from labels ordered best to worst.
    pub fn new(labels: Vec<String>, floor_label: &str) -> Result<Self> {
        if labels.is_empty() || labels.len() > usize::from(u8::MAX) {
            return Err(SoraError::configuration(format!(
                "scale needs between 1 and {} labels, got {}",
                u8::MAX,
                labels.len()
            )));
        }
        for (i, label) in labels.iter().enumerate() {
            if label.trim().is_empty() || labels[..i].contains(label) {
                return Err(SoraError::configuration(format!(
                    "scale label '{}' is empty or duplicated",
                    label
                )));
            }
        }
        let floor = position(&labels, floor_label).ok_or_else(|| {
            SoraError::configuration(format!("scale floor '{}' is not a scale label", floor_label))
        })?;
        Ok(Self { labels, floor })
    }

    /// Worst (highest-risk) ordinal.
    pub fn max(&self) -> u8 {
        // bounded by u8::MAX in `new`
        self.labels.len() as u8
    }

    /// Best ordinal a residual may reach.
    pub fn floor(&self) -> u8 {
        self.floor
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn rank(&self, ordinal: u8) -> Option<Rank> {
        let index = usize::from(ordinal).checked_sub(1)?;
        self.labels.get(index).map(|label| Rank {
            ordinal,
            label: label.clone(),
        })
    }

    pub fn parse(&self, label: &str) -> Option<Rank> {
        position(&self.labels, label).and_then(|ordinal| self.rank(ordinal))
    }

    /// Parse a rule-file result value: a label or the out-of-scope marker.
    pub fn parse_classification(&self, label: &str) -> Result<Classification> {
        if label == Classification::OUT_OF_SCOPE_LABEL {
            return Ok(Classification::OutOfScope);
        }
        self.parse(label)
            .map(Classification::Ranked)
            .ok_or_else(|| SoraError::configuration(format!("'{}' is not a label of the scale", label)))
    }

    /// Clamp a running value into `[floor, max]` and resolve it.
    pub fn clamp(&self, value: i32) -> Rank {
        let clamped = value.clamp(i32::from(self.floor), i32::from(self.max()));
        let ordinal = u8::try_from(clamped).unwrap_or(self.floor);
        self.rank(ordinal).unwrap_or_else(|| Rank {
            ordinal,
            label: ordinal.to_string(),
        })
    }
}

fn position(labels: &[String], label: &str) -> Option<u8> {
    labels
        .iter()
        .position(|l| l == label)
        .and_then(|i| u8::try_from(i + 1).ok())
}
