//! Mitigations and their credit.
//!
//! A [`MitigationDefinition`] reads one claimed level from the facts (a
//! robustness level, a segregation level or a flag) and maps it to a signed
//! credit. Positive credit lowers the risk class, negative credit is a penalty.
//! Evidence-only definitions never carry credit; a claim is recorded for audit.
//!
//! The ordered application of definitions, the cap and the floor live in
//! [`pipeline`] and [`cap`].

use crate::effects::{field_failure, validation_success, FactValidation};
use crate::errors::{Result, SoraError};
use crate::facts::{FactMap, FactValue};
use crate::rules::RuleCondition;
use crate::trace::Citation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod cap;
pub mod pipeline;

pub use cap::{CapBranch, CapPolicy, CapTiming};
pub use pipeline::{FloorTiming, MitigationPipeline, PipelineOutcome};

/// Robustness claim of a ground or containment mitigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Robustness {
    None,
    Low,
    Medium,
    High,
}

impl Robustness {
    pub const ALL: [Robustness; 4] = [Self::None, Self::Low, Self::Medium, Self::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

/// Strategic segregation claim of an air mitigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segregation {
    None,
    Partial,
    Full,
    FullCertified,
}

impl Segregation {
    pub const ALL: [Segregation; 4] = [Self::None, Self::Partial, Self::Full, Self::FullCertified];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Partial => "Partial",
            Self::Full => "Full",
            Self::FullCertified => "FullCertified",
        }
    }
}

/// Vocabulary a mitigation's claim is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MitigationFamily {
    Robustness,
    Segregation,
    Flag,
}

impl MitigationFamily {
    /// Every level a claim of this family may take.
    pub fn levels(&self) -> Vec<&'static str> {
        match self {
            Self::Robustness => Robustness::ALL.iter().map(Robustness::as_str).collect(),
            Self::Segregation => Segregation::ALL.iter().map(Segregation::as_str).collect(),
            Self::Flag => vec!["false", "true"],
        }
    }

    /// Level meaning "nothing claimed"; credits 0 unless the table says otherwise.
    pub fn unclaimed(&self) -> &'static str {
        match self {
            Self::Robustness => Robustness::None.as_str(),
            Self::Segregation => Segregation::None.as_str(),
            Self::Flag => "false",
        }
    }

    fn accepts(&self, value: &FactValue) -> bool {
        match self {
            Self::Flag => matches!(value, FactValue::Flag(_)),
            Self::Robustness | Self::Segregation => matches!(value, FactValue::Category(_)),
        }
    }
}

impl fmt::Display for MitigationFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Robustness => "robustness",
            Self::Segregation => "segregation",
            Self::Flag => "flag",
        };
        f.write_str(name)
    }
}

/// One configured mitigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MitigationDefinition {
    pub id: String,

    #[serde(default)]
    pub title: Option<String>,

    /// Fact holding the claimed level
    pub field: String,

    pub family: MitigationFamily,

    /// Applicability predicate; empty means always applicable
    #[serde(default)]
    pub applicable_when: RuleCondition,

    /// Signed credit per claimed level
    #[serde(default)]
    pub credits: BTreeMap<String, i32>,

    #[serde(default)]
    pub evidence_only: bool,

    pub citation: Citation,

    #[serde(default)]
    pub note: Option<String>,
}

impl MitigationDefinition {
    /// Claimed level as written in the facts, if any.
    pub fn claimed_level(&self, facts: &FactMap) -> Option<String> {
        facts.get(&self.field).map(FactValue::as_key)
    }

    /// True when the facts claim anything beyond the unclaimed level.
    pub fn is_claimed(&self, facts: &FactMap) -> bool {
        self.claimed_level(facts)
            .is_some_and(|level| level != self.family.unclaimed())
    }

    pub fn is_applicable(&self, facts: &FactMap) -> bool {
        self.applicable_when.matches(facts)
    }

    /// Credit for a level; `None` when the level is not defined.
    pub fn credit_for(&self, level: &str) -> Option<i32> {
        if self.evidence_only {
            return Some(0);
        }
        self.credits
            .get(level)
            .copied()
            .or_else(|| (level == self.family.unclaimed()).then_some(0))
    }

    /// Credit claimed by the facts; absent claims credit nothing.
    pub fn claimed_credit(&self, facts: &FactMap) -> i32 {
        self.claimed_level(facts)
            .and_then(|level| self.credit_for(&level))
            .unwrap_or(0)
    }

    /// Reject claims whose level this mitigation does not define.
    pub fn validate_claim(&self, facts: &FactMap) -> FactValidation<()> {
        let Some(value) = facts.get(&self.field) else {
            return validation_success(());
        };
        if !self.family.accepts(value) {
            return field_failure(
                &self.field,
                format!(
                    "mitigation {} expects a {} claim, got {} '{}'",
                    self.id,
                    self.family,
                    value.kind_name(),
                    value
                ),
            );
        }
        let level = value.as_key();
        match self.credit_for(&level) {
            Some(_) => validation_success(()),
            None => field_failure(
                &self.field,
                format!(
                    "claim level '{}' is not defined for mitigation {} (defined: {})",
                    level,
                    self.id,
                    self.defined_levels().join(", ")
                ),
            ),
        }
    }

    fn defined_levels(&self) -> Vec<String> {
        let mut levels: Vec<String> = vec![self.family.unclaimed().to_string()];
        for level in self.credits.keys() {
            if !levels.contains(level) {
                levels.push(level.clone());
            }
        }
        levels
    }

    /// Load-time consistency check.
    pub fn check(&self) -> Result<()> {
        let context = format!("mitigation {}", self.id);
        if self.id.trim().is_empty() || self.field.trim().is_empty() {
            return Err(SoraError::configuration(format!(
                "{} needs a non-empty id and field",
                context
            )));
        }
        self.citation.check(&context)?;

        let levels = self.family.levels();
        if let Some(unknown) = self.credits.keys().find(|l| !levels.contains(&l.as_str())) {
            return Err(SoraError::configuration(format!(
                "{} credits level '{}' which is not a {} level",
                context, unknown, self.family
            )));
        }
        if self.evidence_only && self.credits.values().any(|c| *c != 0) {
            return Err(SoraError::configuration(format!(
                "{} is evidence-only but declares non-zero credit",
                context
            )));
        }
        Ok(())
    }
}
