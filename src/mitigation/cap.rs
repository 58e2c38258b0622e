//! Cap on the total mitigation credit.
//!
//! A policy is an ordered list of named branches; the first branch whose
//! condition holds supplies the cap. The last branch must be unconditional so
//! selection is total. Selection always looks at the final claim state of every
//! mitigation, never at a partially accumulated one, so the order in which
//! mitigations are declared cannot change which cap applies.

use super::MitigationDefinition;
use crate::errors::{Result, SoraError};
use crate::facts::FactMap;
use crate::rules::RuleCondition;
use crate::trace::Citation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// When the cap is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapTiming {
    /// `min(total, cap)` once every credit has been summed
    #[default]
    AfterSum,
    /// Each positive step is truncated to the remaining headroom
    PerStep,
}

/// One named cap branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapBranch {
    pub name: String,

    #[serde(default)]
    pub when: RuleCondition,

    /// Mitigations that must contribute positive credit for the branch to apply
    #[serde(default)]
    pub requires: Vec<String>,

    pub cap: i32,

    pub citation: Citation,
}

impl CapBranch {
    fn is_unconditional(&self) -> bool {
        self.when.is_unconditional() && self.requires.is_empty()
    }

    fn selects(&self, facts: &FactMap, credited: &BTreeSet<&str>) -> bool {
        self.when.matches(facts) && self.requires.iter().all(|id| credited.contains(id.as_str()))
    }
}

/// Ordered cap branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapPolicy {
    branches: Vec<CapBranch>,
}

impl CapPolicy {
    pub fn new(branches: Vec<CapBranch>) -> Self {
        Self { branches }
    }

    pub fn branches(&self) -> &[CapBranch] {
        &self.branches
    }

    /// First branch matching the final mitigation state.
    ///
    /// `credited` holds the ids of every applicable mitigation with positive
    /// claimed credit.
    pub fn select(&self, facts: &FactMap, credited: &BTreeSet<&str>) -> Option<&CapBranch> {
        self.branches.iter().find(|branch| branch.selects(facts, credited))
    }

    pub fn check(&self, definitions: &[MitigationDefinition]) -> Result<()> {
        let Some(last) = self.branches.last() else {
            return Err(SoraError::configuration("cap policy has no branches"));
        };
        if !last.is_unconditional() {
            return Err(SoraError::configuration(format!(
                "last cap branch '{}' must be unconditional",
                last.name
            )));
        }
        for branch in &self.branches {
            let context = format!("cap branch '{}'", branch.name);
            branch.citation.check(&context)?;
            if branch.cap < 0 {
                return Err(SoraError::configuration(format!("{} has a negative cap", context)));
            }
            if let Some(unknown) = branch
                .requires
                .iter()
                .find(|id| !definitions.iter().any(|d| &d.id == *id))
            {
                return Err(SoraError::configuration(format!(
                    "{} requires unknown mitigation '{}'",
                    context, unknown
                )));
            }
        }
        Ok(())
    }
}
