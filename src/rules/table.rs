//! Ordered classification tables.
//!
//! Rules are evaluated in declaration order and the first match wins. More
//! specific rules must therefore be declared before generic ones; the table
//! never reorders them. When nothing matches, a fallback keyed by one
//! categorical fact supplies the value under its own citation.

use super::{Classification, RuleCondition};
use crate::facts::FactMap;
use crate::trace::Citation;
use std::collections::BTreeMap;

/// One row of a classification table.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRule {
    pub condition: RuleCondition,
    pub result: Classification,
    pub citation: Citation,
    /// Per-step floor (ordinal) attached to the bucket this rule represents
    pub floor: Option<u8>,
    pub notes: Option<String>,
}

/// Value used when no rule matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback {
    /// Categorical fact selecting the fallback bucket
    pub field: String,
    pub values: BTreeMap<String, Classification>,
    pub default: Classification,
    pub citation: Citation,
}

impl Fallback {
    fn lookup(&self, facts: &FactMap) -> (Classification, FactMap) {
        match facts.get(&self.field) {
            Some(value) => {
                let result = self
                    .values
                    .get(&value.as_key())
                    .unwrap_or(&self.default)
                    .clone();
                let consumed = FactMap::from([(self.field.clone(), value.clone())]);
                (result, consumed)
            }
            None => (self.default.clone(), FactMap::new()),
        }
    }
}

/// Where a resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Absolute override, checked before the table; mitigation is skipped
    Override(usize),
    /// Table rule at this declaration index
    Rule(usize),
    Fallback,
}

/// Result of resolving the initial classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: Classification,
    pub citation: Citation,
    /// Only the facts the matching condition referenced
    pub consumed: FactMap,
    pub floor: Option<u8>,
    pub source: ResolutionSource,
    pub notes: Option<String>,
}

/// Ordered rule list plus fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationTable {
    rules: Vec<ClassificationRule>,
    fallback: Fallback,
}

impl ClassificationTable {
    pub fn new(rules: Vec<ClassificationRule>, fallback: Fallback) -> Self {
        Self { rules, fallback }
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn fallback(&self) -> &Fallback {
        &self.fallback
    }

    /// First matching rule in declaration order, else the fallback.
    pub fn resolve(&self, facts: &FactMap) -> Resolution {
        match first_match(&self.rules, facts) {
            Some((index, rule)) => resolution(rule, facts, ResolutionSource::Rule(index)),
            None => {
                let (value, consumed) = self.fallback.lookup(facts);
                Resolution {
                    value,
                    citation: self.fallback.citation.clone(),
                    consumed,
                    floor: None,
                    source: ResolutionSource::Fallback,
                    notes: Some(format!("no rule matched; fallback keyed by '{}'", self.fallback.field)),
                }
            }
        }
    }
}

/// Check absolute overrides, which bypass the table and the pipeline.
pub fn resolve_override(overrides: &[ClassificationRule], facts: &FactMap) -> Option<Resolution> {
    first_match(overrides, facts)
        .map(|(index, rule)| resolution(rule, facts, ResolutionSource::Override(index)))
}

fn first_match<'a>(
    rules: &'a [ClassificationRule],
    facts: &FactMap,
) -> Option<(usize, &'a ClassificationRule)> {
    rules
        .iter()
        .enumerate()
        .find(|(_, rule)| rule.condition.matches(facts))
}

fn resolution(rule: &ClassificationRule, facts: &FactMap, source: ResolutionSource) -> Resolution {
    Resolution {
        value: rule.result.clone(),
        citation: rule.citation.clone(),
        consumed: rule.condition.consumed(facts),
        floor: rule.floor,
        source,
        notes: rule.notes.clone(),
    }
}
