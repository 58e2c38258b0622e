//! Structured rule conditions and their evaluation against a fact map.
//!
//! A condition is written in rule files as a flat object whose keys are fact
//! names, optionally suffixed to pick a comparator:
//!
//! | key            | comparator                     |
//! |----------------|--------------------------------|
//! | `field`        | equals                         |
//! | `field_in`     | set membership                 |
//! | `field_gt`     | greater than                   |
//! | `field_gte`    | greater than or equal          |
//! | `field_lt`     | less than                      |
//! | `field_lte`    | less than or equal             |
//!
//! The numeric comparators take a scalar or a list; a list means the clause
//! holds when ANY element satisfies it. Clauses are ANDed together.
//!
//! A clause whose field is absent from the facts is treated as satisfied.
//! Rule files stay forward compatible this way, at the price that a missing
//! fact silently weakens the condition; schemas therefore give every field
//! a rule depends on either `required: true` or a default.
//!
//! Conditions are checked for shape when they are deserialized, so
//! [`RuleCondition::matches`] is a total function.

use crate::facts::{FactMap, FactValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Numeric threshold, scalar or any-of list.
#[derive(Debug, Clone, PartialEq)]
pub enum Threshold {
    One(f64),
    AnyOf(Vec<f64>),
}

impl Threshold {
    fn holds(&self, value: f64, cmp: impl Fn(f64, f64) -> bool) -> bool {
        match self {
            Threshold::One(t) => cmp(value, *t),
            Threshold::AnyOf(ts) => ts.iter().any(|t| cmp(value, *t)),
        }
    }
}

/// Comparator with its expected operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparator {
    Equals(FactValue),
    InSet(Vec<FactValue>),
    GreaterThan(Threshold),
    AtLeast(Threshold),
    LessThan(Threshold),
    AtMost(Threshold),
}

impl Comparator {
    fn suffix(&self) -> &'static str {
        match self {
            Comparator::Equals(_) => "",
            Comparator::InSet(_) => "_in",
            Comparator::GreaterThan(_) => "_gt",
            Comparator::AtLeast(_) => "_gte",
            Comparator::LessThan(_) => "_lt",
            Comparator::AtMost(_) => "_lte",
        }
    }

    fn holds(&self, actual: &FactValue) -> bool {
        match self {
            Comparator::Equals(expected) => values_equal(actual, expected),
            Comparator::InSet(set) => set.iter().any(|expected| values_equal(actual, expected)),
            Comparator::GreaterThan(t) => numeric(actual, |v| t.holds(v, |a, b| a > b)),
            Comparator::AtLeast(t) => numeric(actual, |v| t.holds(v, |a, b| a >= b)),
            Comparator::LessThan(t) => numeric(actual, |v| t.holds(v, |a, b| a < b)),
            Comparator::AtMost(t) => numeric(actual, |v| t.holds(v, |a, b| a <= b)),
        }
    }
}

fn numeric(actual: &FactValue, check: impl Fn(f64) -> bool) -> bool {
    actual.as_number().map(check).unwrap_or(false)
}

fn values_equal(actual: &FactValue, expected: &FactValue) -> bool {
    match (actual, expected) {
        (FactValue::Number(a), FactValue::Number(b)) => a == b,
        (FactValue::Flag(a), FactValue::Flag(b)) => a == b,
        (FactValue::Category(a), FactValue::Category(b)) => a == b,
        _ => false,
    }
}

/// One `(field, comparator)` triple.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: String,
    pub comparator: Comparator,
}

impl Clause {
    /// Absent facts satisfy the clause.
    pub fn is_satisfied_by(&self, facts: &FactMap) -> bool {
        facts
            .get(&self.field)
            .map(|actual| self.comparator.holds(actual))
            .unwrap_or(true)
    }

    fn key(&self) -> String {
        format!("{}{}", self.field, self.comparator.suffix())
    }
}

/// A conjunction of clauses. The empty condition always matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, ConditionOperand>",
    into = "BTreeMap<String, ConditionOperand>"
)]
pub struct RuleCondition {
    clauses: Vec<Clause>,
}

impl RuleCondition {
    pub fn always() -> Self {
        Self::default()
    }

    pub fn from_clauses(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_unconditional(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluate the condition; absent fields are skipped.
    pub fn matches(&self, facts: &FactMap) -> bool {
        self.clauses.iter().all(|clause| clause.is_satisfied_by(facts))
    }

    /// Distinct field names the condition references, in clause order.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for clause in &self.clauses {
            if !fields.contains(&clause.field.as_str()) {
                fields.push(&clause.field);
            }
        }
        fields
    }

    /// The facts this condition actually consumed, for trace entries.
    pub fn consumed(&self, facts: &FactMap) -> FactMap {
        self.referenced_fields()
            .into_iter()
            .filter_map(|field| facts.get(field).map(|v| (field.to_string(), v.clone())))
            .collect()
    }
}

impl fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return f.write_str("always");
        }
        let parts: Vec<String> = self
            .clauses
            .iter()
            .map(|c| format!("{}={}", c.key(), operand_text(&c.comparator)))
            .collect();
        f.write_str(&parts.join(" & "))
    }
}

fn operand_text(comparator: &Comparator) -> String {
    match ConditionOperand::from(comparator.clone()) {
        ConditionOperand::One(v) => v.to_string(),
        ConditionOperand::Many(vs) => {
            let items: Vec<String> = vs.iter().map(ToString::to_string).collect();
            format!("[{}]", items.join(","))
        }
    }
}

/// Raw operand as written in a rule file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionOperand {
    One(FactValue),
    Many(Vec<FactValue>),
}

impl From<Comparator> for ConditionOperand {
    fn from(comparator: Comparator) -> Self {
        let threshold = |t: Threshold| match t {
            Threshold::One(n) => ConditionOperand::One(FactValue::Number(n)),
            Threshold::AnyOf(ns) => {
                ConditionOperand::Many(ns.into_iter().map(FactValue::Number).collect())
            }
        };
        match comparator {
            Comparator::Equals(v) => ConditionOperand::One(v),
            Comparator::InSet(vs) => ConditionOperand::Many(vs),
            Comparator::GreaterThan(t)
            | Comparator::AtLeast(t)
            | Comparator::LessThan(t)
            | Comparator::AtMost(t) => threshold(t),
        }
    }
}

impl TryFrom<BTreeMap<String, ConditionOperand>> for RuleCondition {
    type Error = String;

    fn try_from(raw: BTreeMap<String, ConditionOperand>) -> Result<Self, Self::Error> {
        raw.into_iter()
            .map(|(key, operand)| parse_clause(&key, operand))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::from_clauses)
    }
}

impl From<RuleCondition> for BTreeMap<String, ConditionOperand> {
    fn from(condition: RuleCondition) -> Self {
        condition
            .clauses
            .into_iter()
            .map(|clause| (clause.key(), ConditionOperand::from(clause.comparator)))
            .collect()
    }
}

const SUFFIXES: [&str; 5] = ["_gte", "_lte", "_gt", "_lt", "_in"];

fn parse_clause(key: &str, operand: ConditionOperand) -> Result<Clause, String> {
    let (field, suffix) = SUFFIXES
        .iter()
        .find_map(|s| key.strip_suffix(s).map(|field| (field, *s)))
        .unwrap_or((key, ""));

    if field.is_empty() {
        return Err(format!("condition key '{}' names no field", key));
    }

    let comparator = match suffix {
        "" => match operand {
            ConditionOperand::One(v) => Comparator::Equals(v),
            ConditionOperand::Many(_) => {
                return Err(format!("'{}' compares for equality but got a list; use '{}_in'", key, field))
            }
        },
        "_in" => match operand {
            ConditionOperand::Many(vs) if !vs.is_empty() => Comparator::InSet(vs),
            _ => return Err(format!("'{}' needs a non-empty list", key)),
        },
        "_gt" => Comparator::GreaterThan(parse_threshold(key, operand)?),
        "_gte" => Comparator::AtLeast(parse_threshold(key, operand)?),
        "_lt" => Comparator::LessThan(parse_threshold(key, operand)?),
        _ => Comparator::AtMost(parse_threshold(key, operand)?),
    };

    Ok(Clause {
        field: field.to_string(),
        comparator,
    })
}

fn parse_threshold(key: &str, operand: ConditionOperand) -> Result<Threshold, String> {
    let number = |v: &FactValue| {
        v.as_number()
            .filter(|n| n.is_finite())
            .ok_or_else(|| format!("'{}' needs numeric thresholds, got '{}'", key, v))
    };
    match operand {
        ConditionOperand::One(v) => Ok(Threshold::One(number(&v)?)),
        ConditionOperand::Many(vs) if vs.is_empty() => {
            Err(format!("'{}' needs at least one threshold", key))
        }
        ConditionOperand::Many(vs) => vs
            .iter()
            .map(number)
            .collect::<Result<Vec<_>, _>>()
            .map(Threshold::AnyOf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::fact_map;

    fn cond(yaml: &str) -> RuleCondition {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn facts() -> FactMap {
        fact_map([
            ("airspace", FactValue::from("E")),
            ("altitude", 150.into()),
            ("trafficDensity", 4.into()),
            ("atypical", false.into()),
        ])
    }

    #[test]
    fn test_equality_and_membership() {
        assert!(cond("{ airspace: E }").matches(&facts()));
        assert!(!cond("{ airspace: G }").matches(&facts()));
        assert!(cond("{ airspace_in: [C, D, E] }").matches(&facts()));
        assert!(!cond("{ airspace_in: [A, B] }").matches(&facts()));
        assert!(cond("{ atypical: false }").matches(&facts()));
    }

    #[test]
    fn test_numeric_comparators() {
        assert!(cond("{ altitude_gt: 120 }").matches(&facts()));
        assert!(!cond("{ altitude_gt: 150 }").matches(&facts()));
        assert!(cond("{ altitude_gte: 150 }").matches(&facts()));
        assert!(cond("{ trafficDensity_lt: 5 }").matches(&facts()));
        assert!(cond("{ trafficDensity_lte: 4 }").matches(&facts()));
        assert!(!cond("{ trafficDensity_lt: 4 }").matches(&facts()));
    }

    #[test]
    fn test_list_threshold_means_any_element() {
        // 150 > 200 fails but 150 > 100 holds
        assert!(cond("{ altitude_gt: [200, 100] }").matches(&facts()));
        assert!(!cond("{ altitude_gt: [200, 300] }").matches(&facts()));
        assert!(cond("{ trafficDensity_lt: [1, 5] }").matches(&facts()));
    }

    #[test]
    fn test_clauses_are_anded() {
        assert!(cond("{ airspace: E, altitude_gt: 120 }").matches(&facts()));
        assert!(!cond("{ airspace: E, altitude_gt: 200 }").matches(&facts()));
    }

    #[test]
    fn test_absent_field_is_satisfied() {
        assert!(cond("{ overUrban: true }").matches(&facts()));
        assert!(cond("{ airspace: E, segregation_in: [Full] }").matches(&facts()));
    }

    #[test]
    fn test_type_mismatch_does_not_match() {
        assert!(!cond("{ airspace_gt: 3 }").matches(&facts()));
        assert!(!cond("{ altitude: high }").matches(&facts()));
    }

    #[test]
    fn test_empty_condition_always_matches() {
        let always = RuleCondition::always();
        assert!(always.matches(&FactMap::new()));
        assert_eq!(always.to_string(), "always");
    }

    #[test]
    fn test_malformed_conditions_rejected_at_load() {
        assert!(serde_yaml::from_str::<RuleCondition>("{ airspace: [A, B] }").is_err());
        assert!(serde_yaml::from_str::<RuleCondition>("{ airspace_in: [] }").is_err());
        assert!(serde_yaml::from_str::<RuleCondition>("{ altitude_gt: high }").is_err());
        assert!(serde_yaml::from_str::<RuleCondition>("{ _gt: 3 }").is_err());
    }

    #[test]
    fn test_consumed_lists_only_referenced_present_fields() {
        let c = cond("{ airspace_in: [E], altitude_gt: 120, overUrban: true }");
        let consumed = c.consumed(&facts());
        assert_eq!(consumed.len(), 2);
        assert!(consumed.contains_key("airspace"));
        assert!(consumed.contains_key("altitude"));
    }

    #[test]
    fn test_serialize_round_trips_keys() {
        let c = cond("{ altitude_lte: [120, 150], airspace: G }");
        let yaml = serde_yaml::to_string(&c).unwrap();
        assert_eq!(serde_yaml::from_str::<RuleCondition>(&yaml).unwrap(), c);
    }
}
