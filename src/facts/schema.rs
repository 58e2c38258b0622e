//! Declared fact vocabulary of a risk model.
//!
//! Each model lists the fields it understands with their kind, whether they
//! are required, numeric bounds and the closed set of categories. Facts not
//! declared here pass through untouched so newer clients can send fields an
//! older profile does not know about.

use super::{FactMap, FactValue};
use crate::effects::{
    combine_validations, field_failure, validation_map, validation_success, FactValidation,
};
use crate::errors::{Result, SoraError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of value a field must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    Number,
    Flag,
    Category,
}

impl FactKind {
    fn accepts(self, value: &FactValue) -> bool {
        matches!(
            (self, value),
            (FactKind::Number, FactValue::Number(_))
                | (FactKind::Flag, FactValue::Flag(_))
                | (FactKind::Category, FactValue::Category(_))
        )
    }

    fn name(self) -> &'static str {
        match self {
            FactKind::Number => "number",
            FactKind::Flag => "flag",
            FactKind::Category => "category",
        }
    }
}

/// Declaration of one fact field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub kind: FactKind,

    #[serde(default)]
    pub required: bool,

    /// Inclusive lower bound for numbers
    #[serde(default)]
    pub min: Option<f64>,

    /// Inclusive upper bound for numbers
    #[serde(default)]
    pub max: Option<f64>,

    /// Canonical spellings of the allowed categories
    #[serde(default)]
    pub allowed: Vec<String>,

    /// Value filled in by normalization when the field is absent
    #[serde(default)]
    pub default: Option<FactValue>,

    #[serde(default)]
    pub description: Option<String>,
}

/// The full set of declared fields for one risk model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactSchema {
    pub fields: BTreeMap<String, FieldSpec>,
}

impl FactSchema {
    pub fn get(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.get(field)
    }

    /// Canonical spelling of `raw` for a categorical field, ignoring case.
    pub fn canonical_category(&self, field: &str, raw: &str) -> Option<&str> {
        self.fields.get(field).and_then(|spec| {
            spec.allowed
                .iter()
                .find(|allowed| allowed.eq_ignore_ascii_case(raw))
                .map(String::as_str)
        })
    }

    /// Load-time consistency check of the declarations themselves.
    pub fn check(&self) -> Result<()> {
        for (name, spec) in &self.fields {
            if let (Some(min), Some(max)) = (spec.min, spec.max) {
                if min > max {
                    return Err(SoraError::configuration(format!(
                        "schema field '{}' has min {} greater than max {}",
                        name, min, max
                    )));
                }
            }
            if spec.kind == FactKind::Category && spec.allowed.is_empty() {
                return Err(SoraError::configuration(format!(
                    "categorical schema field '{}' declares no allowed values",
                    name
                )));
            }
            if let Some(default) = &spec.default {
                if !spec.kind.accepts(default) {
                    return Err(SoraError::configuration(format!(
                        "schema field '{}' default {} is not a {}",
                        name,
                        default,
                        spec.kind.name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate normalized facts, accumulating one error per offending field.
    pub fn validate(&self, facts: &FactMap) -> FactValidation<()> {
        let checks = self
            .fields
            .iter()
            .map(|(name, spec)| validate_field(name, spec, facts.get(name)))
            .collect();
        validation_map(combine_validations(checks), |_| ())
    }
}

fn validate_field(name: &str, spec: &FieldSpec, value: Option<&FactValue>) -> FactValidation<()> {
    let Some(value) = value else {
        return if spec.required {
            field_failure(name, "is required")
        } else {
            validation_success(())
        };
    };

    if !spec.kind.accepts(value) {
        return field_failure(
            name,
            format!("expected a {}, got {} '{}'", spec.kind.name(), value.kind_name(), value),
        );
    }

    match value {
        FactValue::Number(n) => validate_range(name, spec, *n),
        FactValue::Category(c) if !spec.allowed.iter().any(|a| a == c) => field_failure(
            name,
            format!("unknown value '{}' (expected one of: {})", c, spec.allowed.join(", ")),
        ),
        _ => validation_success(()),
    }
}

fn validate_range(name: &str, spec: &FieldSpec, n: f64) -> FactValidation<()> {
    if !n.is_finite() {
        return field_failure(name, "must be a finite number");
    }
    if let Some(min) = spec.min {
        if n < min {
            return field_failure(name, format!("must be >= {}, got {}", min, n));
        }
    }
    if let Some(max) = spec.max {
        if n > max {
            return field_failure(name, format!("must be <= {}, got {}", max, n));
        }
    }
    validation_success(())
}
