//! Boundary normalization of raw request facts.
//!
//! Runs exactly once per request, before validation and before any rule sees
//! the facts. The steps, in order:
//!
//! 1. unit conversions (`altitudeFt` to metres, ...); the source field is dropped
//!    and an already-present target wins
//! 2. derived kinetic energy `½·m·v²` when absent
//! 3. case folding of declared categories onto their canonical spelling
//! 4. per-model aliases (one category folded into another)
//! 5. schema defaults for absent optional fields
//!
//! Every step is a no-op on its own output, so `normalize` is idempotent.

use super::{FactMap, FactSchema, FactValue};
use crate::errors::{Result, SoraError};
use serde::{Deserialize, Serialize};

/// Convert `from` into `to` by multiplying with `factor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitConversion {
    pub from: String,
    pub to: String,
    pub factor: f64,
}

/// Fold category `from` of `field` into `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Alias {
    pub field: String,
    pub from: String,
    pub to: String,
}

/// Inputs and output of the derived kinetic energy fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KineticEnergy {
    /// Mass field, kilograms
    pub mass: String,
    /// Speed field, metres per second
    pub speed: String,
    /// Output field, joules
    pub into: String,
}

/// Per-model normalization settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizationConfig {
    #[serde(default)]
    pub conversions: Vec<UnitConversion>,

    #[serde(default)]
    pub kinetic_energy: Option<KineticEnergy>,

    #[serde(default)]
    pub aliases: Vec<Alias>,
}

impl NormalizationConfig {
    /// Reject configurations that would make normalization non-idempotent.
    pub fn check(&self) -> Result<()> {
        for conversion in &self.conversions {
            if !conversion.factor.is_finite() || conversion.factor <= 0.0 {
                return Err(SoraError::configuration(format!(
                    "conversion {} -> {} needs a positive factor",
                    conversion.from, conversion.to
                )));
            }
            if self.conversions.iter().any(|c| c.from == conversion.to) {
                return Err(SoraError::configuration(format!(
                    "conversion target '{}' is itself converted",
                    conversion.to
                )));
            }
        }
        for alias in &self.aliases {
            let chained = self
                .aliases
                .iter()
                .any(|a| a.field == alias.field && a.from.eq_ignore_ascii_case(&alias.to));
            if chained {
                return Err(SoraError::configuration(format!(
                    "alias {}: {} -> {} chains into another alias",
                    alias.field, alias.from, alias.to
                )));
            }
        }
        Ok(())
    }
}

/// Normalize raw facts for one risk model.
pub fn normalize(raw: &FactMap, config: &NormalizationConfig, schema: &FactSchema) -> FactMap {
    let mut facts = raw.clone();

    apply_conversions(&mut facts, &config.conversions);
    if let Some(ke) = &config.kinetic_energy {
        derive_kinetic_energy(&mut facts, ke);
    }
    fold_categories(&mut facts, schema);
    apply_aliases(&mut facts, &config.aliases);
    apply_defaults(&mut facts, schema);

    facts
}

fn apply_conversions(facts: &mut FactMap, conversions: &[UnitConversion]) {
    for conversion in conversions {
        let Some(FactValue::Number(value)) = facts.get(&conversion.from).cloned() else {
            continue;
        };
        facts.remove(&conversion.from);
        facts
            .entry(conversion.to.clone())
            .or_insert(FactValue::Number(value * conversion.factor));
    }
}

fn derive_kinetic_energy(facts: &mut FactMap, ke: &KineticEnergy) {
    if facts.contains_key(&ke.into) {
        return;
    }
    let mass = facts.get(&ke.mass).and_then(FactValue::as_number);
    let speed = facts.get(&ke.speed).and_then(FactValue::as_number);
    if let (Some(mass), Some(speed)) = (mass, speed) {
        facts.insert(ke.into.clone(), FactValue::Number(0.5 * mass * speed * speed));
    }
}

fn fold_categories(facts: &mut FactMap, schema: &FactSchema) {
    for (name, value) in facts.iter_mut() {
        if let FactValue::Category(raw) = value {
            if let Some(canonical) = schema.canonical_category(name, raw) {
                if canonical != raw.as_str() {
                    *raw = canonical.to_string();
                }
            }
        }
    }
}

fn apply_aliases(facts: &mut FactMap, aliases: &[Alias]) {
    for alias in aliases {
        if let Some(FactValue::Category(value)) = facts.get_mut(&alias.field) {
            if value.eq_ignore_ascii_case(&alias.from) {
                *value = alias.to.clone();
            }
        }
    }
}

fn apply_defaults(facts: &mut FactMap, schema: &FactSchema) {
    for (name, spec) in &schema.fields {
        if let Some(default) = &spec.default {
            facts.entry(name.clone()).or_insert_with(|| default.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::fact_map;
    use pretty_assertions::assert_eq;

    fn config() -> NormalizationConfig {
        serde_yaml::from_str(
            r#"
conversions:
  - { from: altitudeFt, to: altitude, factor: 0.3048 }
  - { from: massGrams, to: mass, factor: 0.001 }
kinetic_energy: { mass: mass, speed: maxSpeed, into: kineticEnergy }
aliases:
  - { field: operationType, from: EVLOS, to: VLOS }
"#,
        )
        .unwrap()
    }

    fn schema() -> FactSchema {
        serde_yaml::from_str(
            r#"
operationType: { kind: category, allowed: [VLOS, EVLOS, BVLOS] }
m1: { kind: category, allowed: [None, Low, Medium, High], default: None }
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_converts_feet_and_drops_source() {
        let facts = normalize(&fact_map([("altitudeFt", 500.into())]), &config(), &schema());
        assert!(!facts.contains_key("altitudeFt"));
        let altitude = facts["altitude"].as_number().unwrap();
        assert!((altitude - 152.4).abs() < 1e-9);
    }

    #[test]
    fn test_existing_target_wins_over_conversion() {
        let raw = fact_map([("altitudeFt", 500.into()), ("altitude", 10.into())]);
        let facts = normalize(&raw, &config(), &schema());
        assert_eq!(facts["altitude"], FactValue::Number(10.0));
        assert!(!facts.contains_key("altitudeFt"));
    }

    #[test]
    fn test_derives_kinetic_energy_from_grams() {
        let raw = fact_map([("massGrams", 2000.into()), ("maxSpeed", 10.into())]);
        let facts = normalize(&raw, &config(), &schema());
        let energy = facts["kineticEnergy"].as_number().unwrap();
        assert!((energy - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_case_folds_then_aliases() {
        let raw = fact_map([("operationType", "evlos".into()), ("m1", "MEDIUM".into())]);
        let facts = normalize(&raw, &config(), &schema());
        assert_eq!(facts["operationType"], FactValue::from("VLOS"));
        assert_eq!(facts["m1"], FactValue::from("Medium"));
    }

    #[test]
    fn test_defaults_fill_absent_fields_only() {
        let facts = normalize(&FactMap::new(), &config(), &schema());
        assert_eq!(facts["m1"], FactValue::from("None"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = fact_map([
            ("altitudeFt", 400.into()),
            ("massGrams", 900.into()),
            ("maxSpeed", 19.into()),
            ("operationType", "Evlos".into()),
        ]);
        let once = normalize(&raw, &config(), &schema());
        let twice = normalize(&once, &config(), &schema());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_check_rejects_alias_chain() {
        let mut cfg = config();
        cfg.aliases.push(Alias {
            field: "operationType".into(),
            from: "VLOS".into(),
            to: "BVLOS".into(),
        });
        assert!(cfg.check().is_err());
    }
}
