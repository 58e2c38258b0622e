//! Risk classification of one family under one version profile.
//!
//! Pure orchestration: normalize, validate, check overrides, resolve the
//! initial class, run the mitigation pipeline and assemble the trace. The
//! same facts and the same profile always give an equal [`RiskResult`].

use crate::effects::run_validation;
use crate::errors::Result;
use crate::facts::FactMap;
use crate::profile::{MethodologyVersion, RiskFamily, RiskModel, VersionProfile};
use crate::rules::{resolve_override, Classification, Resolution};
use crate::trace::{TraceEntry, TraceRecorder};
use serde::{Deserialize, Serialize};
use tracing::debug_span;

/// Outcome of classifying one risk family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResult {
    pub version: MethodologyVersion,
    pub family: RiskFamily,
    /// Facts after normalization
    pub facts: FactMap,
    pub initial: Classification,
    pub residual: Classification,
    pub total_credit: i32,
    pub applied_mitigations: Vec<String>,
    pub supporting_evidence: Vec<String>,
    pub trace: Vec<TraceEntry>,
}

/// Classifier bound to one profile.
#[derive(Debug, Clone, Copy)]
pub struct RiskClassifier<'a> {
    profile: &'a VersionProfile,
}

impl<'a> RiskClassifier<'a> {
    pub fn new(profile: &'a VersionProfile) -> Self {
        Self { profile }
    }

    pub fn classify(&self, family: RiskFamily, raw: &FactMap) -> Result<RiskResult> {
        let version = self.profile.version;
        let model = self.profile.model(family);
        let _span = debug_span!("classify", %version, %family).entered();

        let facts = model.normalize(raw);
        run_validation(model.validate(&facts))?;

        let mut trace = TraceRecorder::new();
        let outcome = match resolve_override(&model.overrides, &facts) {
            Some(resolution) => overridden(resolution, &mut trace),
            None => resolved(model, &facts, &mut trace),
        };

        Ok(RiskResult {
            version,
            family,
            facts,
            initial: outcome.initial,
            residual: outcome.residual,
            total_credit: outcome.total_credit,
            applied_mitigations: outcome.applied,
            supporting_evidence: outcome.evidence,
            trace: trace.finish(),
        })
    }
}

struct Outcome {
    initial: Classification,
    residual: Classification,
    total_credit: i32,
    applied: Vec<String>,
    evidence: Vec<String>,
}

impl Outcome {
    fn unmitigated(value: Classification) -> Self {
        Self {
            initial: value.clone(),
            residual: value,
            total_credit: 0,
            applied: Vec::new(),
            evidence: Vec::new(),
        }
    }
}

fn overridden(resolution: Resolution, trace: &mut TraceRecorder) -> Outcome {
    let mut entry = TraceEntry::new("override", resolution.value.to_string(), resolution.citation.clone())
        .with_inputs(resolution.consumed);
    if let Some(notes) = resolution.notes {
        entry = entry.with_note(notes);
    }
    trace.record(entry);
    trace.record(
        TraceEntry::new("mitigation", "skipped", resolution.citation)
            .with_note("absolute override applies; mitigation is not evaluated"),
    );
    Outcome::unmitigated(resolution.value)
}

fn resolved(model: &RiskModel, facts: &FactMap, trace: &mut TraceRecorder) -> Outcome {
    let resolution = model.table.resolve(facts);
    let mut entry = TraceEntry::new("initial", resolution.value.to_string(), resolution.citation.clone())
        .with_inputs(resolution.consumed.clone());
    if let Some(notes) = &resolution.notes {
        entry = entry.with_note(notes.clone());
    }
    trace.record(entry);

    let Classification::Ranked(initial) = &resolution.value else {
        trace.record(
            TraceEntry::new("mitigation", "skipped", resolution.citation.clone())
                .with_note("initial classification is out of scope"),
        );
        return Outcome::unmitigated(resolution.value);
    };

    let result = model
        .pipeline
        .apply(initial, resolution.floor, &model.scale, facts, trace);
    trace.record(
        TraceEntry::new("residual", result.residual.label.clone(), model.citation.clone()).with_note(
            format!("initial {} with total credit {}", initial.label, result.total_credit),
        ),
    );

    Outcome {
        initial: resolution.value.clone(),
        residual: Classification::Ranked(result.residual),
        total_credit: result.total_credit,
        applied: result.applied,
        evidence: result.evidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{fact_map, FactValue};
    use crate::profile::ProfileSet;
    use pretty_assertions::assert_eq;

    fn classify(version: MethodologyVersion, family: RiskFamily, facts: FactMap) -> RiskResult {
        let profiles = ProfileSet::builtin().unwrap();
        RiskClassifier::new(profiles.get(version).unwrap())
            .classify(family, &facts)
            .unwrap()
    }

    #[test]
    fn test_small_aircraft_override_skips_mitigation() {
        let facts = fact_map([
            ("dimension", FactValue::from(0.3)),
            ("maxSpeed", 19.into()),
            ("mass", 0.249.into()),
            ("populationDensity", 20000.into()),
            ("m1b", "High".into()),
        ]);
        let result = classify(MethodologyVersion::V2_5, RiskFamily::Ground, facts);
        assert_eq!(result.initial.label(), "1");
        assert_eq!(result.residual.label(), "1");
        assert!(result.applied_mitigations.is_empty());
        let steps: Vec<_> = result.trace.iter().map(|e| (e.step.as_str(), e.result.as_str())).collect();
        assert_eq!(steps, vec![("override", "1"), ("mitigation", "skipped")]);
    }

    #[test]
    fn test_out_of_scope_initial_is_not_mitigated() {
        let facts = fact_map([
            ("dimension", FactValue::from(45)),
            ("maxSpeed", 60.into()),
            ("mass", 900.into()),
            ("populationDensity", 10.into()),
            ("m1b", "High".into()),
        ]);
        let result = classify(MethodologyVersion::V2_5, RiskFamily::Ground, facts);
        assert!(result.initial.is_out_of_scope());
        assert!(result.residual.is_out_of_scope());
        assert_eq!(result.total_credit, 0);
    }

    #[test]
    fn test_ground_2_5_mitigated() {
        let facts = fact_map([
            ("dimension", FactValue::from(2.5)),
            ("maxSpeed", 30.into()),
            ("mass", 4.into()),
            ("populationDensity", 300.into()),
            ("m1a", "Medium".into()),
            ("m2", "High".into()),
        ]);
        let result = classify(MethodologyVersion::V2_5, RiskFamily::Ground, facts);
        assert_eq!(result.initial.label(), "5");
        assert_eq!(result.residual.label(), "1");
        assert_eq!(result.total_credit, 4);
        assert_eq!(result.applied_mitigations, vec!["M1A", "M2"]);
    }

    #[test]
    fn test_ground_2_0_per_step_column_floor() {
        let facts = fact_map([
            ("operationType", FactValue::from("evlos")),
            ("groundScenario", "Sparse".into()),
            ("dimension", 2.into()),
            ("mass", 10.into()),
            ("maxSpeed", 20.into()),
            ("m1", "High".into()),
            ("m3", "Medium".into()),
        ]);
        let result = classify(MethodologyVersion::V2_0, RiskFamily::Ground, facts);
        // VLOS sparse, column 2: GRC 3 with column floor 2
        assert_eq!(result.initial.label(), "3");
        assert_eq!(result.residual.label(), "2");
        assert_eq!(result.facts["operationType"], FactValue::from("VLOS"));
        assert!(result.trace.iter().any(|e| e.step == "floor"));
    }

    #[test]
    fn test_validation_reports_every_bad_field() {
        let profiles = ProfileSet::builtin().unwrap();
        let classifier = RiskClassifier::new(profiles.get(MethodologyVersion::V2_5).unwrap());
        let facts = fact_map([
            ("airspace", FactValue::from("Z")),
            ("proximity", "Near".into()),
            ("altitude", (-5).into()),
            ("segregation", "Total".into()),
        ]);
        let err = classifier.classify(RiskFamily::Air, &facts).unwrap_err();
        let fields: Vec<_> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"airspace"));
        assert!(fields.contains(&"altitude"));
        assert!(fields.contains(&"trafficDensity"));
        assert!(fields.contains(&"segregation"));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let facts = fact_map([
            ("airspace", FactValue::from("C")),
            ("trafficDensity", 2.into()),
            ("proximity", "Outside".into()),
            ("altitude", 200.into()),
            ("segregation", "Full".into()),
        ]);
        let a = classify(MethodologyVersion::V2_5, RiskFamily::Air, facts.clone());
        let b = classify(MethodologyVersion::V2_5, RiskFamily::Air, facts);
        assert_eq!(a, b);
        assert_eq!(a.initial.label(), "d");
        assert_eq!(a.residual.label(), "c");
    }
}
