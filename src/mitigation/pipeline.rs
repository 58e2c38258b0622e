//! Ordered application of mitigations to an initial classification.
//!
//! The pipeline runs in three phases:
//!
//! 1. every definition is evaluated against the facts (applicability, claimed
//!    level, credit); evidence-only claims are recorded with delta 0
//! 2. the cap branch is selected from that final state
//! 3. credits are accumulated in declaration order, enforcing the cap and
//!    the floor with the configured timings
//!
//! Trace deltas are expressed in credit: a mitigation entry carries its
//! claimed credit, a truncation entry carries minus the truncated amount, so
//! the deltas of one run sum to the reported total credit.

use super::{CapPolicy, CapTiming, MitigationDefinition};
use crate::effects::{combine_validations, validation_map, FactValidation};
use crate::errors::{Result, SoraError};
use crate::facts::FactMap;
use crate::rules::{Rank, Scale};
use crate::trace::{Citation, TraceEntry, TraceRecorder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// When the floor is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorTiming {
    /// Clamp once, after all credit is applied
    #[default]
    EndOnly,
    /// Clamp after every step to the floor of the matched bucket
    PerStep,
}

/// Result of running the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub residual: Rank,
    pub total_credit: i32,
    pub applied: Vec<String>,
    pub evidence: Vec<String>,
}

/// Configured mitigations of one risk model.
#[derive(Debug, Clone, PartialEq)]
pub struct MitigationPipeline {
    pub definitions: Vec<MitigationDefinition>,
    pub cap: Option<CapPolicy>,
    pub floor_timing: FloorTiming,
    pub cap_timing: CapTiming,
    /// Cited by floor entries
    pub citation: Citation,
}

struct Candidate<'a> {
    definition: &'a MitigationDefinition,
    credit: i32,
    inputs: FactMap,
}

impl MitigationPipeline {
    pub fn check(&self) -> Result<()> {
        self.citation.check("mitigation pipeline")?;
        for (i, definition) in self.definitions.iter().enumerate() {
            definition.check()?;
            if self.definitions[..i].iter().any(|d| d.id == definition.id) {
                return Err(SoraError::configuration(format!(
                    "mitigation id '{}' is declared twice",
                    definition.id
                )));
            }
        }
        if let Some(cap) = &self.cap {
            cap.check(&self.definitions)?;
            if self.floor_timing == FloorTiming::PerStep && self.cap_timing == CapTiming::AfterSum {
                return Err(SoraError::configuration(
                    "per-step floor cannot be combined with an after-sum cap",
                ));
            }
        }
        Ok(())
    }

    /// Check every claimed level, accumulating all errors.
    pub fn validate_claims(&self, facts: &FactMap) -> FactValidation<()> {
        let checks = self
            .definitions
            .iter()
            .map(|definition| definition.validate_claim(facts))
            .collect();
        validation_map(combine_validations(checks), |_| ())
    }

    /// Apply the mitigations to `initial`.
    ///
    /// `step_floor` is the floor of the bucket matched by the initial
    /// classification; it is only consulted with [`FloorTiming::PerStep`].
    pub fn apply(
        &self,
        initial: &Rank,
        step_floor: Option<u8>,
        scale: &Scale,
        facts: &FactMap,
        trace: &mut TraceRecorder,
    ) -> PipelineOutcome {
        let mut evidence = Vec::new();
        let candidates = self.evaluate(facts, trace, &mut evidence);

        let credited: BTreeSet<&str> = candidates
            .iter()
            .filter(|c| c.credit > 0)
            .map(|c| c.definition.id.as_str())
            .collect();
        let cap = self.cap.as_ref().and_then(|policy| {
            let branch = policy.select(facts, &credited)?;
            trace.record(
                TraceEntry::new(
                    "cap_policy",
                    format!("branch '{}' caps credit at {}", branch.name, branch.cap),
                    branch.citation.clone(),
                )
                .with_inputs(branch.when.consumed(facts)),
            );
            Some(branch)
        });

        let floor = match self.floor_timing {
            FloorTiming::PerStep => step_floor.unwrap_or_else(|| scale.floor()),
            FloorTiming::EndOnly => scale.floor(),
        };
        let mut running = i32::from(initial.ordinal);
        let mut total = 0;
        let mut applied = Vec::new();

        for candidate in candidates {
            let definition = candidate.definition;
            let allowed = match cap {
                Some(branch) if self.cap_timing == CapTiming::PerStep && candidate.credit > 0 => {
                    candidate.credit.min(branch.cap - total).max(0)
                }
                _ => candidate.credit,
            };

            trace.record(
                TraceEntry::new(
                    "mitigation",
                    format!("{} credits {}", definition.id, candidate.credit),
                    definition.citation.clone(),
                )
                .with_inputs(candidate.inputs)
                .with_delta(candidate.credit),
            );
            if let Some(branch) = cap.filter(|_| allowed < candidate.credit) {
                trace.record(truncation(branch, candidate.credit - allowed, &definition.id));
            }
            if allowed != 0 {
                applied.push(definition.id.clone());
            }

            total += allowed;
            running -= allowed;
            if self.floor_timing == FloorTiming::PerStep && running < i32::from(floor) {
                trace.record(floor_entry(initial, floor, scale, running, &self.citation));
                running = i32::from(floor);
            }
        }

        if let Some(branch) = cap.filter(|_| self.cap_timing == CapTiming::AfterSum) {
            if total > branch.cap {
                trace.record(truncation(branch, total - branch.cap, "total"));
                running += total - branch.cap;
                total = branch.cap;
            }
        }

        if running < i32::from(floor) {
            trace.record(floor_entry(initial, floor, scale, running, &self.citation));
        }
        let residual = scale.clamp(running.max(i32::from(floor)));

        debug!(
            initial = %initial,
            residual = %residual,
            total_credit = total,
            applied = applied.len(),
            evidence = evidence.len(),
            "mitigation pipeline finished"
        );

        PipelineOutcome {
            residual,
            total_credit: total,
            applied,
            evidence,
        }
    }

    fn evaluate<'a>(
        &'a self,
        facts: &FactMap,
        trace: &mut TraceRecorder,
        evidence: &mut Vec<String>,
    ) -> Vec<Candidate<'a>> {
        let mut candidates = Vec::new();
        for definition in &self.definitions {
            let mut inputs = definition.applicable_when.consumed(facts);
            if let Some(value) = facts.get(&definition.field) {
                inputs.insert(definition.field.clone(), value.clone());
            }

            if definition.evidence_only {
                if definition.is_claimed(facts) {
                    evidence.push(definition.id.clone());
                    trace.record(
                        TraceEntry::new(
                            "evidence",
                            format!("{} recorded as supporting evidence", definition.id),
                            definition.citation.clone(),
                        )
                        .with_inputs(inputs)
                        .with_delta(0),
                    );
                }
                continue;
            }

            if !definition.is_applicable(facts) {
                trace.record(
                    TraceEntry::new(
                        "mitigation",
                        format!("{} not applicable", definition.id),
                        definition.citation.clone(),
                    )
                    .with_inputs(inputs)
                    .with_note(format!("requires {}", definition.applicable_when)),
                );
                continue;
            }

            let credit = definition.claimed_credit(facts);
            if credit == 0 {
                let level = definition
                    .claimed_level(facts)
                    .unwrap_or_else(|| definition.family.unclaimed().to_string());
                trace.record(
                    TraceEntry::new(
                        "mitigation",
                        format!("{} at {} gives no credit", definition.id, level),
                        definition.citation.clone(),
                    )
                    .with_inputs(inputs),
                );
                continue;
            }

            candidates.push(Candidate {
                definition,
                credit,
                inputs,
            });
        }
        candidates
    }
}

fn truncation(branch: &super::CapBranch, truncated: i32, subject: &str) -> TraceEntry {
    TraceEntry::new(
        "cap_truncation",
        format!("{} truncated by {} to respect cap {}", subject, truncated, branch.cap),
        branch.citation.clone(),
    )
    .with_delta(-truncated)
    .with_note(format!("cap branch '{}'", branch.name))
}

fn floor_entry(
    initial: &Rank,
    floor: u8,
    scale: &Scale,
    running: i32,
    citation: &Citation,
) -> TraceEntry {
    let label = scale
        .rank(floor)
        .map(|r| r.label)
        .unwrap_or_else(|| floor.to_string());
    TraceEntry::new("floor", format!("clamped to floor {}", label), citation.clone()).with_note(
        format!("{} reduced to ordinal {} below floor", initial.label, running),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::fact_map;

    fn arc_scale() -> Scale {
        Scale::new(vec!["a".into(), "b".into(), "c".into(), "d".into()], "a").unwrap()
    }

    fn definitions() -> Vec<MitigationDefinition> {
        serde_yaml::from_str(
            r#"
- id: segregation
  field: segregation
  family: segregation
  credits: { None: 0, Partial: 1, Full: 1, FullCertified: 2 }
  citation: { doc_id: DOC, section: "4.5", rule_id: ARC-SEG }
- id: boundaryLimit
  field: boundaryLimit
  family: flag
  credits: { "true": 1 }
  citation: { doc_id: DOC, section: "4.5", rule_id: ARC-BOUND }
- id: geoFencing
  field: geoFencing
  family: flag
  evidence_only: true
  citation: { doc_id: DOC, section: "4.5", rule_id: ARC-GEO }
"#,
        )
        .unwrap()
    }

    fn cap() -> CapPolicy {
        serde_yaml::from_str(
            r#"
- name: certified
  when: { segregation: FullCertified }
  cap: 2
  citation: { doc_id: DOC, section: "4.5", rule_id: CAP-CERT }
- name: default
  cap: 1
  citation: { doc_id: DOC, section: "4.5", rule_id: CAP-DEFAULT }
"#,
        )
        .unwrap()
    }

    fn pipeline(cap_timing: CapTiming) -> MitigationPipeline {
        MitigationPipeline {
            definitions: definitions(),
            cap: Some(cap()),
            floor_timing: FloorTiming::EndOnly,
            cap_timing,
            citation: Citation::new("DOC", "4.5", "ARC-FLOOR"),
        }
    }

    fn run(pipeline: &MitigationPipeline, initial: &str, facts: &FactMap) -> (PipelineOutcome, Vec<TraceEntry>) {
        let scale = arc_scale();
        let mut trace = TraceRecorder::new();
        let initial = scale.parse(initial).unwrap();
        let outcome = pipeline.apply(&initial, None, &scale, facts, &mut trace);
        (outcome, trace.finish())
    }

    fn delta_sum(entries: &[TraceEntry]) -> i32 {
        entries.iter().filter_map(|e| e.delta).sum()
    }

    #[test]
    fn test_after_sum_cap_truncates_with_negative_delta() {
        let facts = fact_map([
            ("segregation", "Full".into()),
            ("boundaryLimit", true.into()),
            ("geoFencing", false.into()),
        ]);
        let (outcome, entries) = run(&pipeline(CapTiming::AfterSum), "c", &facts);
        assert_eq!(outcome.total_credit, 1);
        assert_eq!(outcome.residual.label, "b");
        let truncation = entries.iter().find(|e| e.step == "cap_truncation").unwrap();
        assert_eq!(truncation.delta, Some(-1));
        assert_eq!(delta_sum(&entries), outcome.total_credit);
    }

    #[test]
    fn test_per_step_cap_stops_later_credit() {
        let facts = fact_map([("segregation", "Full".into()), ("boundaryLimit", true.into())]);
        let (outcome, entries) = run(&pipeline(CapTiming::PerStep), "d", &facts);
        assert_eq!(outcome.total_credit, 1);
        assert_eq!(outcome.applied, vec!["segregation"]);
        assert_eq!(outcome.residual.label, "c");
        assert_eq!(delta_sum(&entries), 1);
    }

    #[test]
    fn test_certified_branch_raises_cap_regardless_of_order() {
        let facts = fact_map([
            ("segregation", "FullCertified".into()),
            ("boundaryLimit", true.into()),
        ]);
        let mut reordered = pipeline(CapTiming::AfterSum);
        reordered.definitions.reverse();
        for p in [pipeline(CapTiming::AfterSum), reordered] {
            let (outcome, _) = run(&p, "c", &facts);
            assert_eq!(outcome.total_credit, 2);
            assert_eq!(outcome.residual.label, "a");
        }
    }

    #[test]
    fn test_evidence_recorded_with_zero_delta_only() {
        let facts = fact_map([("geoFencing", true.into())]);
        let (outcome, entries) = run(&pipeline(CapTiming::AfterSum), "b", &facts);
        assert_eq!(outcome.evidence, vec!["geoFencing"]);
        assert!(outcome.applied.is_empty());
        let entry = entries.iter().find(|e| e.step == "evidence").unwrap();
        assert_eq!(entry.delta, Some(0));
        assert_eq!(outcome.residual.label, "b");
    }

    #[test]
    fn test_end_only_floor_clamps_residual() {
        let uncapped = MitigationPipeline {
            cap: None,
            ..pipeline(CapTiming::AfterSum)
        };
        let facts = fact_map([
            ("segregation", "FullCertified".into()),
            ("boundaryLimit", true.into()),
        ]);
        let (outcome, entries) = run(&uncapped, "b", &facts);
        assert_eq!(outcome.residual.label, "a");
        assert_eq!(outcome.total_credit, 3);
        assert!(entries.iter().any(|e| e.step == "floor"));
    }

    #[test]
    fn test_per_step_floor_uses_bucket_floor() {
        let grc = Scale::new((1..=10).map(|n| n.to_string()).collect(), "1").unwrap();
        let definitions: Vec<MitigationDefinition> = serde_yaml::from_str(
            r#"
- id: M1
  field: m1
  family: robustness
  credits: { None: 0, Low: 1, Medium: 2, High: 4 }
  citation: { doc_id: DOC, section: "2.4", rule_id: M1 }
- id: M3
  field: m3
  family: robustness
  credits: { None: -1, Low: -1, Medium: 0, High: 1 }
  citation: { doc_id: DOC, section: "2.4", rule_id: M3 }
"#,
        )
        .unwrap();
        let pipeline = MitigationPipeline {
            definitions,
            cap: None,
            floor_timing: FloorTiming::PerStep,
            cap_timing: CapTiming::PerStep,
            citation: Citation::new("DOC", "2.4", "GRC-FLOOR"),
        };
        let facts = fact_map([("m1", "High".into()), ("m3", "None".into())]);
        let mut trace = TraceRecorder::new();
        let initial = grc.parse("5").unwrap();
        let outcome = pipeline.apply(&initial, Some(2), &grc, &facts, &mut trace);
        // 5 - 4 floors at 2, then the M3 penalty lifts it to 3
        assert_eq!(outcome.residual.label, "3");
        assert_eq!(outcome.applied, vec!["M1", "M3"]);
        assert!(trace.entries().iter().any(|e| e.step == "floor"));
    }

    #[test]
    fn test_per_step_floor_with_after_sum_cap_rejected() {
        let invalid = MitigationPipeline {
            floor_timing: FloorTiming::PerStep,
            ..pipeline(CapTiming::AfterSum)
        };
        assert!(invalid.check().is_err());
        assert!(pipeline(CapTiming::AfterSum).check().is_ok());
    }

    #[test]
    fn test_validate_claims_accumulates() {
        let facts = fact_map([("segregation", "Total".into()), ("boundaryLimit", "yes".into())]);
        let validation = pipeline(CapTiming::AfterSum).validate_claims(&facts);
        let err = crate::effects::run_validation(validation).unwrap_err();
        assert_eq!(err.field_errors().len(), 2);
    }
}
