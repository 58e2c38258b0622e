//! Property-based tests for the classification engine
//!
//! These tests verify invariants that should hold for all valid inputs:
//! - Raising one mitigation level never worsens the residual class
//! - The residual never drops below the scale floor
//! - Applied credit never exceeds the selected cap
//! - Normalization is idempotent
//! - Every trace entry carries a complete citation
//! - Evidence entries carry delta 0, applied mitigations a non-zero delta

use proptest::prelude::*;
use soracalc::facts::{fact_map, FactMap, FactValue};
use soracalc::mitigation::Segregation;
use soracalc::{MethodologyVersion, RiskFamily, RiskResult, SoraEngine};
use std::sync::OnceLock;

fn engine() -> &'static SoraEngine {
    static ENGINE: OnceLock<SoraEngine> = OnceLock::new();
    ENGINE.get_or_init(|| SoraEngine::builtin().unwrap())
}

fn version() -> impl Strategy<Value = MethodologyVersion> {
    prop::sample::select(MethodologyVersion::ALL.to_vec())
}

fn segregation() -> impl Strategy<Value = usize> {
    0..Segregation::ALL.len()
}

/// Air facts with every mitigation claim drawn at random.
fn air_facts() -> impl Strategy<Value = FactMap> {
    (
        prop::sample::select(vec!["A", "B", "C", "D", "E", "F", "G"]),
        1..=5i32,
        prop::sample::select(vec!["Outside", "Near"]),
        0..400i32,
        any::<[bool; 2]>(),
        segregation(),
        any::<[bool; 4]>(),
    )
        .prop_map(
            |(airspace, traffic, proximity, altitude, [atypical, urban], seg, flags)| {
                fact_map([
                    ("airspace", FactValue::from(airspace)),
                    ("trafficDensity", traffic.into()),
                    ("proximity", proximity.into()),
                    ("altitude", altitude.into()),
                    ("atypical", atypical.into()),
                    ("overUrban", urban.into()),
                    ("segregation", Segregation::ALL[seg].as_str().into()),
                    ("boundaryLimit", flags[0].into()),
                    ("chronologyLimit", flags[1].into()),
                    ("coordination", flags[2].into()),
                    ("geoFencing", flags[3].into()),
                ])
            },
        )
}

/// Ground facts valid under the current methodology, in raw units.
fn current_ground_facts() -> impl Strategy<Value = FactMap> {
    (
        0.05..50.0f64,
        1.0..260.0f64,
        50..30_000i32,
        0..100_000i32,
        any::<bool>(),
        prop::sample::select(vec!["None", "Low", "Medium"]),
        prop::sample::select(vec!["None", "medium", "High"]),
        prop::sample::select(vec!["None", "Low"]),
        prop::sample::select(vec!["none", "Medium", "HIGH"]),
    )
        .prop_map(|(dimension, kmh, grams, density, controlled, m1a, m1b, m1c, m2)| {
            fact_map([
                ("dimension", FactValue::from(dimension)),
                ("maxSpeedKmh", kmh.into()),
                ("massGrams", grams.into()),
                ("populationDensity", density.into()),
                ("controlledGroundArea", controlled.into()),
                ("m1a", m1a.into()),
                ("m1b", m1b.into()),
                ("m1c", m1c.into()),
                ("m2", m2.into()),
            ])
        })
}

/// Ground facts valid under the legacy methodology.
fn legacy_ground_facts() -> impl Strategy<Value = FactMap> {
    let level = || prop::sample::select(vec!["None", "Low", "Medium", "High"]);
    (
        prop::sample::select(vec!["VLOS", "evlos", "BVLOS"]),
        prop::sample::select(vec!["ControlledGroundArea", "Sparse", "Populated", "Gathering"]),
        0.05..12.0f64,
        0.1..40.0f64,
        1.0..90.0f64,
        level(),
        level(),
        level(),
    )
        .prop_map(|(operation, scenario, dimension, mass, speed, m1, m2, m3)| {
            fact_map([
                ("operationType", FactValue::from(operation)),
                ("groundScenario", scenario.into()),
                ("dimension", dimension.into()),
                ("mass", mass.into()),
                ("maxSpeed", speed.into()),
                ("m1", m1.into()),
                ("m2", m2.into()),
                ("m3", m3.into()),
            ])
        })
}

fn ground_facts() -> impl Strategy<Value = (MethodologyVersion, FactMap)> {
    prop_oneof![
        current_ground_facts().prop_map(|facts| (MethodologyVersion::V2_5, facts)),
        legacy_ground_facts().prop_map(|facts| (MethodologyVersion::V2_0, facts)),
    ]
}

fn residual_ordinal(result: &RiskResult) -> Option<u8> {
    result.residual.ordinal()
}

/// Cap of the branch the built-in profiles select for `facts`.
fn air_cap(facts: &FactMap) -> i32 {
    if facts["segregation"] == FactValue::from("FullCertified") {
        2
    } else {
        1
    }
}

proptest! {
    /// Property: upgrading segregation or switching on a flag mitigation
    /// never gives a worse residual air class
    #[test]
    fn prop_air_mitigation_is_monotone(
        version in version(),
        facts in air_facts(),
        lower in segregation(),
        raise in segregation(),
        flag in prop::sample::select(vec!["boundaryLimit", "chronologyLimit", "coordination", "geoFencing"]),
    ) {
        let engine = engine();
        let higher = lower.max(raise);

        let mut weaker = facts.clone();
        weaker.insert("segregation".into(), Segregation::ALL[lower].as_str().into());
        weaker.insert(flag.into(), false.into());
        let mut stronger = weaker.clone();
        stronger.insert("segregation".into(), Segregation::ALL[higher].as_str().into());
        stronger.insert(flag.into(), true.into());

        let weak = engine.classify_air(version, &weaker).unwrap();
        let strong = engine.classify_air(version, &stronger).unwrap();
        prop_assert!(residual_ordinal(&strong) <= residual_ordinal(&weak));
    }

    /// Property: raising any ground mitigation one defined level never
    /// gives a worse residual ground class
    #[test]
    fn prop_ground_mitigation_is_monotone((version, facts) in ground_facts(), pick in 0usize..4) {
        let engine = engine();
        let profile = engine.profiles().get(version).unwrap();
        let model = profile.model(RiskFamily::Ground);
        let definition = &model.pipeline.definitions[pick % model.pipeline.definitions.len()];
        let levels: Vec<_> = definition
            .family
            .levels()
            .into_iter()
            .filter(|level| definition.credit_for(level).is_some())
            .collect();

        let mut previous: Option<u8> = None;
        for level in levels {
            let mut claimed = facts.clone();
            claimed.insert(definition.field.clone(), level.into());
            let result = engine.classify_ground(version, &claimed).unwrap();
            if let (Some(before), Some(now)) = (previous, residual_ordinal(&result)) {
                prop_assert!(now <= before, "{} at {} worsened {} to {}", definition.id, level, before, now);
            }
            previous = residual_ordinal(&result);
        }
    }

    /// Property: a ranked residual never drops below the scale floor
    #[test]
    fn prop_residual_respects_floor(version in version(), air in air_facts(), (ground_version, ground) in ground_facts()) {
        let engine = engine();
        let air_result = engine.classify_air(version, &air).unwrap();
        prop_assert!(air_result.residual.ordinal().unwrap() >= 1);

        let ground_result = engine.classify_ground(ground_version, &ground).unwrap();
        if let Some(ordinal) = ground_result.residual.ordinal() {
            prop_assert!(ordinal >= 1);
        }
    }

    /// Property: total applied air credit stays within the selected cap
    #[test]
    fn prop_air_credit_within_cap(version in version(), facts in air_facts()) {
        let result = engine().classify_air(version, &facts).unwrap();
        prop_assert!(result.total_credit <= air_cap(&facts));
        prop_assert!(result.total_credit >= 0);
    }

    /// Property: normalizing twice gives the same facts as normalizing once
    #[test]
    fn prop_normalization_is_idempotent(
        air in air_facts(),
        (version, ground) in ground_facts(),
        altitude_ft in prop::option::of(0.0..2000.0f64),
    ) {
        let profile = engine().profiles().get(version).unwrap();

        let mut air = air;
        if let Some(feet) = altitude_ft {
            air.remove("altitude");
            air.insert("altitudeFt".into(), feet.into());
        }
        for (family, raw) in [(RiskFamily::Air, air), (RiskFamily::Ground, ground)] {
            let model = profile.model(family);
            let once = model.normalize(&raw);
            prop_assert_eq!(model.normalize(&once), once);
        }
    }

    /// Property: every trace entry cites a complete regulatory reference
    #[test]
    fn prop_trace_citations_are_complete(version in version(), air in air_facts(), (ground_version, ground) in ground_facts()) {
        let engine = engine();
        let results = [
            engine.classify_air(version, &air).unwrap(),
            engine.classify_ground(ground_version, &ground).unwrap(),
        ];
        for result in &results {
            for entry in &result.trace {
                prop_assert!(entry.citation.is_complete(), "{} has citation {}", entry.step, entry.citation);
            }
        }
    }

    /// Property: evidence never moves the class and applied mitigations
    /// always do; trace deltas add up to the reported credit
    #[test]
    fn prop_evidence_and_mitigation_partition(version in version(), air in air_facts(), (ground_version, ground) in ground_facts()) {
        let engine = engine();
        let results = [
            engine.classify_air(version, &air).unwrap(),
            engine.classify_ground(ground_version, &ground).unwrap(),
        ];
        for result in &results {
            for entry in &result.trace {
                match entry.step.as_str() {
                    "evidence" => prop_assert_eq!(entry.delta, Some(0)),
                    "mitigation" => prop_assert_ne!(entry.delta, Some(0)),
                    _ => {}
                }
            }
            for id in &result.supporting_evidence {
                prop_assert!(!result.applied_mitigations.contains(id));
            }
            let deltas: i32 = result.trace.iter().filter_map(|entry| entry.delta).sum();
            prop_assert_eq!(deltas, result.total_credit);
        }
    }
}
