//! Loading version profiles from YAML rule files.
//!
//! Files are deserialized into raw `*Spec` structs first. Labels are then
//! resolved against the declared scales and every cross-reference is checked,
//! so a profile that loads is internally consistent. Any fault is a
//! configuration error; there is no partial profile.

use super::{MethodologyVersion, RiskFamily, RiskModel, VersionProfile};
use crate::assurance::AssuranceTable;
use crate::errors::{Result, SoraError};
use crate::facts::{FactSchema, NormalizationConfig};
use crate::mitigation::{CapPolicy, CapTiming, FloorTiming, MitigationDefinition, MitigationPipeline};
use crate::rules::{
    Classification, ClassificationRule, ClassificationTable, Fallback, RuleCondition, Scale,
};
use crate::trace::Citation;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Scale and result labels; GRC labels are written as bare numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Label {
    Number(u32),
    Text(String),
}

impl Label {
    fn text(&self) -> String {
        match self {
            Label::Number(n) => n.to_string(),
            Label::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VersionProfileSpec {
    version: String,
    #[serde(default)]
    title: Option<String>,
    ground: RiskModelSpec,
    air: RiskModelSpec,
    assurance: AssuranceTable,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RiskModelSpec {
    citation: Citation,
    scale: ScaleSpec,
    #[serde(default)]
    schema: FactSchema,
    #[serde(default)]
    normalization: NormalizationConfig,
    #[serde(default)]
    overrides: Vec<RuleSpec>,
    rules: Vec<RuleSpec>,
    fallback: FallbackSpec,
    #[serde(default)]
    mitigations: Vec<MitigationDefinition>,
    #[serde(default)]
    cap_policy: Option<CapPolicy>,
    #[serde(default)]
    floor_timing: FloorTiming,
    #[serde(default)]
    cap_timing: CapTiming,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScaleSpec {
    labels: Vec<Label>,
    floor: Label,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSpec {
    #[serde(default)]
    when: RuleCondition,
    result: Label,
    citation: Citation,
    #[serde(default)]
    floor: Option<Label>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FallbackSpec {
    field: String,
    #[serde(default)]
    values: BTreeMap<String, Label>,
    default: Label,
    citation: Citation,
}

/// Read and compile a profile file.
pub fn load_version_profile(path: &Path) -> Result<VersionProfile> {
    let contents = fs::read_to_string(path).map_err(|e| SoraError::io(e, path))?;
    let profile = parse_version_profile(&contents).map_err(|e| attribute(e, path))?;
    info!(
        version = %profile.version,
        path = %path.display(),
        "loaded methodology profile"
    );
    Ok(profile)
}

/// Compile a profile from YAML text.
pub fn parse_version_profile(contents: &str) -> Result<VersionProfile> {
    let spec: VersionProfileSpec = serde_yaml::from_str(contents)
        .map_err(|e| SoraError::configuration(format!("Failed to parse profile: {}", e)))?;

    let version = MethodologyVersion::parse(&spec.version).ok_or_else(|| {
        SoraError::configuration(format!("unknown methodology version '{}'", spec.version))
    })?;
    let profile = VersionProfile {
        version,
        title: spec.title,
        ground: compile_model(RiskFamily::Ground, spec.ground)?,
        air: compile_model(RiskFamily::Air, spec.air)?,
        assurance: spec.assurance,
    };
    profile.check()?;

    debug!(
        version = %profile.version,
        ground_rules = profile.ground.table.rules().len(),
        air_rules = profile.air.table.rules().len(),
        "compiled methodology profile"
    );
    Ok(profile)
}

fn compile_model(family: RiskFamily, spec: RiskModelSpec) -> Result<RiskModel> {
    let labels = spec.scale.labels.iter().map(Label::text).collect();
    let scale = Scale::new(labels, &spec.scale.floor.text())
        .map_err(|e| in_section(e, &format!("{} scale", family)))?;

    let overrides = compile_rules(&scale, spec.overrides)
        .map_err(|e| in_section(e, &format!("{} overrides", family)))?;
    let rules = compile_rules(&scale, spec.rules)
        .map_err(|e| in_section(e, &format!("{} rules", family)))?;
    let fallback = compile_fallback(&scale, spec.fallback)
        .map_err(|e| in_section(e, &format!("{} fallback", family)))?;

    let pipeline = MitigationPipeline {
        definitions: spec.mitigations,
        cap: spec.cap_policy,
        floor_timing: spec.floor_timing,
        cap_timing: spec.cap_timing,
        citation: spec.citation.clone(),
    };

    Ok(RiskModel {
        family,
        citation: spec.citation,
        schema: spec.schema,
        normalization: spec.normalization,
        scale,
        overrides,
        table: ClassificationTable::new(rules, fallback),
        pipeline,
    })
}

fn compile_rules(scale: &Scale, specs: Vec<RuleSpec>) -> Result<Vec<ClassificationRule>> {
    specs
        .into_iter()
        .map(|spec| -> Result<ClassificationRule> {
            let floor = spec
                .floor
                .map(|label| {
                    scale.parse(&label.text()).map(|rank| rank.ordinal).ok_or_else(|| {
                        SoraError::configuration(format!(
                            "rule {} has unknown floor '{}'",
                            spec.citation.rule_id,
                            label.text()
                        ))
                    })
                })
                .transpose()?;
            Ok(ClassificationRule {
                condition: spec.when,
                result: scale.parse_classification(&spec.result.text())?,
                citation: spec.citation,
                floor,
                notes: spec.notes,
            })
        })
        .collect()
}

fn compile_fallback(scale: &Scale, spec: FallbackSpec) -> Result<Fallback> {
    let values = spec
        .values
        .into_iter()
        .map(|(key, label)| -> Result<(String, Classification)> {
            Ok((key, scale.parse_classification(&label.text())?))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;
    Ok(Fallback {
        field: spec.field,
        values,
        default: scale.parse_classification(&spec.default.text())?,
        citation: spec.citation,
    })
}

fn in_section(error: SoraError, section: &str) -> SoraError {
    match error {
        SoraError::Configuration { message, path } => SoraError::Configuration {
            message: format!("{}: {}", section, message),
            path,
        },
        other => other,
    }
}

fn attribute(error: SoraError, path: &Path) -> SoraError {
    match error {
        SoraError::Configuration { message, path: None } => SoraError::configuration_at(message, path),
        other => other,
    }
}
