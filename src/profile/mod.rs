//! Methodology version profiles.
//!
//! A [`VersionProfile`] bundles everything one methodology version needs: a
//! ground [`RiskModel`], an air [`RiskModel`] and the assurance table. Profiles
//! are built once by the [`loader`] and are immutable afterwards; two versions
//! never share state, so behaviour of one version cannot leak into the other.
//!
//! # Example
//!
//! ```rust
//! use soracalc::profile::{MethodologyVersion, ProfileSet};
//!
//! let profiles = ProfileSet::builtin().unwrap();
//! let profile = profiles.get(MethodologyVersion::V2_5).unwrap();
//! assert_eq!(profile.version, MethodologyVersion::V2_5);
//! ```

use crate::assurance::AssuranceTable;
use crate::effects::{combine_validations, validation_map, FactValidation};
use crate::errors::{Result, SoraError};
use crate::facts::{normalize, FactMap, FactSchema, NormalizationConfig};
use crate::mitigation::MitigationPipeline;
use crate::rules::{ClassificationRule, ClassificationTable, Scale};
use crate::trace::Citation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod builtin;
pub mod loader;

pub use loader::{load_version_profile, parse_version_profile};

/// Supported methodology versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MethodologyVersion {
    /// Legacy methodology
    #[serde(rename = "2.0", alias = "v2.0")]
    V2_0,
    /// Current methodology
    #[serde(rename = "2.5", alias = "v2.5")]
    V2_5,
}

impl MethodologyVersion {
    pub const ALL: [MethodologyVersion; 2] = [Self::V2_0, Self::V2_5];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().trim_start_matches('v') {
            "2.0" | "2" => Some(Self::V2_0),
            "2.5" => Some(Self::V2_5),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::V2_0 => "2.0",
            Self::V2_5 => "2.5",
        }
    }
}

impl std::fmt::Display for MethodologyVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MethodologyVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!("Invalid methodology version: '{}'. Valid options: 2.0, 2.5", s)
        })
    }
}

/// Which risk class a model produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFamily {
    Ground,
    Air,
}

impl std::fmt::Display for RiskFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ground => write!(f, "ground"),
            Self::Air => write!(f, "air"),
        }
    }
}

/// Everything needed to classify one risk family under one version.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskModel {
    pub family: RiskFamily,
    pub citation: Citation,
    pub schema: FactSchema,
    pub normalization: NormalizationConfig,
    pub scale: Scale,
    /// Absolute overrides, checked before the table
    pub overrides: Vec<ClassificationRule>,
    pub table: ClassificationTable,
    pub pipeline: MitigationPipeline,
}

impl RiskModel {
    pub fn normalize(&self, raw: &FactMap) -> FactMap {
        normalize(raw, &self.normalization, &self.schema)
    }

    /// Schema and mitigation claims together, so one response lists every error.
    pub fn validate(&self, facts: &FactMap) -> FactValidation<()> {
        let checks = vec![self.schema.validate(facts), self.pipeline.validate_claims(facts)];
        validation_map(combine_validations(checks), |_| ())
    }

    pub fn check(&self) -> Result<()> {
        let context = format!("{} model", self.family);
        self.citation.check(&context)?;
        self.schema.check()?;
        self.normalization.check()?;
        self.pipeline.check()?;

        let rules = self.overrides.iter().chain(self.table.rules());
        for (index, rule) in rules.enumerate() {
            rule.citation
                .check(&format!("{} rule #{}", context, index + 1))?;
            if let Some(floor) = rule.floor {
                if self.scale.rank(floor).is_none() {
                    return Err(SoraError::configuration(format!(
                        "{} rule {} has floor ordinal {} outside the scale",
                        context, rule.citation.rule_id, floor
                    )));
                }
            }
        }
        if self.overrides.iter().any(|rule| rule.result.is_out_of_scope()) {
            return Err(SoraError::configuration(format!(
                "{} overrides must resolve to a rank",
                context
            )));
        }
        self.table
            .fallback()
            .citation
            .check(&format!("{} fallback", context))
    }
}

/// One methodology version.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionProfile {
    pub version: MethodologyVersion,
    pub title: Option<String>,
    pub ground: RiskModel,
    pub air: RiskModel,
    pub assurance: AssuranceTable,
}

impl VersionProfile {
    pub fn model(&self, family: RiskFamily) -> &RiskModel {
        match family {
            RiskFamily::Ground => &self.ground,
            RiskFamily::Air => &self.air,
        }
    }

    pub fn check(&self) -> Result<()> {
        self.ground.check()?;
        self.air.check()?;
        self.assurance.check(&self.ground.scale, &self.air.scale)
    }
}

/// One profile per version, read-only once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSet {
    profiles: BTreeMap<MethodologyVersion, VersionProfile>,
}

impl ProfileSet {
    pub fn new(profiles: Vec<VersionProfile>) -> Result<Self> {
        let mut set = Self::default();
        for profile in profiles {
            if set.profiles.contains_key(&profile.version) {
                return Err(SoraError::configuration(format!(
                    "methodology version {} is defined twice",
                    profile.version
                )));
            }
            set.profiles.insert(profile.version, profile);
        }
        Ok(set)
    }

    /// Profiles compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::new(builtin::builtin_profiles()?)
    }

    /// Replace the profile of its version, returning the previous one.
    pub fn replace(&mut self, profile: VersionProfile) -> Option<VersionProfile> {
        self.profiles.insert(profile.version, profile)
    }

    pub fn get(&self, version: MethodologyVersion) -> Result<&VersionProfile> {
        self.profiles.get(&version).ok_or_else(|| {
            SoraError::configuration(format!("no profile loaded for methodology version {}", version))
        })
    }

    pub fn versions(&self) -> impl Iterator<Item = MethodologyVersion> + '_ {
        self.profiles.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_accepts_prefix() {
        assert_eq!(MethodologyVersion::parse("2.5"), Some(MethodologyVersion::V2_5));
        assert_eq!(MethodologyVersion::parse("v2.0"), Some(MethodologyVersion::V2_0));
        assert_eq!(MethodologyVersion::parse("V2.5"), Some(MethodologyVersion::V2_5));
        assert!("3.0".parse::<MethodologyVersion>().is_err());
    }

    #[test]
    fn test_version_serializes_as_number_text() {
        let json = serde_json::to_string(&MethodologyVersion::V2_0).unwrap();
        assert_eq!(json, "\"2.0\"");
        let parsed: MethodologyVersion = serde_json::from_str("\"v2.5\"").unwrap();
        assert_eq!(parsed, MethodologyVersion::V2_5);
    }

    #[test]
    fn test_duplicate_versions_rejected() {
        let profiles = builtin::builtin_profiles().unwrap();
        let mut twice = profiles.clone();
        twice.extend(profiles);
        assert!(ProfileSet::new(twice).is_err());
    }

    #[test]
    fn test_builtin_profiles_pass_checks() {
        let set = ProfileSet::builtin().unwrap();
        assert_eq!(set.versions().collect::<Vec<_>>(), MethodologyVersion::ALL.to_vec());
        for version in MethodologyVersion::ALL {
            set.get(version).unwrap().check().unwrap();
        }
    }
}
