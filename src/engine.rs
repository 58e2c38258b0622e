//! Core-facing API.
//!
//! [`SoraEngine`] owns the loaded [`ProfileSet`] and exposes ground, air and
//! assurance classification per methodology version, plus a combined
//! [`assess`](SoraEngine::assess). All calls are synchronous and read-only, so
//! one engine can be shared freely once built.

use crate::assurance::{Assurance, TerminalCategory};
use crate::classifier::{RiskClassifier, RiskResult};
use crate::errors::{Result, SoraError};
use crate::facts::{fact_map, FactMap, FactValue};
use crate::profile::{MethodologyVersion, ProfileSet, RiskFamily};
use crate::rules::Classification;
use crate::trace::TraceEntry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Composite outcome plus the trace entry of the lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssuranceOutcome {
    pub assurance: Assurance,
    pub trace: TraceEntry,
}

/// Ground, air and composite result of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub version: MethodologyVersion,
    pub ground: RiskResult,
    pub air: RiskResult,
    pub assurance: AssuranceOutcome,
}

#[derive(Debug, Clone)]
pub struct SoraEngine {
    profiles: ProfileSet,
}

impl SoraEngine {
    pub fn new(profiles: ProfileSet) -> Self {
        info!(
            versions = ?profiles.versions().collect::<Vec<_>>(),
            "classification engine ready"
        );
        Self { profiles }
    }

    /// Engine over the built-in profiles.
    pub fn builtin() -> Result<Self> {
        ProfileSet::builtin().map(Self::new)
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    pub fn classify_ground(&self, version: MethodologyVersion, facts: &FactMap) -> Result<RiskResult> {
        self.classify(version, RiskFamily::Ground, facts)
    }

    pub fn classify_air(&self, version: MethodologyVersion, facts: &FactMap) -> Result<RiskResult> {
        self.classify(version, RiskFamily::Air, facts)
    }

    pub fn classify(
        &self,
        version: MethodologyVersion,
        family: RiskFamily,
        facts: &FactMap,
    ) -> Result<RiskResult> {
        let profile = self.profiles.get(version)?;
        RiskClassifier::new(profile).classify(family, facts)
    }

    /// Composite level from residual ground class and residual air label.
    pub fn classify_assurance(
        &self,
        version: MethodologyVersion,
        ground: u8,
        air: &str,
    ) -> Result<AssuranceOutcome> {
        let profile = self.profiles.get(version)?;
        let (assurance, trace) = profile.assurance.compose(ground, air)?;
        debug!(%version, ground, air, %assurance, "composite lookup");
        Ok(AssuranceOutcome { assurance, trace })
    }

    /// Classify ground and air from one fact map and compose them.
    ///
    /// Validation errors of both families are reported together.
    pub fn assess(&self, version: MethodologyVersion, facts: &FactMap) -> Result<Assessment> {
        let (ground, air) = match (
            self.classify_ground(version, facts),
            self.classify_air(version, facts),
        ) {
            (Ok(ground), Ok(air)) => (ground, air),
            (Err(ground), Err(air)) if ground.is_user_fixable() && air.is_user_fixable() => {
                let mut errors = ground.field_errors().to_vec();
                errors.extend(air.field_errors().iter().cloned());
                return Err(SoraError::validation(errors));
            }
            (Err(err), _) | (_, Err(err)) => return Err(err),
        };

        let assurance = match (&ground.residual, &air.residual) {
            (Classification::Ranked(g), Classification::Ranked(a)) => {
                self.classify_assurance(version, g.ordinal, &a.label)?
            }
            _ => self.out_of_scope_assurance(version, &ground, &air)?,
        };

        Ok(Assessment {
            version,
            ground,
            air,
            assurance,
        })
    }

    fn out_of_scope_assurance(
        &self,
        version: MethodologyVersion,
        ground: &RiskResult,
        air: &RiskResult,
    ) -> Result<AssuranceOutcome> {
        let profile = self.profiles.get(version)?;
        let assurance = Assurance::Terminal(TerminalCategory::CertifiedCategory);
        let inputs = fact_map([
            ("ground", FactValue::from(ground.residual.label())),
            ("air", FactValue::from(air.residual.label())),
        ]);
        let trace = TraceEntry::new("assurance", assurance.to_string(), profile.assurance.citation.clone())
            .with_inputs(inputs)
            .with_note("residual risk is out of scope of the specific category");
        Ok(AssuranceOutcome { assurance, trace })
    }
}
