//! Composite assurance level from ground and air residual risk.
//!
//! The level is read from a two-key table: rows are bands of the ground
//! residual (each row covers every class up to its `max_ground`), columns are
//! the air residual labels. A ground residual above `domain_max` leaves the
//! specific category altogether and yields [`TerminalCategory`]; it is never
//! clamped onto the last row. Callers that want a conservative fallback may
//! substitute [`AssuranceLevel::VI`] themselves.
//!
//! Regulatory carve-outs where whole rows collapse to one level are encoded as
//! explicit `row_overrides`, checked before the rows.

use crate::errors::{Result, SoraError};
use crate::facts::{fact_map, FactValue};
use crate::rules::Scale;
use crate::trace::{Citation, TraceEntry};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Specific assurance and integrity level, I (lowest) to VI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssuranceLevel {
    I,
    II,
    III,
    IV,
    V,
    VI,
}

impl AssuranceLevel {
    pub const ALL: [AssuranceLevel; 6] = [Self::I, Self::II, Self::III, Self::IV, Self::V, Self::VI];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::I => "I",
            Self::II => "II",
            Self::III => "III",
            Self::IV => "IV",
            Self::V => "V",
            Self::VI => "VI",
        }
    }

    /// Numeric value, 1 to 6.
    pub fn value(&self) -> u8 {
        match self {
            Self::I => 1,
            Self::II => 2,
            Self::III => 3,
            Self::IV => 4,
            Self::V => 5,
            Self::VI => 6,
        }
    }
}

impl fmt::Display for AssuranceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome outside the level table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalCategory {
    /// Operation belongs to the certified category
    CertifiedCategory,
}

impl fmt::Display for TerminalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CertifiedCategory => f.write_str("certified_category"),
        }
    }
}

/// Composite result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Assurance {
    Level(AssuranceLevel),
    Terminal(TerminalCategory),
}

impl Assurance {
    pub fn level(&self) -> Option<AssuranceLevel> {
        match self {
            Self::Level(level) => Some(*level),
            Self::Terminal(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

impl fmt::Display for Assurance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Level(level) => write!(f, "{}", level),
            Self::Terminal(terminal) => write!(f, "{}", terminal),
        }
    }
}

/// Levels for every ground class up to `max_ground`, one per air label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssuranceRow {
    pub max_ground: u8,
    pub levels: Vec<AssuranceLevel>,
}

/// Every ground class from `min_ground` up maps to `level` for any air value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RowOverride {
    pub min_ground: u8,
    pub level: AssuranceLevel,
    pub citation: Citation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssuranceTable {
    /// Air residual labels, in column order
    pub air_axis: Vec<String>,
    pub rows: Vec<AssuranceRow>,
    #[serde(default)]
    pub row_overrides: Vec<RowOverride>,
    /// Highest ground residual inside the specific category
    pub domain_max: u8,
    pub citation: Citation,
}

impl AssuranceTable {
    /// Look up the composite level.
    ///
    /// A ground residual of 0 or an air label outside the axis is a
    /// validation error; a ground residual above `domain_max` is terminal.
    pub fn compose(&self, ground: u8, air: &str) -> Result<(Assurance, TraceEntry)> {
        if ground == 0 {
            return Err(SoraError::invalid_field("ground", "must be >= 1"));
        }
        let Some(column) = self.air_axis.iter().position(|label| label == air) else {
            return Err(SoraError::invalid_field(
                "air",
                format!("unknown air risk class '{}' (expected one of: {})", air, self.air_axis.join(", ")),
            ));
        };
        let inputs = fact_map([
            ("ground", FactValue::from(f64::from(ground))),
            ("air", FactValue::from(air)),
        ]);

        if ground > self.domain_max {
            let terminal = Assurance::Terminal(TerminalCategory::CertifiedCategory);
            let entry = TraceEntry::new("assurance", terminal.to_string(), self.citation.clone())
                .with_inputs(inputs)
                .with_note(format!(
                    "ground residual {} exceeds {}",
                    ground, self.domain_max
                ));
            return Ok((terminal, entry));
        }

        if let Some(row_override) = self.row_overrides.iter().find(|o| ground >= o.min_ground) {
            let level = Assurance::Level(row_override.level);
            let entry =
                TraceEntry::new("assurance", level.to_string(), row_override.citation.clone())
                    .with_inputs(inputs)
                    .with_note(format!(
                        "ground residual {} and above collapses to {}",
                        row_override.min_ground, row_override.level
                    ));
            return Ok((level, entry));
        }

        let level = self
            .rows
            .iter()
            .find(|row| ground <= row.max_ground)
            .and_then(|row| row.levels.get(column).copied())
            .map(Assurance::Level)
            .ok_or_else(|| {
                SoraError::configuration(format!("assurance table has no row for ground {}", ground))
            })?;
        let entry =
            TraceEntry::new("assurance", level.to_string(), self.citation.clone()).with_inputs(inputs);
        Ok((level, entry))
    }

    /// Load-time check against the ground and air scales of the same profile.
    pub fn check(&self, ground: &Scale, air: &Scale) -> Result<()> {
        self.citation.check("assurance table")?;
        if self.air_axis.as_slice() != air.labels() {
            return Err(SoraError::configuration(format!(
                "assurance air axis [{}] does not match the air scale [{}]",
                self.air_axis.join(", "),
                air.labels().join(", ")
            )));
        }
        if self.domain_max == 0 || self.domain_max > ground.max() {
            return Err(SoraError::configuration(format!(
                "assurance domain_max {} is outside the ground scale 1..={}",
                self.domain_max,
                ground.max()
            )));
        }
        let mut previous = 0;
        for row in &self.rows {
            if row.max_ground <= previous {
                return Err(SoraError::configuration(
                    "assurance rows must have strictly increasing max_ground",
                ));
            }
            if row.levels.len() != self.air_axis.len() {
                return Err(SoraError::configuration(format!(
                    "assurance row up to ground {} has {} levels, expected {}",
                    row.max_ground,
                    row.levels.len(),
                    self.air_axis.len()
                )));
            }
            previous = row.max_ground;
        }
        if previous < self.domain_max {
            return Err(SoraError::configuration(format!(
                "assurance rows stop at ground {} but domain_max is {}",
                previous, self.domain_max
            )));
        }
        for row_override in &self.row_overrides {
            row_override.citation.check("assurance row override")?;
        }
        Ok(())
    }
}
