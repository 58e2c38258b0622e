// Export modules for library usage
pub mod assurance;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod effects;
pub mod engine;
pub mod errors;
pub mod facts;
pub mod mitigation;
pub mod profile;
pub mod rules;
pub mod trace;

// Re-export commonly used types
pub use crate::assurance::{Assurance, AssuranceLevel, AssuranceTable, TerminalCategory};
pub use crate::classifier::{RiskClassifier, RiskResult};
pub use crate::engine::{Assessment, AssuranceOutcome, SoraEngine};
pub use crate::errors::{FieldError, Result, SoraError};
pub use crate::facts::{fact_map, normalize, FactMap, FactValue};
pub use crate::mitigation::{
    CapPolicy, CapTiming, FloorTiming, MitigationDefinition, MitigationFamily, MitigationPipeline,
    Robustness, Segregation,
};
pub use crate::profile::{
    load_version_profile, parse_version_profile, MethodologyVersion, ProfileSet, RiskFamily,
    RiskModel, VersionProfile,
};
pub use crate::rules::{Classification, ClassificationTable, Rank, RuleCondition, Scale};
pub use crate::trace::{Citation, TraceEntry, TraceRecorder};
