//! Declarative classification rules.
//!
//! - [`condition`]: fact predicates with suffix-selected comparators
//! - [`scale`]: ordinal risk scales and the out-of-scope marker
//! - [`table`]: ordered first-match tables, overrides and fallbacks

pub mod condition;
pub mod scale;
pub mod table;

pub use condition::{Clause, Comparator, ConditionOperand, RuleCondition, Threshold};
pub use scale::{Classification, Rank, Scale};
pub use table::{
    resolve_override, ClassificationRule, ClassificationTable, Fallback, Resolution,
    ResolutionSource,
};
