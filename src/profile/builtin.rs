//! Profiles shipped with the crate.

use super::{parse_version_profile, VersionProfile};
use crate::errors::Result;

/// SORA 2.0 rule data.
pub const SORA_2_0: &str = include_str!("../../rules/sora-2.0.yaml");

/// SORA 2.5 rule data.
pub const SORA_2_5: &str = include_str!("../../rules/sora-2.5.yaml");

/// Compile every built-in profile.
pub fn builtin_profiles() -> Result<Vec<VersionProfile>> {
    [SORA_2_0, SORA_2_5]
        .into_iter()
        .map(parse_version_profile)
        .collect()
}
