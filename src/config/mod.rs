//! Tool configuration for the `soracalc` binary.
//!
//! Read from an optional `.soracalc.toml` found in the working directory or
//! one of its ancestors:
//!
//! ```toml
//! default_version = "2.5"
//! profile_dir = "rules"   # YAML profiles replacing the built-in ones
//! pretty = true           # pretty-print JSON output
//! ```
//!
//! The engine itself never reads this file; it only receives the
//! [`ProfileSet`] built from it.

mod loader;

pub use loader::{directory_ancestors, load_config, parse_config, CONFIG_FILE_NAME};

use crate::errors::{Result, SoraError};
use crate::profile::{load_version_profile, MethodologyVersion, ProfileSet};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Root of `.soracalc.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoraConfig {
    /// Version used when a command does not name one
    #[serde(default = "default_version")]
    pub default_version: MethodologyVersion,

    /// Directory of YAML profiles; relative paths resolve against the config file
    #[serde(default)]
    pub profile_dir: Option<PathBuf>,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

pub fn default_version() -> MethodologyVersion {
    MethodologyVersion::V2_5
}

impl Default for SoraConfig {
    fn default() -> Self {
        Self {
            default_version: default_version(),
            profile_dir: None,
            pretty: false,
        }
    }
}

impl SoraConfig {
    /// Built-in profiles, with every `*.yaml` in `profile_dir` replacing the
    /// built-in profile of its version.
    pub fn profiles(&self) -> Result<ProfileSet> {
        let mut profiles = ProfileSet::builtin()?;
        if let Some(dir) = &self.profile_dir {
            for path in profile_files(dir)? {
                let profile = load_version_profile(&path)?;
                debug!(version = %profile.version, path = %path.display(), "profile override");
                profiles.replace(profile);
            }
        }
        Ok(profiles)
    }
}

fn profile_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| SoraError::io(e, dir))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| SoraError::io(e, dir))?.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if is_yaml {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
