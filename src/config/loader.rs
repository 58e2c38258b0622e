use std::fs;
use std::path::{Path, PathBuf};

use super::SoraConfig;

/// File looked up in the working directory and its ancestors.
pub const CONFIG_FILE_NAME: &str = ".soracalc.toml";

const MAX_TRAVERSAL_DEPTH: usize = 10;

/// Parse config from a TOML string.
pub fn parse_config(contents: &str) -> Result<SoraConfig, String> {
    toml::from_str::<SoraConfig>(contents)
        .map_err(|e| format!("Failed to parse {}: {}", CONFIG_FILE_NAME, e))
}

/// Try loading config from a specific path; relative `profile_dir` is
/// resolved against the file's directory.
fn try_load_config_from_path(config_path: &Path) -> Option<SoraConfig> {
    let contents = match fs::read_to_string(config_path) {
        Ok(contents) => contents,
        Err(e) => {
            handle_read_error(config_path, &e);
            return None;
        }
    };

    match parse_config(&contents) {
        Ok(mut config) => {
            if let (Some(dir), Some(base)) = (&config.profile_dir, config_path.parent()) {
                if dir.is_relative() {
                    config.profile_dir = Some(base.join(dir));
                }
            }
            tracing::debug!("Loaded config from {}", config_path.display());
            Some(config)
        }
        Err(e) => {
            tracing::warn!("{}. Using defaults.", e);
            None
        }
    }
}

/// Only log actual errors, not "file not found".
fn handle_read_error(config_path: &Path, error: &std::io::Error) {
    if error.kind() != std::io::ErrorKind::NotFound {
        tracing::warn!(
            "Failed to read config file {}: {}",
            config_path.display(),
            error
        );
    }
}

/// Generate directory ancestors up to a depth limit.
pub fn directory_ancestors(start: PathBuf, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    std::iter::successors(Some(start), |dir| {
        let mut parent = dir.clone();
        if parent.pop() {
            Some(parent)
        } else {
            None
        }
    })
    .take(max_depth)
}

/// Search `start` and its ancestors for `.soracalc.toml`.
pub(crate) fn load_config_from(start: PathBuf) -> SoraConfig {
    directory_ancestors(start, MAX_TRAVERSAL_DEPTH)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find_map(|path| try_load_config_from_path(&path))
        .unwrap_or_else(|| {
            tracing::debug!(
                "No config found after checking {} directories. Using default config.",
                MAX_TRAVERSAL_DEPTH
            );
            SoraConfig::default()
        })
}

pub fn load_config() -> SoraConfig {
    match std::env::current_dir() {
        Ok(dir) => load_config_from(dir),
        Err(e) => {
            tracing::warn!(
                "Failed to get current directory: {}. Using default config.",
                e
            );
            SoraConfig::default()
        }
    }
}
