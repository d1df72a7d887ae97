//! Project configuration: resolution chain (CLI flag > env var > project
//! config file > compiled default), mirroring `GatorConfig::resolve`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_KOBOLD_TIMEOUT_SECS: u64 = 900;
pub const DEFAULT_PARALLEL_LIMIT: usize = 4;
pub const DEFAULT_DEBOUNCE_MILLIS: u64 = 2000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// On-disk project configuration file, `drake.toml` at the project root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub workspace: WorkspaceSection,
    #[serde(default)]
    pub providers: ProvidersSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSection {
    pub allowed_external_paths: Vec<String>,
    pub kobold_timeout_secs: Option<u64>,
    pub parallel_limit: Option<usize>,
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            allowed_external_paths: Vec::new(),
            kobold_timeout_secs: None,
            parallel_limit: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersSection {
    /// Maps a free-form agent-type name to the provider that should service it.
    #[serde(default)]
    pub mapping: std::collections::BTreeMap<String, String>,
}

/// Returns the XDG-style config directory for drake: `$XDG_CONFIG_HOME/drake`
/// or `~/.config/drake`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("drake");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("drake")
}

pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_config_file(path: &Path, config: &ConfigFile) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config)?;
    std::fs::write(path, rendered).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Fully resolved runtime settings, after applying the resolution chain.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub allowed_external_paths: Vec<PathBuf>,
    pub kobold_timeout_secs: u64,
    pub parallel_limit: usize,
    pub provider_mapping: std::collections::BTreeMap<String, String>,
}

impl ResolvedConfig {
    /// Resolves settings in order: CLI flag > environment variable > project
    /// config file > compiled default.
    pub fn resolve(
        cli_parallel_limit: Option<usize>,
        cli_timeout_secs: Option<u64>,
        file: &ConfigFile,
    ) -> Self {
        let parallel_limit = cli_parallel_limit
            .or_else(|| env_usize("DRAKE_PARALLEL_LIMIT"))
            .or(file.workspace.parallel_limit)
            .unwrap_or(DEFAULT_PARALLEL_LIMIT);

        let kobold_timeout_secs = cli_timeout_secs
            .or_else(|| env_u64("DRAKE_KOBOLD_TIMEOUT_SECS"))
            .or(file.workspace.kobold_timeout_secs)
            .unwrap_or(DEFAULT_KOBOLD_TIMEOUT_SECS);

        let allowed_external_paths = file
            .workspace
            .allowed_external_paths
            .iter()
            .map(PathBuf::from)
            .collect();

        Self {
            allowed_external_paths,
            kobold_timeout_secs,
            parallel_limit,
            provider_mapping: file.providers.mapping.clone(),
        }
    }
}

/// Resolves a provider API key: `DRAKE_<PROVIDER>_API_KEY` env var, or an
/// error -- keys are never read from the config file.
pub fn resolve_api_key(provider: &str) -> Result<String, ConfigError> {
    let var_name = format!("DRAKE_{}_API_KEY", provider.to_ascii_uppercase());
    std::env::var(&var_name).map_err(|_| ConfigError::Io {
        path: PathBuf::from(var_name),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "api key env var not set"),
    })
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_compiled_default() {
        let file = ConfigFile::default();
        let resolved = ResolvedConfig::resolve(None, None, &file);
        assert_eq!(resolved.parallel_limit, DEFAULT_PARALLEL_LIMIT);
        assert_eq!(resolved.kobold_timeout_secs, DEFAULT_KOBOLD_TIMEOUT_SECS);
    }

    #[test]
    fn resolve_prefers_config_file_over_default() {
        let mut file = ConfigFile::default();
        file.workspace.parallel_limit = Some(8);
        let resolved = ResolvedConfig::resolve(None, None, &file);
        assert_eq!(resolved.parallel_limit, 8);
    }

    #[test]
    fn resolve_prefers_cli_flag_over_everything() {
        let mut file = ConfigFile::default();
        file.workspace.parallel_limit = Some(8);
        let resolved = ResolvedConfig::resolve(Some(2), None, &file);
        assert_eq!(resolved.parallel_limit, 2);
    }

    #[test]
    fn save_and_load_config_file_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drake.toml");
        let mut file = ConfigFile::default();
        file.workspace.allowed_external_paths = vec!["/tmp/shared".to_string()];
        save_config_file(&path, &file).unwrap();
        let loaded = load_config_file(&path).unwrap();
        assert_eq!(loaded.workspace.allowed_external_paths, vec!["/tmp/shared".to_string()]);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config_file(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(loaded.workspace.parallel_limit, None);
    }
}
