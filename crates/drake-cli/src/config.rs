//! CLI-level configuration resolution: finds the project config file, reads
//! provider API keys from the environment, and applies the same
//! flag-over-env-over-file-over-default chain as `drake-store::config`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use drake_store::config::{load_config_file, ConfigFile, ResolvedConfig};

pub const PROJECT_CONFIG_FILENAME: &str = "drake.toml";

pub fn project_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(PROJECT_CONFIG_FILENAME)
}

pub struct CliConfig {
    pub resolved: ResolvedConfig,
    pub project_dir: PathBuf,
}

pub fn resolve_cli_config(
    project_dir: &Path,
    cli_parallel_limit: Option<usize>,
    cli_timeout_secs: Option<u64>,
) -> Result<CliConfig> {
    let path = project_config_path(project_dir);
    let file: ConfigFile = load_config_file(&path)
        .with_context(|| format!("failed to load project config at {}", path.display()))?;
    let resolved = ResolvedConfig::resolve(cli_parallel_limit, cli_timeout_secs, &file);
    Ok(CliConfig {
        resolved,
        project_dir: project_dir.to_path_buf(),
    })
}
