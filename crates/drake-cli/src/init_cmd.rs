//! `drake init`: scaffolds a starter project config and empty tasks
//! directory, mirroring `gator init`'s config-file bootstrap.

use std::path::Path;

use anyhow::{Context, Result};
use drake_store::config::{save_config_file, ConfigFile};

use crate::config::project_config_path;

pub fn run_init(project_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(project_dir.join("tasks")).context("failed to create tasks directory")?;
    std::fs::create_dir_all(project_dir.join("plans")).context("failed to create plans directory")?;

    let config_path = project_config_path(project_dir);
    if config_path.exists() {
        println!("drake.toml already exists at {}", config_path.display());
        return Ok(());
    }

    save_config_file(&config_path, &ConfigFile::default())
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    println!("Initialized project at {}", project_dir.display());
    Ok(())
}
