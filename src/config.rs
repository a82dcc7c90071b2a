use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::garden_config::GardenToml;

/// Runtime configuration for garden.
///
/// Merges, in increasing priority:
/// 1. built-in defaults
/// 2. `.garden/garden.toml`
/// 3. environment variables (`GARDEN_MODEL`, `GARDEN_ORACLE_URL`)
/// 4. CLI flags
#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub garden_dir: PathBuf,
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
    /// One subdirectory per task.
    pub repos_dir: PathBuf,
    pub settings: GardenToml,
    pub verbose: bool,
}

/// CLI values that override file and environment settings.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub verbose: bool,
    pub error_budget: Option<u32>,
    pub diagnostic_lines: Option<usize>,
}

impl Config {
    /// Load configuration rooted at `root` from file and defaults only.
    pub fn new(root: &Path) -> Result<Self> {
        let root = if root.exists() {
            root.canonicalize()
                .context("Failed to resolve garden root directory")?
        } else {
            root.to_path_buf()
        };
        let garden_dir = root.join(".garden");
        let settings = GardenToml::load_or_default(&garden_dir)?;

        Ok(Self {
            db_path: garden_dir.join("garden.db"),
            log_dir: garden_dir.join("logs"),
            repos_dir: root.join("repos"),
            garden_dir,
            root,
            settings,
            verbose: false,
        })
    }

    /// Full layered load: file, then environment, then CLI.
    pub fn with_overrides(root: &Path, cli: &CliOverrides) -> Result<Self> {
        let mut config = Self::new(root)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.verbose = cli.verbose;
        if let Some(budget) = cli.error_budget {
            config.settings.pipeline.error_budget = budget;
        }
        if let Some(lines) = cli.diagnostic_lines {
            config.settings.pipeline.diagnostic_lines = lines;
        }
        Ok(config)
    }

    /// Apply environment overrides through `lookup` so tests can supply a
    /// fake environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("GARDEN_MODEL").filter(|v| !v.trim().is_empty()) {
            self.settings.oracle.model = model;
        }
        if let Some(url) = lookup("GARDEN_ORACLE_URL").filter(|v| !v.trim().is_empty()) {
            self.settings.oracle.base_url = url;
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.garden_dir.join("garden.toml")
    }

    pub fn is_initialized(&self) -> bool {
        self.garden_dir.is_dir()
    }

    /// Create `.garden/`, `.garden/logs/` and `repos/`.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.garden_dir, &self.log_dir, &self.repos_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Vec<String> {
        self.settings.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_paths_derive_from_root() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path()).unwrap();
        assert!(config.garden_dir.ends_with(".garden"));
        assert!(config.db_path.ends_with(".garden/garden.db"));
        assert!(config.log_dir.ends_with(".garden/logs"));
        assert!(config.repos_dir.ends_with("repos"));
        assert!(!config.is_initialized());
    }

    #[test]
    fn test_file_settings_are_loaded() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".garden")).unwrap();
        std::fs::write(
            dir.path().join(".garden/garden.toml"),
            "[pipeline]\nerror_budget = 4\n",
        )
        .unwrap();
        let config = Config::new(dir.path()).unwrap();
        assert_eq!(config.settings.pipeline.error_budget, 4);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempdir().unwrap();
        let mut config = Config::new(dir.path()).unwrap();
        let env: HashMap<&str, &str> = [
            ("GARDEN_MODEL", "my-model"),
            ("GARDEN_ORACLE_URL", "http://localhost:1234/v1"),
        ]
        .into_iter()
        .collect();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.settings.oracle.model, "my-model");
        assert_eq!(config.settings.oracle.base_url, "http://localhost:1234/v1");
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let dir = tempdir().unwrap();
        let mut config = Config::new(dir.path()).unwrap();
        let model = config.settings.oracle.model.clone();
        config.apply_env(|_| Some("  ".to_string()));
        assert_eq!(config.settings.oracle.model, model);
    }

    #[test]
    fn test_cli_overrides_win() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".garden")).unwrap();
        std::fs::write(
            dir.path().join(".garden/garden.toml"),
            "[pipeline]\nerror_budget = 4\ndiagnostic_lines = 40\n",
        )
        .unwrap();
        let cli = CliOverrides {
            verbose: true,
            error_budget: Some(2),
            diagnostic_lines: None,
        };
        let config = Config::with_overrides(dir.path(), &cli).unwrap();
        assert!(config.verbose);
        assert_eq!(config.settings.pipeline.error_budget, 2);
        assert_eq!(config.settings.pipeline.diagnostic_lines, 40);
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path()).unwrap();
        config.ensure_directories().unwrap();
        assert!(config.is_initialized());
        assert!(config.log_dir.is_dir());
        assert!(config.repos_dir.is_dir());
    }
}
