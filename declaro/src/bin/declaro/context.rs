use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

pub const CONFIG_FILE: &str = "declaro.toml";

/// Project context for declaro commands
pub struct ProjectContext {
    /// Directory holding `declaro.toml`, or the working directory when there is none
    pub project_root: PathBuf,
    /// Directory relative manifest paths fall back to
    pub manifests_dir: PathBuf,
    /// Loaded configuration
    pub config: Option<DeclaroConfig>,
}

/// Configuration stored in declaro.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclaroConfig {
    #[serde(default)]
    pub declaro: DeclaroSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaroSettings {
    #[serde(default = "default_manifests_dir")]
    pub manifests_dir: String,
    /// Used when `--output` is not given
    #[serde(default)]
    pub default_output: Option<OutputFormat>,
}

impl Default for DeclaroSettings {
    fn default() -> Self {
        Self {
            manifests_dir: default_manifests_dir(),
            default_output: None,
        }
    }
}

fn default_manifests_dir() -> String {
    "manifests".to_string()
}

impl ProjectContext {
    /// Find and load project context from current directory or ancestors
    pub fn find() -> Result<Self> {
        let current_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::find_from(&current_dir)
    }

    /// Find project context starting from the given directory
    pub fn find_from(start: &Path) -> Result<Self> {
        match Self::find_project_root(start) {
            Some(root) => Self::from_root(root),
            None => Ok(Self {
                project_root: start.to_path_buf(),
                manifests_dir: start.join(default_manifests_dir()),
                config: None,
            }),
        }
    }

    /// Create context from a directory containing declaro.toml
    pub fn from_root(project_root: PathBuf) -> Result<Self> {
        let config_path = project_root.join(CONFIG_FILE);
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: DeclaroConfig =
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Self {
            manifests_dir: project_root.join(&config.declaro.manifests_dir),
            project_root,
            config: Some(config),
        })
    }

    fn find_project_root(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| dir.join(CONFIG_FILE).is_file())
            .map(Path::to_path_buf)
    }

    pub fn default_output(&self) -> Option<OutputFormat> {
        self.config.as_ref().and_then(|config| config.declaro.default_output.clone())
    }

    /// Resolves a manifest argument: as given first, then under the manifests directory.
    pub fn manifest_path(&self, path: &Path) -> Result<PathBuf> {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        if path.is_relative() {
            let candidate = self.manifests_dir.join(path);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        anyhow::bail!(
            "Manifest {} not found (also looked in {})",
            path.display(),
            self.manifests_dir.display()
        )
    }
}
