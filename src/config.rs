use crate::error::{Result, VaultError};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DIMENSION: usize = 384;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub vector: VectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Falls back to the platform data directory when unset.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,

    #[serde(default)]
    pub on_corrupt: CorruptPolicy,
}

/// What to do when an existing index or metadata file cannot be read back.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CorruptPolicy {
    #[default]
    Fail,
    Reset,
}

fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            storage_dir: None,
            on_corrupt: CorruptPolicy::Fail,
        }
    }
}

impl VectorConfig {
    pub fn new(dimension: usize, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            storage_dir: Some(storage_dir.into()),
            on_corrupt: CorruptPolicy::Fail,
        }
    }

    pub fn with_policy(mut self, policy: CorruptPolicy) -> Self {
        self.on_corrupt = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(VaultError::Configuration(
                "vector.dimension must be at least 1".to_string(),
            ));
        }
        // The index file header stores the dimension as a u32.
        if u32::try_from(self.dimension).is_err() {
            return Err(VaultError::Configuration(format!(
                "vector.dimension must not exceed {}",
                u32::MAX
            )));
        }
        Ok(())
    }

    pub fn resolve_storage_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage_dir {
            return Ok(dir.clone());
        }
        let dirs = project_dirs()?;
        Ok(dirs.data_dir().join("vector_store"))
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "prefvault", "prefvault").ok_or_else(|| {
        VaultError::Configuration("Could not determine config directory".to_string())
    })
}

pub struct ConfigManager {
    config: VaultConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(config_path)
    }

    pub fn load_from(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = config_path.into();
        let config = Self::load_with_env(&config_path)?;
        config.vector.validate()?;

        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn save(&self) -> Result<()> {
        let toml = toml::to_string_pretty(&self.config)
            .map_err(|e| VaultError::Configuration(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.config_path, toml)
            .map_err(|e| VaultError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> &VaultConfig {
        &self.config
    }

    pub fn get_mut(&mut self) -> &mut VaultConfig {
        &mut self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn default_config_path() -> Result<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    fn load_with_env(path: &Path) -> Result<VaultConfig> {
        let s = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix("PREFVAULT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| VaultError::Configuration(format!("Failed to build config: {}", e)))?;

        s.try_deserialize().map_err(|e| {
            VaultError::Configuration(format!("Failed to deserialize config: {}", e))
        })
    }
}
