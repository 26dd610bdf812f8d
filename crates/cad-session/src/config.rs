use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cad_ai::ModelConfig;
use cad_mesh::{MeshFormat, MeshingConfig};
use cad_script::{ArtifactSelection, ExecutionLimits, Sandbox};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CONFIG_FILE: &str = "cadloop.toml";
pub const HISTORY_FILE: &str = "history.json";
pub const MODELS_DIR: &str = "models";
pub const HOME_ENV: &str = "CADLOOP_HOME";
pub const MODEL_ENV: &str = "CADLOOP_MODEL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub mesh: MeshConfig,
    pub script: ScriptConfig,
    pub generation: ModelConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./cadloop-data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Grid cells along the longest axis of the part.
    pub resolution: usize,
    pub format: MeshFormat,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            resolution: 64,
            format: MeshFormat::BinaryStl,
        }
    }
}

impl MeshConfig {
    pub fn meshing(&self) -> MeshingConfig {
        MeshingConfig::with_resolution(self.resolution)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub selection: ArtifactSelection,
    #[serde(flatten)]
    pub limits: ExecutionLimits,
}

impl ScriptConfig {
    pub fn sandbox(&self) -> Sandbox {
        Sandbox::new(self.limits, self.selection)
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Resolves the configuration the way the binaries do.
    ///
    /// The file is `explicit` if given, else `cadloop.toml` inside the storage
    /// directory. `storage` (a command-line flag) beats `CADLOOP_HOME`, which
    /// beats the file; `CADLOOP_MODEL` replaces the model name.
    pub fn discover(explicit: Option<&Path>, storage: Option<&Path>) -> Result<Self, ConfigError> {
        let home = std::env::var_os(HOME_ENV).map(PathBuf::from);
        let model = std::env::var(MODEL_ENV).ok();

        let dir = storage
            .map(Path::to_path_buf)
            .or_else(|| home.clone())
            .unwrap_or_else(|| StorageConfig::default().dir);
        let path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dir.join(CONFIG_FILE));

        let mut config = Self::load(&path)?;
        config.apply_overrides(home, model);
        if let Some(storage) = storage {
            config.storage.dir = storage.to_path_buf();
        }
        Ok(config)
    }

    pub fn apply_overrides(&mut self, home: Option<PathBuf>, model: Option<String>) {
        if let Some(home) = home {
            self.storage.dir = home;
        }
        if let Some(model) = model.filter(|model| !model.trim().is_empty()) {
            self.generation.model = model;
        }
    }

    pub fn history_path(&self) -> PathBuf {
        self.storage.dir.join(HISTORY_FILE)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.storage.dir.join(MODELS_DIR)
    }
}
