use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{AnyGenerator, GeneratorRegistry, DEFAULT_GENERATOR};

/// Toolpath generator selection, the `[toolpath]` table of the config
/// file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Name of the generator to use, see [super::GENERATORS].
    #[serde(default = "default_generator")]
    pub generator: String,

    /// Generator-specific configuration file (a Prusa Slicer `.ini`, for
    /// instance).
    #[serde(default)]
    pub config: Option<String>,
}

fn default_generator() -> String {
    DEFAULT_GENERATOR.to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generator: default_generator(),
            config: None,
        }
    }
}

impl Config {
    /// Absolute path of the generator configuration file, if one is set.
    pub fn config_path(&self) -> Result<Option<PathBuf>> {
        let Some(config) = &self.config else {
            return Ok(None);
        };
        let path: PathBuf = config.parse()?;
        Ok(Some(std::fs::canonicalize(&path)?))
    }

    /// Create the generator this configuration selects.
    pub fn load(&self) -> Result<AnyGenerator> {
        GeneratorRegistry::new(self.clone()).load()
    }
}
