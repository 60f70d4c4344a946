//! This module contains backend implementations that turn a model file
//! (such as an `.stl`) into a [CommandSource] for a specific machine, by
//! way of some external toolpath generator.

mod config;
pub mod noop;
pub mod prusa;

pub use config::Config;

use std::{future::Future, path::Path};

use anyhow::Result;

use crate::CommandSource;

/// Name of the generator used when none is configured.
pub const DEFAULT_GENERATOR: &str = "Prusa Slicer";

/// Something that can produce machine commands from a model file.
pub trait ToolpathGenerator {
    /// Generate commands for `model_file`.
    fn generate(&self, model_file: &Path) -> impl Future<Output = Result<CommandSource>>;
}

/// Describes one available generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorDescriptor {
    /// Name used to select the generator.
    pub name: &'static str,

    /// One-line human readable description.
    pub description: &'static str,
}

/// Every generator this crate knows how to run.
pub const GENERATORS: &[GeneratorDescriptor] = &[
    GeneratorDescriptor {
        name: prusa::NAME,
        description: "Slice with the Prusa Slicer command line",
    },
    GeneratorDescriptor {
        name: noop::NAME,
        description: "Produce no commands at all",
    },
];

/// Any of the generators in [GENERATORS].
#[derive(Debug, Clone)]
pub enum AnyGenerator {
    /// See [prusa::Generator].
    Prusa(prusa::Generator),

    /// See [noop::Generator].
    Noop(noop::Generator),
}

impl From<prusa::Generator> for AnyGenerator {
    fn from(generator: prusa::Generator) -> Self {
        Self::Prusa(generator)
    }
}

impl From<noop::Generator> for AnyGenerator {
    fn from(generator: noop::Generator) -> Self {
        Self::Noop(generator)
    }
}

impl ToolpathGenerator for AnyGenerator {
    async fn generate(&self, model_file: &Path) -> Result<CommandSource> {
        match self {
            Self::Prusa(generator) => generator.generate(model_file).await,
            Self::Noop(generator) => generator.generate(model_file).await,
        }
    }
}

/// Picks a generator out of [GENERATORS] by name.
#[derive(Debug, Clone)]
pub struct GeneratorRegistry {
    config: Config,
}

impl GeneratorRegistry {
    /// Registry selecting whatever `config` names.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// All available generators.
    pub fn descriptors(&self) -> &'static [GeneratorDescriptor] {
        GENERATORS
    }

    /// The selected generator. Names match ignoring case.
    pub fn selected(&self) -> Result<&'static GeneratorDescriptor> {
        let name = self.config.generator.as_str();
        GENERATORS
            .iter()
            .find(|descriptor| descriptor.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow::anyhow!("unknown toolpath generator: {}", name))
    }

    /// Create the selected generator.
    pub fn load(&self) -> Result<AnyGenerator> {
        let descriptor = self.selected()?;
        tracing::debug!(generator = descriptor.name, "loading toolpath generator");

        Ok(match descriptor.name {
            prusa::NAME => prusa::Generator::new(self.config.config_path()?.as_deref()).into(),
            _ => noop::Generator::new().into(),
        })
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
