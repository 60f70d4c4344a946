//! `noop` implements a no-op generator, one that will accept any model
//! and produce no commands for it.

use std::path::Path;

use anyhow::Result;

use super::ToolpathGenerator;
use crate::CommandSource;

/// Name of this generator.
pub const NAME: &str = "Noop";

/// Noop-generator won't generate anything at all!
#[derive(Copy, Clone, Debug, Default)]
pub struct Generator {}

impl Generator {
    /// Create a new No-op Generator. It won't do anything.
    pub fn new() -> Self {
        Self {}
    }
}

impl ToolpathGenerator for Generator {
    async fn generate(&self, model_file: &Path) -> Result<CommandSource> {
        tracing::debug!(model_file = %model_file.display(), "skipping toolpath generation");
        Ok(CommandSource::from_lines(Vec::<String>::new()))
    }
}
