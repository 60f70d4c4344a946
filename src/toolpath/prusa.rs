//! Support for the Prusa Slicer (https://github.com/prusa3d/PrusaSlicer/),
//! which is based on slic3r.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::ToolpathGenerator;
use crate::{CommandSource, COMMAND_FILE_EXTENSION};

/// Name of this generator.
pub const NAME: &str = "Prusa Slicer";

/// Handle to invoke the Prusa Slicer with some machine-specific config.
#[derive(Debug, Clone)]
pub struct Generator {
    config: Option<PathBuf>,
    binary: Option<PathBuf>,
}

impl Generator {
    /// Create a new [Generator], which will invoke the Prusa Slicer binary
    /// with the specified configuration file, or its built-in defaults.
    pub fn new(config: Option<&Path>) -> Self {
        Self {
            config: config.map(Path::to_owned),
            binary: None,
        }
    }

    /// Run `binary` instead of looking for the slicer where it is usually
    /// installed.
    pub fn with_binary(mut self, binary: &Path) -> Self {
        self.binary = Some(binary.to_owned());
        self
    }

    fn args(&self, model_file: &Path, gcode_path: &Path) -> Result<Vec<String>> {
        let mut args = vec![];
        if let Some(config) = &self.config {
            args.push("--load".to_string());
            args.push(
                config
                    .to_str()
                    .ok_or_else(|| anyhow::anyhow!("Invalid slicer config path: {}", config.display()))?
                    .to_string(),
            );
        }
        args.extend([
            "--support-material".to_string(),
            "--export-gcode".to_string(),
            model_file
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Invalid model file path: {}", model_file.display()))?
                .to_string(),
            "--output".to_string(),
            gcode_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Invalid output G-code path: {}", gcode_path.display()))?
                .to_string(),
        ]);
        Ok(args)
    }
}

impl ToolpathGenerator for Generator {
    async fn generate(&self, model_file: &Path) -> Result<CommandSource> {
        let uid = uuid::Uuid::new_v4();
        let gcode_path = std::env::temp_dir().join(format!("{}.{}", uid, COMMAND_FILE_EXTENSION));
        let args = self.args(model_file, &gcode_path)?;

        let binary = match &self.binary {
            Some(binary) => binary.clone(),
            None => find_prusa_slicer()?,
        };

        tracing::info!(model_file = %model_file.display(), "generating toolpath");
        let output = Command::new(&binary)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", binary.display()))?;

        // Make sure the command was successful.
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to slice: {:?}\nstdout:\n{}stderr:{}", output.status, stdout, stderr);
        }

        let source = CommandSource::from_file(&gcode_path).await;
        if let Err(e) = tokio::fs::remove_file(&gcode_path).await {
            tracing::warn!(path = %gcode_path.display(), error = format!("{:?}", e), "failed to remove G-code file");
        }
        Ok(source?)
    }
}

// Find the prusaslicer executable path on macOS.
#[cfg(target_os = "macos")]
fn find_prusa_slicer() -> Result<PathBuf> {
    let app_path = PathBuf::from("/Applications/PrusaSlicer.app/Contents/MacOS/PrusaSlicer");
    if app_path.exists() {
        Ok(app_path)
    } else {
        anyhow::bail!("Prusa Slicer not found")
    }
}

// Find the prusaslicer executable path on Windows.
#[cfg(target_os = "windows")]
fn find_prusa_slicer() -> Result<PathBuf> {
    let app_path = PathBuf::from("C:\\Program Files\\Prusa3D\\PrusaSlicer\\prusa-slicer-console.exe");
    if app_path.exists() {
        Ok(app_path)
    } else {
        anyhow::bail!("Prusa Slicer not found")
    }
}

// Find the prusaslicer executable path on Linux.
#[cfg(target_os = "linux")]
fn find_prusa_slicer() -> Result<PathBuf> {
    let app_path = PathBuf::from("/usr/bin/prusa-slicer");
    if app_path.exists() {
        Ok(app_path)
    } else {
        anyhow::bail!("Prusa Slicer not found")
    }
}
