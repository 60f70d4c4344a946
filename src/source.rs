//! Ordered, finite streams of textual machine commands.

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};

/// File extension a command file must carry.
pub const COMMAND_FILE_EXTENSION: &str = "gcode";

/// Reasons a [CommandSource] could not be built.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The file is not a command file; nothing was read.
    #[error("{} is not a .{} file", .0.display(), COMMAND_FILE_EXTENSION)]
    UnsupportedFormat(PathBuf),

    /// The file could not be read.
    #[error("unable to open {}: {source}", .path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Something that can read a whole file into memory. Exists so the file
/// system can be swapped out.
pub trait SourceReader {
    /// Read the file at `path` as UTF-8 text.
    fn read_to_string(&self, path: &Path) -> impl Future<Output = std::io::Result<String>>;
}

/// [SourceReader] backed by [tokio::fs].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFs;

impl SourceReader for TokioFs {
    async fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// An immutable, ordered list of commands. Cloning is cheap and iterating
/// always starts over from the first command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSource {
    lines: Arc<[String]>,
}

impl CommandSource {
    /// Build a source from in-memory commands.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Split `text` into one command per line, in textual order.
    pub fn from_text(text: &str) -> Self {
        Self::from_lines(text.lines())
    }

    /// Load a command file from disk.
    pub async fn from_file(path: &Path) -> Result<Self, SourceError> {
        Self::from_file_with(&TokioFs, path).await
    }

    /// Load a command file through `reader`. Files without the command
    /// file extension are refused before `reader` is touched.
    pub async fn from_file_with<R: SourceReader>(reader: &R, path: &Path) -> Result<Self, SourceError> {
        if !is_command_file(path) {
            return Err(SourceError::UnsupportedFormat(path.to_owned()));
        }

        let text = reader.read_to_string(path).await.map_err(|source| SourceError::Io {
            path: path.to_owned(),
            source,
        })?;
        let source = Self::from_text(&text);
        tracing::debug!(path = %path.display(), lines = source.len(), "loaded command file");
        Ok(source)
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// `true` when there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Walk the commands from the start.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}

impl<'a> IntoIterator for &'a CommandSource {
    type Item = &'a str;
    type IntoIter = std::iter::Map<std::slice::Iter<'a, String>, fn(&'a String) -> &'a str>;

    fn into_iter(self) -> Self::IntoIter {
        let as_str: fn(&'a String) -> &'a str = String::as_str;
        self.lines.iter().map(as_str)
    }
}

/// `true` if `path` carries the command file extension (any case).
pub fn is_command_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(COMMAND_FILE_EXTENSION))
}
