//! Stage error types.

use crate::tools::ToolError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised inside a Stage.
///
/// Compile and bundle errors are recoverable: the Stage logs them, records
/// them as warnings and carries on. Everything else fails the Stage, and
/// with it the Task.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to {step} `{}`", path.display())]
    Compile {
        step: &'static str,
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("failed to bundle `{}`, emitting an empty bundle", entry.display())]
    Bundle {
        entry: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("filesystem error at `{}`", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid source pattern")]
    Pattern(#[from] globset::Error),
}

impl StageError {
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Compile { .. } | Self::Bundle { .. })
    }

    pub fn fs(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Filesystem { path, source }
    }
}

/// Format an error with its source chain on one line.
pub fn chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}
