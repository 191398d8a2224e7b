//! Typed build failures.
//!
//! Everything fallible in this crate returns `anyhow::Result`. The conditions
//! callers (and tests) need to tell apart are raised as [`BuildError`] values
//! inside the `anyhow::Error`, so they can be recovered with
//! `err.downcast_ref::<BuildError>()` even after context has been attached.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Broad failure categories reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required archive, patch or tool could not be located.
    InputNotFound,
    /// A packaging assumption was violated (archive layout, destdir output).
    StructuralViolation,
    /// A spawned process exited unsuccessfully.
    ExternalCommandFailure,
    /// A patch did not apply cleanly.
    PatchRejected,
    /// The invocation itself was wrong (bad action path, bad config, lock held).
    Usage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InputNotFound => write!(f, "input not found"),
            ErrorKind::StructuralViolation => write!(f, "structural violation"),
            ErrorKind::ExternalCommandFailure => write!(f, "external command failure"),
            ErrorKind::PatchRejected => write!(f, "patch rejected"),
            ErrorKind::Usage => write!(f, "usage error"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("could not find '{name}' in any of: {}", display_paths(.searched))]
    InputNotFound { name: String, searched: Vec<PathBuf> },

    #[error("could not locate tool '{name}' on PATH '{path}'")]
    ToolNotFound { name: String, path: String },

    #[error(
        "expected exactly one top-level directory in '{}' after extraction, found {}: [{}]",
        .dir.display(),
        .entries.len(),
        .entries.join(", ")
    )]
    ArchiveLayout { dir: PathBuf, entries: Vec<String> },

    #[error(
        "install did not produce the expected prefix subtree '{}'",
        .expected.display()
    )]
    MissingPrefixCapture { expected: PathBuf },

    #[error("prefix '{}' is not an absolute path", .prefix.display())]
    RelativePrefix { prefix: PathBuf },

    #[error("prefix '{}' contains '.' or '..' segments", .prefix.display())]
    UnnormalizedPrefix { prefix: PathBuf },

    #[error("refusing to populate non-empty directory '{}'", .path.display())]
    DestinationNotEmpty { path: PathBuf },

    #[error("command failed ({status}): {command}")]
    CommandFailed { command: String, status: String },

    #[error(
        "patch '{}' did not apply to '{}'",
        .patch.display(),
        .dest.display()
    )]
    PatchRejected { patch: PathBuf, dest: PathBuf },

    #[error("no action at '{path}'; run `toolchain-builder list` to see available actions")]
    UnknownAction { path: String },

    #[error("invalid action name '{name}': names must be non-empty and must not contain '/'")]
    InvalidActionName { name: String },

    #[error("duplicate action '{name}' under '{parent}'")]
    DuplicateAction { parent: String, name: String },

    #[error("build root is locked by another process: {}", .path.display())]
    LockHeld { path: PathBuf },

    #[error("invalid config '{}': {reason}", .path.display())]
    InvalidConfig { path: PathBuf, reason: String },
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::InputNotFound { .. } | BuildError::ToolNotFound { .. } => {
                ErrorKind::InputNotFound
            }
            BuildError::ArchiveLayout { .. }
            | BuildError::MissingPrefixCapture { .. }
            | BuildError::RelativePrefix { .. }
            | BuildError::UnnormalizedPrefix { .. }
            | BuildError::DestinationNotEmpty { .. } => ErrorKind::StructuralViolation,
            BuildError::CommandFailed { .. } => ErrorKind::ExternalCommandFailure,
            BuildError::PatchRejected { .. } => ErrorKind::PatchRejected,
            BuildError::UnknownAction { .. }
            | BuildError::InvalidActionName { .. }
            | BuildError::DuplicateAction { .. }
            | BuildError::LockHeld { .. }
            | BuildError::InvalidConfig { .. } => ErrorKind::Usage,
        }
    }
}

/// The outermost [`BuildError`] in an error chain, whether it was the
/// original error or attached later as context.
pub fn build_error(err: &anyhow::Error) -> Option<&BuildError> {
    err.downcast_ref::<BuildError>()
        .or_else(|| err.chain().find_map(|cause| cause.downcast_ref::<BuildError>()))
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
