//! Error types for the wsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// VCS errors
// ---------------------------------------------------------------------------

/// Errors from the version-control adapters.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The tool binary (git, hg, svn, bzr) was not found on `$PATH`.
    #[error("{0} binary not found")]
    BinaryNotFound(String),

    /// A tool command exited with a non-zero status.
    #[error("{tool} command failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        stderr: String,
    },

    /// A tool command did not finish within the configured timeout.
    #[error("{tool} command timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    /// An adapter operation failed on a specific working copy.
    #[error("{action} failed at '{}': {detail}", .path.display())]
    Operation {
        path: PathBuf,
        action: String,
        detail: String,
    },

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2(#[from] git2::Error),

    /// No adapter is registered for the requested kind.
    #[error("no client registered for vcs type '{0}'")]
    Unsupported(String),

    /// Generic I/O wrapper.
    #[error("vcs I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VcsError {
    /// Attach the working-copy path and attempted action to a lower-level
    /// failure. `Operation` errors pass through unchanged.
    pub fn at(self, path: impl Into<PathBuf>, action: &str) -> Self {
        match self {
            err @ VcsError::Operation { .. } => err,
            other => VcsError::Operation {
                path: path.into(),
                action: action.to_string(),
                detail: other.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest errors
// ---------------------------------------------------------------------------

/// Errors from loading, merging and saving rosinstall manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest source does not exist.
    #[error("manifest not found: {0}")]
    NotFound(String),

    /// YAML parse or serialize error.
    #[error("manifest parse error in '{source_name}': {detail}")]
    Parse { source_name: String, detail: String },

    /// An element used a key other than git/hg/svn/bzr/other.
    #[error("unknown vcs type '{0}' in manifest")]
    UnknownVcs(String),

    /// An element is missing a required field.
    #[error("manifest element '{element}' is missing '{field}'")]
    MissingField { element: String, field: String },

    /// Two elements declare the same local name within one source.
    #[error("duplicate local-name '{0}' in manifest")]
    DuplicateLocalName(String),

    /// Generic I/O error.
    #[error("manifest I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from tool configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Reconciliation errors
// ---------------------------------------------------------------------------

/// Per-entry failures raised while reconciling a workspace.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Local state differs from the manifest and the active policy does not
    /// allow touching it.
    #[error("'{local_name}' conflicts with manifest: {detail}")]
    Conflict { local_name: String, detail: String },

    /// The underlying VCS tool failed.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// A delete or backup on the local filesystem failed.
    #[error("{action} failed at '{}': {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        action: String,
        #[source]
        source: std::io::Error,
    },
}

impl ReconcileError {
    /// Whether this failure came from a tool or the filesystem rather than
    /// from the conflict policy.
    pub fn is_operational(&self) -> bool {
        !matches!(self, ReconcileError::Conflict { .. })
    }
}
