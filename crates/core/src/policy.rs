//! Conflict-resolution policy and mismatch classification.

use std::fmt;
use std::path::PathBuf;

use crate::manifest::{ManifestEntry, VcsKind};
use crate::models::LocalState;
use crate::vcs::uris_match;

/// How a URI or VCS-kind mismatch is resolved. Exactly one mode is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConflictMode {
    /// Report the entry as failed and leave it untouched.
    #[default]
    Fail,
    /// Remove the local path and check out afresh.
    DeleteChanged,
    /// Refuse to touch the entry; the run fails.
    AbortChanged,
    /// Move the local path into a unique subdirectory of the given directory,
    /// then check out afresh.
    BackupChanged(PathBuf),
}

/// Policy for one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    pub mode: ConflictMode,
    /// Keep going after an entry fails; tool and filesystem errors are
    /// downgraded to skips.
    pub continue_on_error: bool,
    /// Whether a [`ConflictPrompt`] may be consulted under
    /// [`ConflictMode::Fail`].
    pub interactive: bool,
}

impl Policy {
    pub fn new(mode: ConflictMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn continue_on_error(mut self, value: bool) -> Self {
        self.continue_on_error = value;
        self
    }

    pub fn interactive(mut self, value: bool) -> Self {
        self.interactive = value;
        self
    }
}

/// Relation between a manifest entry and its local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// Local path absent.
    Missing,
    /// Local working copy matches the manifest.
    Clean,
    /// Same VCS kind, different (or unknown) URI.
    UriChanged {
        expected: String,
        found: Option<String>,
    },
    /// Different VCS kind; `found` is `None` for a plain directory.
    VcsChanged {
        expected: VcsKind,
        found: Option<VcsKind>,
    },
}

impl Mismatch {
    /// Whether this mismatch has to pass the policy gate.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::UriChanged { .. } | Self::VcsChanged { .. })
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Clean => write!(f, "clean"),
            Self::UriChanged { expected, found } => write!(
                f,
                "uri changed from {} to {expected}",
                found.as_deref().unwrap_or("<unknown>")
            ),
            Self::VcsChanged { expected, found } => match found {
                Some(found) => write!(f, "vcs type changed from {found} to {expected}"),
                None => write!(f, "existing path is not a {expected} checkout"),
            },
        }
    }
}

/// Classify `state` against `entry`.
pub fn classify(entry: &ManifestEntry, state: &LocalState) -> Mismatch {
    if !state.exists {
        return Mismatch::Missing;
    }
    if state.detected_vcs_kind != Some(entry.vcs_kind) {
        return Mismatch::VcsChanged {
            expected: entry.vcs_kind,
            found: state.detected_vcs_kind,
        };
    }
    let expected = entry.uri.clone().unwrap_or_default();
    match state.detected_uri.as_deref() {
        Some(found) if uris_match(found, &expected) => Mismatch::Clean,
        found => Mismatch::UriChanged {
            expected,
            found: found.map(str::to_string),
        },
    }
}

/// One-off answer to a conflict from an interactive prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Delete,
    Backup(PathBuf),
    Abort,
    Skip,
}

/// Asks the user how to resolve a conflict when no policy flag was given.
pub trait ConflictPrompt: Send + Sync {
    /// `None` means no answer could be obtained; the entry then fails.
    fn choose(
        &self,
        entry: &ManifestEntry,
        mismatch: &Mismatch,
        state: &LocalState,
    ) -> Option<Resolution>;
}
