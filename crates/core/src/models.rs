//! Data types shared by the scanner, engine, executor and CLI.

use std::fmt;
use std::path::PathBuf;

use crate::manifest::VcsKind;

/// Observed state of one entry's local path. Derived per run, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalState {
    pub exists: bool,
    /// `None` for an existing path without a VCS marker.
    pub detected_vcs_kind: Option<VcsKind>,
    pub detected_uri: Option<String>,
    pub has_local_modifications: bool,
}

impl LocalState {
    pub fn missing() -> Self {
        Self::default()
    }
}

/// What the engine decided to do with an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Unmanaged entry; nothing to do.
    None,
    Checkout,
    Update,
    DeleteAndCheckout,
    /// Move the current contents into the given directory, then check out.
    BackupAndCheckout(PathBuf),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "unmanaged"),
            Self::Checkout => write!(f, "checkout"),
            Self::Update => write!(f, "update"),
            Self::DeleteAndCheckout => write!(f, "delete + checkout"),
            Self::BackupAndCheckout(dir) => write!(f, "backup to {} + checkout", dir.display()),
        }
    }
}

/// Result of reconciling one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Succeeded {
        action: Action,
        /// Where the previous contents went, for backup actions.
        backup: Option<PathBuf>,
    },
    /// Unresolved conflict or an operation error.
    Failed(String),
    /// Refused by `--abort-changed-uri` (or an interactive abort).
    Aborted(String),
    /// Left alone: a user choice, or an error masked by continue-on-error.
    Skipped(String),
}

impl EntryStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Aborted(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "ok",
            Self::Failed(_) => "failed",
            Self::Aborted(_) => "aborted",
            Self::Skipped(_) => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOutcome {
    pub local_name: String,
    pub vcs_kind: VcsKind,
    pub path: PathBuf,
    pub status: EntryStatus,
}

/// Outcome of a whole run, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub outcomes: Vec<EntryOutcome>,
    /// Processing stopped at the first failure; later entries were not
    /// visited.
    pub halted: bool,
}

impl ReconcileReport {
    pub fn success(&self) -> bool {
        !self.halted && !self.outcomes.iter().any(|o| o.status.is_failure())
    }

    /// Process exit code: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_failure())
    }

    pub fn get(&self, local_name: &str) -> Option<&EntryOutcome> {
        self.outcomes.iter().find(|o| o.local_name == local_name)
    }
}
