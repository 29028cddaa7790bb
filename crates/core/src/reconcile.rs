//! Workspace reconciliation engine.
//!
//! The [`Reconciler`] walks a manifest in order and, for each entry:
//!
//! 1. Scans the local path.
//! 2. Classifies it against the manifest ([`Mismatch`]).
//! 3. Decides an [`Action`]: a missing path is checked out, a clean working
//!    copy is updated, and any URI or VCS-kind change goes through the
//!    conflict policy.
//! 4. Hands the action to the [`Executor`].
//!
//! Without `continue_on_error` the first failed or aborted entry stops the
//! run. With it, processing goes on and tool errors during a plain checkout,
//! update or scan become skips. Policy conflicts, and errors after a delete
//! or backup already removed the working copy, still fail the run.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::config::ToolConfig;
use crate::errors::ReconcileError;
use crate::executor::{Executor, DEFAULT_BACKUP_FORMAT};
use crate::manifest::{Manifest, ManifestEntry, VcsKind};
use crate::models::{Action, EntryOutcome, EntryStatus, LocalState, ReconcileReport};
use crate::policy::{classify, ConflictMode, ConflictPrompt, Mismatch, Policy, Resolution};
use crate::scanner::Scanner;
use crate::vcs::VcsRegistry;

/// Per-entry decision, before anything touches the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Apply(Action),
    /// Unresolved conflict under [`ConflictMode::Fail`].
    Conflict(String),
    Abort(String),
    Skip(String),
}

/// Reconciles a workspace directory against manifests.
pub struct Reconciler {
    workspace: PathBuf,
    registry: VcsRegistry,
    backup_format: String,
    prompt: Option<Box<dyn ConflictPrompt>>,
}

impl Reconciler {
    pub fn new(workspace: impl Into<PathBuf>, registry: VcsRegistry) -> Self {
        Self {
            workspace: workspace.into(),
            registry,
            backup_format: DEFAULT_BACKUP_FORMAT.to_string(),
            prompt: None,
        }
    }

    /// Reconciler with the built-in adapters configured from `config`.
    pub fn from_config(workspace: impl Into<PathBuf>, config: &ToolConfig) -> Self {
        Self::new(workspace, VcsRegistry::from_config(config))
            .with_backup_format(config.backup.name_format.clone())
    }

    pub fn with_backup_format(mut self, format: impl Into<String>) -> Self {
        self.backup_format = format.into();
        self
    }

    /// Install the prompt consulted for conflicts when the policy is
    /// interactive and no mode flag was given.
    pub fn with_prompt(mut self, prompt: Box<dyn ConflictPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Reconcile every entry of `manifest` in order.
    pub async fn reconcile(&self, manifest: &Manifest, policy: &Policy) -> ReconcileReport {
        info!(
            workspace = %self.workspace.display(),
            entries = manifest.len(),
            mode = ?policy.mode,
            continue_on_error = policy.continue_on_error,
            "starting reconciliation"
        );
        let scanner = Scanner::new(&self.workspace, &self.registry);
        let executor = Executor::new(&self.registry, &self.backup_format);
        let mut report = ReconcileReport::default();

        for entry in manifest.entries() {
            let outcome = self.reconcile_entry(&scanner, &executor, entry, policy).await;
            let failed = outcome.status.is_failure();
            report.outcomes.push(outcome);

            if failed && !policy.continue_on_error {
                let remaining = manifest.len() - report.outcomes.len();
                if remaining > 0 {
                    warn!(local_name = %entry.local_name, remaining, "stopping at first failure");
                    report.halted = true;
                }
                break;
            }
        }

        info!(
            processed = report.outcomes.len(),
            failures = report.failures().count(),
            "reconciliation finished"
        );
        report
    }

    async fn reconcile_entry(
        &self,
        scanner: &Scanner<'_>,
        executor: &Executor<'_>,
        entry: &ManifestEntry,
        policy: &Policy,
    ) -> EntryOutcome {
        let path = scanner.path_of(entry);
        let status = self.entry_status(scanner, executor, entry, &path, policy).await;
        EntryOutcome {
            local_name: entry.local_name.clone(),
            vcs_kind: entry.vcs_kind,
            path,
            status,
        }
    }

    async fn entry_status(
        &self,
        scanner: &Scanner<'_>,
        executor: &Executor<'_>,
        entry: &ManifestEntry,
        path: &Path,
        policy: &Policy,
    ) -> EntryStatus {
        if entry.vcs_kind == VcsKind::Other {
            if !path.exists() {
                warn!(local_name = %entry.local_name, "unmanaged path does not exist");
            }
            return EntryStatus::Succeeded {
                action: Action::None,
                backup: None,
            };
        }

        let state = match scanner.scan(entry).await {
            Ok(state) => state,
            Err(e) => return Self::error_status(entry, e.into(), policy, true),
        };
        let mismatch = classify(entry, &state);
        debug!(local_name = %entry.local_name, %mismatch, "classified");

        let action = match self.decide(entry, &mismatch, &state, policy) {
            Decision::Apply(action) => action,
            Decision::Conflict(detail) => {
                let err = ReconcileError::Conflict {
                    local_name: entry.local_name.clone(),
                    detail,
                };
                error!(error = %err, "unresolved conflict");
                return EntryStatus::Failed(err.to_string());
            }
            Decision::Abort(detail) => {
                warn!(local_name = %entry.local_name, %detail, "aborted by policy");
                return EntryStatus::Aborted(detail);
            }
            Decision::Skip(reason) => {
                info!(local_name = %entry.local_name, %reason, "skipped");
                return EntryStatus::Skipped(reason);
            }
        };

        if mismatch.is_conflict() && state.has_local_modifications {
            warn!(local_name = %entry.local_name, %action, "replacing working copy with local modifications");
        }

        match executor.apply(entry, path, &action).await {
            Ok(backup) => {
                info!(local_name = %entry.local_name, %action, "reconciled");
                EntryStatus::Succeeded { action, backup }
            }
            Err(e) => {
                // Once delete or backup has run, the old working copy is gone.
                let maskable = matches!(action, Action::Checkout | Action::Update);
                Self::error_status(entry, e, policy, maskable)
            }
        }
    }

    /// Status for an entry that hit an error. Under `continue_on_error`,
    /// operational errors that left the workspace as it was become skips.
    fn error_status(
        entry: &ManifestEntry,
        err: ReconcileError,
        policy: &Policy,
        maskable: bool,
    ) -> EntryStatus {
        if policy.continue_on_error && maskable && err.is_operational() {
            error!(local_name = %entry.local_name, error = %err, "continuing after error");
            return EntryStatus::Skipped(err.to_string());
        }
        error!(local_name = %entry.local_name, error = %err, "reconcile failed");
        EntryStatus::Failed(err.to_string())
    }

    // -----------------------------------------------------------------------
    // Policy gate
    // -----------------------------------------------------------------------

    /// Decide what to do with `entry` given its classified state.
    pub fn decide(
        &self,
        entry: &ManifestEntry,
        mismatch: &Mismatch,
        state: &LocalState,
        policy: &Policy,
    ) -> Decision {
        match mismatch {
            Mismatch::Missing => return Decision::Apply(Action::Checkout),
            Mismatch::Clean => return Decision::Apply(Action::Update),
            Mismatch::UriChanged { .. } | Mismatch::VcsChanged { .. } => {}
        }

        let detail = mismatch.to_string();
        match &policy.mode {
            ConflictMode::DeleteChanged => Decision::Apply(Action::DeleteAndCheckout),
            ConflictMode::BackupChanged(dir) => Decision::Apply(Action::BackupAndCheckout(dir.clone())),
            ConflictMode::AbortChanged => Decision::Abort(detail),
            ConflictMode::Fail => {
                let answer = match (&self.prompt, policy.interactive) {
                    (Some(prompt), true) => prompt.choose(entry, mismatch, state),
                    _ => None,
                };
                match answer {
                    Some(Resolution::Delete) => Decision::Apply(Action::DeleteAndCheckout),
                    Some(Resolution::Backup(dir)) => Decision::Apply(Action::BackupAndCheckout(dir)),
                    Some(Resolution::Abort) => Decision::Abort(detail),
                    Some(Resolution::Skip) => Decision::Skip(format!("left as is: {detail}")),
                    None => Decision::Conflict(detail),
                }
            }
        }
    }
}
