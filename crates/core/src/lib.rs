//! wsync core library.
//!
//! Reconciles a workspace of version-controlled checkouts (git, hg, svn,
//! bzr) against a rosinstall manifest: configuration, manifest model, VCS
//! adapters, workspace scanning, conflict policy, the reconciliation engine
//! and the executor that applies its decisions.

pub mod config;
pub mod errors;
pub mod executor;
pub mod manifest;
pub mod models;
pub mod policy;
pub mod reconcile;
pub mod scanner;
pub mod vcs;

// Re-exports for convenience.
pub use config::ToolConfig;
pub use manifest::{Manifest, ManifestEntry, VcsKind};
pub use models::{Action, EntryOutcome, EntryStatus, LocalState, ReconcileReport};
pub use policy::{ConflictMode, ConflictPrompt, Mismatch, Policy, Resolution};
pub use reconcile::Reconciler;
