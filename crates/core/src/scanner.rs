//! Read-only inspection of an entry's local path.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::VcsError;
use crate::manifest::{ManifestEntry, VcsKind};
use crate::models::LocalState;
use crate::vcs::{detect_kind, VcsRegistry};

/// Classifies the on-disk state of manifest entries. Never mutates the
/// filesystem.
pub struct Scanner<'a> {
    workspace: &'a Path,
    registry: &'a VcsRegistry,
}

impl<'a> Scanner<'a> {
    pub fn new(workspace: &'a Path, registry: &'a VcsRegistry) -> Self {
        Self {
            workspace,
            registry,
        }
    }

    pub fn path_of(&self, entry: &ManifestEntry) -> PathBuf {
        entry.path_in(self.workspace)
    }

    /// Observe the local state of `entry`.
    ///
    /// A missing path is a normal state. When the working copy has the
    /// entry's own kind, adapter failures are returned as errors: an unknown
    /// URI must never be mistaken for a changed one. For a working copy of
    /// another kind the URI is irrelevant, so a failed query only marks it
    /// as modified.
    pub async fn scan(&self, entry: &ManifestEntry) -> Result<LocalState, VcsError> {
        let path = self.path_of(entry);
        if !path.exists() {
            debug!(local_name = %entry.local_name, "path missing");
            return Ok(LocalState::missing());
        }

        let detected = detect_kind(&path);
        let mut state = LocalState {
            exists: true,
            detected_vcs_kind: detected,
            ..LocalState::default()
        };

        let Some(kind) = detected else {
            debug!(local_name = %entry.local_name, "path exists without vcs marker");
            return Ok(state);
        };
        if kind == VcsKind::Other {
            return Ok(state);
        }

        if kind != entry.vcs_kind {
            match self.inspect(kind, &path).await {
                Ok((uri, modified)) => {
                    state.detected_uri = uri;
                    state.has_local_modifications = modified;
                }
                Err(e) => {
                    warn!(local_name = %entry.local_name, error = %e, "cannot inspect working copy");
                    state.has_local_modifications = true;
                }
            }
            return Ok(state);
        }

        let (uri, modified) = self
            .inspect(kind, &path)
            .await
            .map_err(|e| e.at(&path, "inspect"))?;
        state.detected_uri = uri;
        state.has_local_modifications = modified;

        debug!(
            local_name = %entry.local_name,
            kind = %kind,
            uri = ?state.detected_uri,
            modified = state.has_local_modifications,
            "scanned working copy"
        );
        Ok(state)
    }

    async fn inspect(&self, kind: VcsKind, path: &Path) -> Result<(Option<String>, bool), VcsError> {
        let client = self.registry.get(kind)?;
        let uri = client.current_uri(path).await?;
        let modified = client.is_modified(path).await?;
        Ok((uri, modified))
    }
}
