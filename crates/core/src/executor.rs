//! Applies decided actions to the workspace.
//!
//! Delete-then-checkout and backup-then-checkout are treated as one unit: if
//! the checkout fails, whatever it left behind is removed so the path ends up
//! absent rather than half written.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info, warn};

use crate::errors::{ReconcileError, VcsError};
use crate::manifest::ManifestEntry;
use crate::models::Action;
use crate::vcs::VcsRegistry;

/// Default strftime pattern for backup directory names.
pub const DEFAULT_BACKUP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

pub struct Executor<'a> {
    registry: &'a VcsRegistry,
    backup_format: &'a str,
}

impl<'a> Executor<'a> {
    pub fn new(registry: &'a VcsRegistry, backup_format: &'a str) -> Self {
        Self {
            registry,
            backup_format,
        }
    }

    /// Apply `action` for `entry` at `path`. Returns the backup location for
    /// backup actions.
    pub async fn apply(
        &self,
        entry: &ManifestEntry,
        path: &Path,
        action: &Action,
    ) -> Result<Option<PathBuf>, ReconcileError> {
        match action {
            Action::None => Ok(None),
            Action::Checkout => {
                self.checkout(entry, path).await?;
                Ok(None)
            }
            Action::Update => {
                self.update(entry, path).await?;
                Ok(None)
            }
            Action::DeleteAndCheckout => {
                remove_path(path)?;
                self.checkout(entry, path).await?;
                Ok(None)
            }
            Action::BackupAndCheckout(dir) => {
                let backup = self.backup(path, dir)?;
                self.checkout(entry, path).await?;
                Ok(Some(backup))
            }
        }
    }

    fn uri<'e>(entry: &'e ManifestEntry, path: &Path) -> Result<&'e str, ReconcileError> {
        entry.uri.as_deref().ok_or_else(|| {
            VcsError::Operation {
                path: path.to_path_buf(),
                action: "checkout".into(),
                detail: format!("entry '{}' has no uri", entry.local_name),
            }
            .into()
        })
    }

    async fn checkout(&self, entry: &ManifestEntry, path: &Path) -> Result<(), ReconcileError> {
        let uri = Self::uri(entry, path)?;
        let client = self.registry.get(entry.vcs_kind)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ReconcileError::Filesystem {
                path: parent.to_path_buf(),
                action: "create parent directory".into(),
                source,
            })?;
        }

        info!(local_name = %entry.local_name, %uri, "checking out");
        if let Err(e) = client.checkout(path, uri, entry.version.as_deref()).await {
            if path.exists() {
                if let Err(cleanup) = remove_path(path) {
                    warn!(path = %path.display(), error = %cleanup, "failed to remove partial checkout");
                }
            }
            return Err(e.at(path, "checkout").into());
        }
        Ok(())
    }

    async fn update(&self, entry: &ManifestEntry, path: &Path) -> Result<(), ReconcileError> {
        let uri = Self::uri(entry, path)?;
        let client = self.registry.get(entry.vcs_kind)?;
        info!(local_name = %entry.local_name, %uri, "updating");
        client
            .update(path, uri, entry.version.as_deref())
            .await
            .map_err(|e| e.at(path, "update"))?;
        Ok(())
    }

    /// Move `path` into a fresh, uniquely named subdirectory of `dir`.
    pub fn backup(&self, path: &Path, dir: &Path) -> Result<PathBuf, ReconcileError> {
        let fs_err = |action: &str, at: &Path| {
            let action = action.to_string();
            let at = at.to_path_buf();
            move |source: io::Error| ReconcileError::Filesystem {
                path: at,
                action,
                source,
            }
        };

        std::fs::create_dir_all(dir).map_err(fs_err("create backup directory", dir))?;
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "backup".to_string());
        let stamp = Local::now().format(self.backup_format).to_string();
        let target = allocate_backup_path(dir, &base, &stamp);

        if let Err(e) = std::fs::rename(path, &target) {
            debug!(error = %e, "rename failed, copying instead");
            copy_recursive(path, &target).map_err(fs_err("backup copy", &target))?;
            remove_path(path)?;
        }
        info!(from = %path.display(), to = %target.display(), "backed up");
        Ok(target)
    }
}

/// First free `<dir>/<base>_<stamp>`, with `_<n>` appended on collision.
pub fn allocate_backup_path(dir: &Path, base: &str, stamp: &str) -> PathBuf {
    let candidate = dir.join(format!("{base}_{stamp}"));
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| dir.join(format!("{base}_{stamp}_{n}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

fn remove_path(path: &Path) -> Result<(), ReconcileError> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ReconcileError::Filesystem {
                path: path.to_path_buf(),
                action: "delete".into(),
                source,
            })
        }
    };
    let result = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|source| ReconcileError::Filesystem {
        path: path.to_path_buf(),
        action: "delete".into(),
        source,
    })?;
    debug!(path = %path.display(), "deleted");
    Ok(())
}

fn copy_recursive(from: &Path, to: &Path) -> io::Result<()> {
    let meta = std::fs::symlink_metadata(from)?;
    #[cfg(unix)]
    if meta.file_type().is_symlink() {
        return std::os::unix::fs::symlink(std::fs::read_link(from)?, to);
    }
    if meta.is_dir() {
        std::fs::create_dir_all(to)?;
        for child in std::fs::read_dir(from)? {
            let child = child?;
            copy_recursive(&child.path(), &to.join(child.file_name()))?;
        }
        return Ok(());
    }
    std::fs::copy(from, to)?;
    Ok(())
}
