//! Version-control adapters.
//!
//! Every supported kind implements [`VcsClient`], a narrow capability set:
//! query the checked-out URI, detect local modifications, check out and
//! update. The [`VcsRegistry`] selects the client for a declared or detected
//! [`VcsKind`].

pub mod bzr;
pub mod command;
pub mod git;
pub mod hg;
pub mod svn;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ToolConfig;
use crate::errors::VcsError;
use crate::manifest::VcsKind;

pub use bzr::BzrClient;
pub use command::VcsCommand;
pub use git::GitClient;
pub use hg::HgClient;
pub use svn::SvnClient;

/// Uniform operations on a working copy of one VCS kind.
#[async_trait]
pub trait VcsClient: Send + Sync {
    fn kind(&self) -> VcsKind;

    /// URI the working copy at `path` was checked out from, if it has one.
    async fn current_uri(&self, path: &Path) -> Result<Option<String>, VcsError>;

    /// Whether the working copy has uncommitted or untracked changes.
    async fn is_modified(&self, path: &Path) -> Result<bool, VcsError>;

    /// Create a new working copy of `uri` at `path` (which must not exist).
    async fn checkout(&self, path: &Path, uri: &str, version: Option<&str>)
        -> Result<(), VcsError>;

    /// Bring an existing working copy at `path` up to date with `uri`.
    async fn update(&self, path: &Path, uri: &str, version: Option<&str>) -> Result<(), VcsError>;
}

/// Detect the VCS kind of an existing path by its marker directory.
pub fn detect_kind(path: &Path) -> Option<VcsKind> {
    VcsKind::VERSIONED.into_iter().find(|kind| {
        kind.marker()
            .map(|m| path.join(m).exists())
            .unwrap_or(false)
    })
}

/// Canonical form used to compare URIs: trimmed, without a `file://` prefix
/// and without trailing slashes.
pub fn normalize_uri(uri: &str) -> String {
    let trimmed = uri.trim();
    let stripped = trimmed.strip_prefix("file://").unwrap_or(trimmed);
    let without_slash = stripped.trim_end_matches('/');
    if without_slash.is_empty() {
        stripped.to_string()
    } else {
        without_slash.to_string()
    }
}

pub fn uris_match(a: &str, b: &str) -> bool {
    normalize_uri(a) == normalize_uri(b)
}

/// Maps each [`VcsKind`] to its client.
#[derive(Clone, Default)]
pub struct VcsRegistry {
    clients: HashMap<VcsKind, Arc<dyn VcsClient>>,
}

impl VcsRegistry {
    /// An empty registry; see [`register`](Self::register).
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in git, hg, svn and bzr clients.
    pub fn from_config(config: &ToolConfig) -> Self {
        let timeout = config.vcs.timeout();
        let mut registry = Self::new();
        registry.register(Arc::new(GitClient::new()));
        registry.register(Arc::new(HgClient::new(&config.vcs.binaries.hg, timeout)));
        registry.register(Arc::new(SvnClient::from_config(
            &config.vcs.binaries.svn,
            timeout,
            &config.svn,
        )));
        registry.register(Arc::new(BzrClient::new(&config.vcs.binaries.bzr, timeout)));
        registry
    }

    /// Add or replace the client for its kind.
    pub fn register(&mut self, client: Arc<dyn VcsClient>) {
        debug!(kind = %client.kind(), "registered vcs client");
        self.clients.insert(client.kind(), client);
    }

    pub fn get(&self, kind: VcsKind) -> Result<&dyn VcsClient, VcsError> {
        self.clients
            .get(&kind)
            .map(|c| c.as_ref())
            .ok_or_else(|| VcsError::Unsupported(kind.to_string()))
    }
}

impl std::fmt::Debug for VcsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.clients.keys().map(VcsKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("VcsRegistry").field("kinds", &kinds).finish()
    }
}
