//! Git working copies via `git2`.

use std::path::Path;

use async_trait::async_trait;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{BranchType, Repository, StatusOptions};
use tracing::{debug, info, instrument, warn};

use super::VcsClient;
use crate::errors::VcsError;
use crate::manifest::VcsKind;

const REMOTE: &str = "origin";

/// Git adapter backed by libgit2.
#[derive(Debug, Clone, Default)]
pub struct GitClient;

impl GitClient {
    pub fn new() -> Self {
        Self
    }
}

/// Check out `version` (a branch on `origin`, a tag or a commit).
///
/// Branches get a local tracking branch so later updates can fast-forward;
/// anything else leaves HEAD detached.
fn checkout_version(repo: &Repository, version: &str) -> Result<(), git2::Error> {
    let remote_name = format!("{REMOTE}/{version}");
    if let Ok(remote_branch) = repo.find_branch(&remote_name, BranchType::Remote) {
        let commit = remote_branch.get().peel_to_commit()?;
        let local = match repo.find_branch(version, BranchType::Local) {
            Ok(branch) => branch,
            Err(_) => {
                let mut branch = repo.branch(version, &commit, false)?;
                branch.set_upstream(Some(&remote_name))?;
                branch
            }
        };
        let target = local.get().peel_to_commit()?;
        let refname = local
            .get()
            .name()
            .ok_or_else(|| git2::Error::from_str("branch name is not valid utf-8"))?
            .to_string();
        repo.checkout_tree(target.as_object(), Some(CheckoutBuilder::new().safe()))?;
        repo.set_head(&refname)?;
        debug!(version, "checked out branch");
        return Ok(());
    }

    let object = repo.revparse_single(version)?;
    let commit = object.peel_to_commit()?;
    repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))?;
    repo.set_head_detached(commit.id())?;
    debug!(version, sha = %commit.id(), "checked out detached");
    Ok(())
}

/// Fast-forward the current branch to its `origin` counterpart.
fn fast_forward(repo: &Repository, path: &Path) -> Result<(), VcsError> {
    let head = repo.head()?;
    if !head.is_branch() {
        debug!("detached HEAD, fetched only");
        return Ok(());
    }
    let branch = head.shorthand().unwrap_or("HEAD").to_string();
    let upstream_name = format!("refs/remotes/{REMOTE}/{branch}");
    let upstream = match repo.find_reference(&upstream_name) {
        Ok(reference) => reference,
        Err(_) => {
            warn!(%branch, "no upstream branch on origin, fetched only");
            return Ok(());
        }
    };

    let incoming = repo.reference_to_annotated_commit(&upstream)?;
    let (analysis, _) = repo.merge_analysis(&[&incoming])?;
    if analysis.is_up_to_date() {
        debug!(%branch, "already up to date");
        return Ok(());
    }
    if !analysis.is_fast_forward() {
        return Err(VcsError::Operation {
            path: path.to_path_buf(),
            action: "update".into(),
            detail: format!("branch '{branch}' has diverged from {REMOTE}/{branch}"),
        });
    }

    let target = repo.find_object(incoming.id(), None)?;
    repo.checkout_tree(&target, Some(CheckoutBuilder::new().safe()))?;
    let head_name = head
        .name()
        .ok_or_else(|| git2::Error::from_str("HEAD name is not valid utf-8"))?;
    repo.find_reference(head_name)?
        .set_target(incoming.id(), "wsync: fast-forward")?;
    info!(%branch, sha = %incoming.id(), "fast-forwarded");
    Ok(())
}

#[async_trait]
impl VcsClient for GitClient {
    fn kind(&self) -> VcsKind {
        VcsKind::Git
    }

    async fn current_uri(&self, path: &Path) -> Result<Option<String>, VcsError> {
        let repo = Repository::open(path)?;
        let uri = match repo.find_remote(REMOTE) {
            Ok(remote) => remote.url().map(str::to_string),
            Err(_) => None,
        };
        Ok(uri)
    }

    async fn is_modified(&self, path: &Path) -> Result<bool, VcsError> {
        let repo = Repository::open(path)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts))?;
        let modified = statuses
            .iter()
            .any(|s| !s.status().is_empty() && !s.status().is_ignored());
        Ok(modified)
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    async fn checkout(
        &self,
        path: &Path,
        uri: &str,
        version: Option<&str>,
    ) -> Result<(), VcsError> {
        info!("cloning git repository");
        let repo = RepoBuilder::new()
            .clone(uri, path)
            .map_err(|e| VcsError::from(e).at(path, "git clone"))?;
        if let Some(version) = version {
            checkout_version(&repo, version).map_err(|e| VcsError::from(e).at(path, "git checkout"))?;
        }
        info!("clone completed");
        Ok(())
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    async fn update(&self, path: &Path, uri: &str, version: Option<&str>) -> Result<(), VcsError> {
        let repo = Repository::open(path).map_err(|e| VcsError::from(e).at(path, "git update"))?;

        match repo.find_remote(REMOTE) {
            Ok(remote) if remote.url() == Some(uri) => {}
            Ok(_) => repo.remote_set_url(REMOTE, uri)?,
            Err(_) => {
                repo.remote(REMOTE, uri)?;
            }
        }
        repo.find_remote(REMOTE)?
            .fetch(&[] as &[&str], None, None)
            .map_err(|e| VcsError::from(e).at(path, "git fetch"))?;
        debug!("fetch completed");

        // A pinned branch that already exists locally is moved to its fetched
        // upstream like any other branch; tags and commits stay detached.
        if let Some(version) = version {
            checkout_version(&repo, version).map_err(|e| VcsError::from(e).at(path, "git checkout"))?;
        }
        fast_forward(&repo, path)
    }
}
