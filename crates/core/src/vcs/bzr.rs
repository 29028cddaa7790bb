//! Bazaar branches via the `bzr` CLI.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;
use tracing::{info, instrument};

use super::{VcsClient, VcsCommand};
use crate::errors::VcsError;
use crate::manifest::VcsKind;

#[derive(Debug, Clone)]
pub struct BzrClient {
    binary: String,
    timeout: Duration,
}

impl BzrClient {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn bzr(&self) -> VcsCommand {
        VcsCommand::new(&self.binary, self.timeout).env("LC_ALL", "C")
    }
}

fn info_location() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(checkout of branch|parent branch):\s*(\S.*?)\s*$")
            .expect("static regex")
    })
}

/// Upstream location from `bzr info` output. A bound checkout's branch wins
/// over the parent of a standalone branch.
pub fn parse_info_location(info: &str) -> Option<String> {
    let mut parent = None;
    for caps in info_location().captures_iter(info) {
        let value = caps[2].to_string();
        if &caps[1] == "checkout of branch" {
            return Some(value);
        }
        parent.get_or_insert(value);
    }
    parent
}

#[async_trait]
impl VcsClient for BzrClient {
    fn kind(&self) -> VcsKind {
        VcsKind::Bzr
    }

    async fn current_uri(&self, path: &Path) -> Result<Option<String>, VcsError> {
        let out = self.bzr().arg("info").arg(path.as_os_str()).output().await?;
        Ok(parse_info_location(&out))
    }

    async fn is_modified(&self, path: &Path) -> Result<bool, VcsError> {
        let out = self.bzr().arg("status").arg(path.as_os_str()).output().await?;
        Ok(!out.trim().is_empty())
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    async fn checkout(
        &self,
        path: &Path,
        uri: &str,
        version: Option<&str>,
    ) -> Result<(), VcsError> {
        let mut cmd = self.bzr().arg("branch");
        if let Some(version) = version {
            cmd = cmd.args(["-r", version]);
        }
        cmd.arg(uri)
            .arg(path.as_os_str())
            .output()
            .await
            .map_err(|e| e.at(path, "bzr branch"))?;
        info!("bzr branch completed");
        Ok(())
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    async fn update(&self, path: &Path, uri: &str, version: Option<&str>) -> Result<(), VcsError> {
        let mut cmd = self.bzr().arg("pull").arg("-d").arg(path.as_os_str());
        if let Some(version) = version {
            cmd = cmd.args(["-r", version]);
        }
        cmd.arg(uri)
            .output()
            .await
            .map_err(|e| e.at(path, "bzr pull"))?;
        info!("bzr pull completed");
        Ok(())
    }
}
