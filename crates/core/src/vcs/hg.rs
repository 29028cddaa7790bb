//! Mercurial working copies via the `hg` CLI.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{VcsClient, VcsCommand};
use crate::errors::VcsError;
use crate::manifest::VcsKind;

#[derive(Debug, Clone)]
pub struct HgClient {
    binary: String,
    timeout: Duration,
}

impl HgClient {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// `HGPLAIN` disables localisation and user aliases so output is stable.
    fn hg(&self) -> VcsCommand {
        VcsCommand::new(&self.binary, self.timeout)
            .env("HGPLAIN", "1")
            .arg("--noninteractive")
    }
}

#[async_trait]
impl VcsClient for HgClient {
    fn kind(&self) -> VcsKind {
        VcsKind::Hg
    }

    async fn current_uri(&self, path: &Path) -> Result<Option<String>, VcsError> {
        match self.hg().args(["paths", "default"]).current_dir(path).output().await {
            Ok(out) => {
                let uri = out.trim();
                Ok((!uri.is_empty()).then(|| uri.to_string()))
            }
            // `hg paths default` exits 1 when no default path is configured.
            Err(VcsError::CommandFailed { exit_code: 1, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn is_modified(&self, path: &Path) -> Result<bool, VcsError> {
        let out = self.hg().arg("status").current_dir(path).output().await?;
        Ok(!out.trim().is_empty())
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    async fn checkout(
        &self,
        path: &Path,
        uri: &str,
        version: Option<&str>,
    ) -> Result<(), VcsError> {
        let mut cmd = self.hg().arg("clone");
        if let Some(version) = version {
            cmd = cmd.args(["-u", version]);
        }
        cmd.arg(uri)
            .arg(path.as_os_str())
            .output()
            .await
            .map_err(|e| e.at(path, "hg clone"))?;
        info!("hg clone completed");
        Ok(())
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    async fn update(&self, path: &Path, uri: &str, version: Option<&str>) -> Result<(), VcsError> {
        self.hg()
            .args(["pull", uri])
            .current_dir(path)
            .output()
            .await
            .map_err(|e| e.at(path, "hg pull"))?;

        let mut cmd = self.hg().arg("update");
        if let Some(version) = version {
            cmd = cmd.arg(version);
        }
        cmd.current_dir(path)
            .output()
            .await
            .map_err(|e| e.at(path, "hg update"))?;
        info!("hg update completed");
        Ok(())
    }
}
