//! Subversion working copies via the `svn` CLI.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::{VcsClient, VcsCommand};
use crate::config::SvnConfig;
use crate::errors::VcsError;
use crate::manifest::VcsKind;

/// SVN adapter with optional credentials.
#[derive(Debug, Clone)]
pub struct SvnClient {
    binary: String,
    timeout: Duration,
    username: Option<String>,
    password: Option<String>,
}

impl SvnClient {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            username: None,
            password: None,
        }
    }

    pub fn from_config(binary: &str, timeout: Duration, config: &SvnConfig) -> Self {
        let mut client = Self::new(binary, timeout);
        client.username = config.username.clone();
        client.password = config.password.clone();
        client
    }

    fn svn(&self) -> VcsCommand {
        let mut cmd = VcsCommand::new(&self.binary, self.timeout)
            .env("LC_ALL", "C")
            .arg("--non-interactive");
        if let Some(ref username) = self.username {
            cmd = cmd.args(["--no-auth-cache", "--username", username.as_str()]);
            if let Some(ref password) = self.password {
                cmd = cmd.args(["--password", password.as_str()]);
            }
        }
        cmd
    }
}

/// Extract the text content of the first `<tag>` in `xml`.
fn extract_tag_content(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim().to_string())
}

/// Working-copy URL from `svn info --xml` output.
pub fn parse_info_url(xml: &str) -> Option<String> {
    extract_tag_content(xml, "url").map(|u| u.replace("&amp;", "&"))
}

#[async_trait]
impl VcsClient for SvnClient {
    fn kind(&self) -> VcsKind {
        VcsKind::Svn
    }

    async fn current_uri(&self, path: &Path) -> Result<Option<String>, VcsError> {
        let xml = self
            .svn()
            .args(["info", "--xml"])
            .arg(path.as_os_str())
            .output()
            .await?;
        let url = parse_info_url(&xml);
        debug!(?url, "parsed svn info");
        Ok(url)
    }

    async fn is_modified(&self, path: &Path) -> Result<bool, VcsError> {
        let out = self.svn().arg("status").arg(path.as_os_str()).output().await?;
        Ok(!out.trim().is_empty())
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    async fn checkout(
        &self,
        path: &Path,
        uri: &str,
        version: Option<&str>,
    ) -> Result<(), VcsError> {
        let mut cmd = self.svn().arg("checkout");
        if let Some(version) = version {
            cmd = cmd.args(["-r", version]);
        }
        cmd.arg(uri)
            .arg(path.as_os_str())
            .output()
            .await
            .map_err(|e| e.at(path, "svn checkout"))?;
        info!("svn checkout completed");
        Ok(())
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    async fn update(&self, path: &Path, _uri: &str, version: Option<&str>) -> Result<(), VcsError> {
        let mut cmd = self.svn().arg("update");
        if let Some(version) = version {
            cmd = cmd.args(["-r", version]);
        }
        cmd.arg(path.as_os_str())
            .output()
            .await
            .map_err(|e| e.at(path, "svn update"))?;
        info!("svn update completed");
        Ok(())
    }
}
