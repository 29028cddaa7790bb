//! Rosinstall manifest model, loading, layering and saving.
//!
//! A manifest is an ordered YAML list of single-key maps, the key naming the
//! VCS kind:
//!
//! ```yaml
//! - other: {local-name: /opt/ros}
//! - git: {local-name: gitrepo, uri: /srv/gitrepo, version: main}
//! ```
//!
//! Manifests are read-only inputs to reconciliation. Several sources can be
//! layered with [`Manifest::merge`]; later entries replace earlier ones with
//! the same local name.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ManifestError;

/// File name of the manifest stored inside a workspace.
pub const WORKSPACE_MANIFEST: &str = ".rosinstall";

// ---------------------------------------------------------------------------
// VCS kind
// ---------------------------------------------------------------------------

/// Version-control system of a manifest entry or a detected working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    Git,
    Hg,
    Svn,
    Bzr,
    /// Unmanaged path (no VCS).
    Other,
}

impl VcsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Hg => "hg",
            Self::Svn => "svn",
            Self::Bzr => "bzr",
            Self::Other => "other",
        }
    }

    /// Marker directory that identifies a working copy of this kind.
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            Self::Git => Some(".git"),
            Self::Hg => Some(".hg"),
            Self::Svn => Some(".svn"),
            Self::Bzr => Some(".bzr"),
            Self::Other => None,
        }
    }

    /// All kinds that have a working-copy marker, in detection order.
    pub const VERSIONED: [VcsKind; 4] = [Self::Git, Self::Hg, Self::Svn, Self::Bzr];
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VcsKind {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(Self::Git),
            "hg" => Ok(Self::Hg),
            "svn" => Ok(Self::Svn),
            "bzr" => Ok(Self::Bzr),
            "other" => Ok(Self::Other),
            other => Err(ManifestError::UnknownVcs(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One desired checkout (or unmanaged path) in a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path relative to the workspace root, or absolute.
    pub local_name: String,
    pub vcs_kind: VcsKind,
    /// `None` only for [`VcsKind::Other`].
    pub uri: Option<String>,
    /// Branch, tag or revision to check out.
    pub version: Option<String>,
}

impl ManifestEntry {
    pub fn new(vcs_kind: VcsKind, local_name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            vcs_kind,
            uri: Some(uri.into()),
            version: None,
        }
    }

    pub fn other(local_name: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            vcs_kind: VcsKind::Other,
            uri: None,
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Absolute location of this entry inside `workspace`.
    pub fn path_in(&self, workspace: &Path) -> PathBuf {
        let local = Path::new(&self.local_name);
        if local.is_absolute() {
            local.to_path_buf()
        } else {
            workspace.join(local)
        }
    }

    fn key(&self) -> &str {
        self.local_name.trim_end_matches('/')
    }
}

// ---------------------------------------------------------------------------
// Serialized form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawElement {
    #[serde(rename = "local-name", default, skip_serializing_if = "Option::is_none")]
    local_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

type RawManifest = Vec<BTreeMap<String, RawElement>>;

fn entry_from_raw(kind_key: &str, raw: RawElement) -> Result<ManifestEntry, ManifestError> {
    let vcs_kind: VcsKind = kind_key.parse()?;
    let local_name = raw
        .local_name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ManifestError::MissingField {
            element: kind_key.to_string(),
            field: "local-name".into(),
        })?;

    let uri = match vcs_kind {
        VcsKind::Other => None,
        _ => Some(raw.uri.filter(|u| !u.trim().is_empty()).ok_or_else(|| {
            ManifestError::MissingField {
                element: local_name.clone(),
                field: "uri".into(),
            }
        })?),
    };

    Ok(ManifestEntry {
        local_name,
        vcs_kind,
        uri,
        version: raw.version,
    })
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Ordered set of manifest entries with unique local names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build a manifest, rejecting duplicate local names.
    pub fn new(entries: Vec<ManifestEntry>) -> Result<Self, ManifestError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.key().to_string()) {
                return Err(ManifestError::DuplicateLocalName(entry.local_name.clone()));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse manifest YAML. `source_name` is only used in error messages.
    pub fn parse(yaml: &str, source_name: &str) -> Result<Self, ManifestError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: Option<RawManifest> =
            serde_yaml::from_str(yaml).map_err(|e| ManifestError::Parse {
                source_name: source_name.to_string(),
                detail: e.to_string(),
            })?;

        let mut entries = Vec::new();
        for element in raw.unwrap_or_default() {
            if element.len() != 1 {
                return Err(ManifestError::Parse {
                    source_name: source_name.to_string(),
                    detail: format!(
                        "each element must have exactly one vcs key, found {}",
                        element.len()
                    ),
                });
            }
            for (kind_key, raw) in element {
                entries.push(entry_from_raw(&kind_key, raw)?);
            }
        }
        debug!(source = source_name, count = entries.len(), "parsed manifest");
        Self::new(entries)
    }

    /// Load a manifest file.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ManifestError::NotFound(path.display().to_string()));
        }
        info!(path = %path.display(), "loading manifest");
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents, &path.display().to_string())
    }

    /// Load a source given on the command line: a manifest file, or a
    /// workspace directory whose [`WORKSPACE_MANIFEST`] is read.
    pub fn load_source<P: AsRef<Path>>(source: P) -> Result<Self, ManifestError> {
        let source = source.as_ref();
        if source.is_dir() {
            Self::load_file(source.join(WORKSPACE_MANIFEST))
        } else {
            Self::load_file(source)
        }
    }

    /// Layer `other` on top of `self`: an entry with a known local name
    /// replaces the existing one in place, new names are appended.
    pub fn merge(&mut self, other: Manifest) {
        for entry in other.entries {
            match self.entries.iter_mut().find(|e| e.key() == entry.key()) {
                Some(existing) => {
                    if *existing != entry {
                        debug!(local_name = %entry.local_name, "manifest entry replaced");
                    }
                    *existing = entry;
                }
                None => self.entries.push(entry),
            }
        }
    }

    /// Serialize to rosinstall YAML.
    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        let raw: RawManifest = self
            .entries
            .iter()
            .map(|e| {
                let element = RawElement {
                    local_name: Some(e.local_name.clone()),
                    uri: e.uri.clone(),
                    version: e.version.clone(),
                };
                BTreeMap::from([(e.vcs_kind.as_str().to_string(), element)])
            })
            .collect();
        serde_yaml::to_string(&raw).map_err(|e| ManifestError::Parse {
            source_name: "<serialize>".into(),
            detail: e.to_string(),
        })
    }

    /// Write this manifest to `<workspace>/.rosinstall`, creating the
    /// workspace directory if needed.
    pub fn save_to_workspace(&self, workspace: &Path) -> Result<PathBuf, ManifestError> {
        std::fs::create_dir_all(workspace)?;
        let path = workspace.join(WORKSPACE_MANIFEST);
        let body = format!(
            "# workspace manifest written by wsync; edits are kept on the next run\n{}",
            self.to_yaml()?
        );
        std::fs::write(&path, body)?;
        info!(path = %path.display(), entries = self.len(), "saved workspace manifest");
        Ok(path)
    }
}
