//! End-to-end tests for the reconciliation engine.
//!
//! Most tests run against an in-memory fake VCS client that lays down marker
//! directories, so they need no external tools. The git tests at the bottom
//! use real repositories created with `git2`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use wsync_core::errors::VcsError;
use wsync_core::vcs::{VcsClient, VcsRegistry};
use wsync_core::{
    Action, ConflictMode, ConflictPrompt, EntryStatus, LocalState, Manifest, ManifestEntry,
    Mismatch, Policy, Reconciler, Resolution, ToolConfig, VcsKind,
};

// ===========================================================================
// Fake client
// ===========================================================================

const URI_FILE: &str = "fake-uri";
const QUERY_FAILS: &str = "query-fails";

/// Stores the checked-out URI in a file inside the kind's marker directory.
/// Any URI containing "invalid" fails to check out after leaving a partial
/// directory behind. A working copy containing `QUERY_FAILS` cannot report
/// its URI.
struct FakeClient {
    kind: VcsKind,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeClient {
    fn marker_dir(&self, path: &Path) -> PathBuf {
        path.join(self.kind.marker().unwrap())
    }
}

#[async_trait]
impl VcsClient for FakeClient {
    fn kind(&self) -> VcsKind {
        self.kind
    }

    async fn current_uri(&self, path: &Path) -> Result<Option<String>, VcsError> {
        if path.join(QUERY_FAILS).exists() {
            return Err(VcsError::Timeout {
                tool: self.kind.to_string(),
                secs: 30,
            });
        }
        Ok(std::fs::read_to_string(self.marker_dir(path).join(URI_FILE)).ok())
    }

    async fn is_modified(&self, path: &Path) -> Result<bool, VcsError> {
        Ok(path.join("dirty.txt").exists())
    }

    async fn checkout(&self, path: &Path, uri: &str, _version: Option<&str>) -> Result<(), VcsError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("checkout {} {uri}", path.file_name().unwrap().to_string_lossy()));
        std::fs::create_dir_all(self.marker_dir(path))?;
        if uri.contains("invalid") {
            return Err(VcsError::CommandFailed {
                tool: self.kind.to_string(),
                exit_code: 128,
                stderr: format!("repository '{uri}' does not exist"),
            });
        }
        std::fs::write(self.marker_dir(path).join(URI_FILE), uri)?;
        Ok(())
    }

    async fn update(&self, path: &Path, uri: &str, _version: Option<&str>) -> Result<(), VcsError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("update {} {uri}", path.file_name().unwrap().to_string_lossy()));
        Ok(())
    }
}

struct Fixture {
    dir: TempDir,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn workspace(&self) -> PathBuf {
        self.dir.path().join("ws")
    }

    fn backups(&self) -> PathBuf {
        self.dir.path().join("backups")
    }

    fn reconciler(&self) -> Reconciler {
        let mut registry = VcsRegistry::new();
        for kind in [VcsKind::Git, VcsKind::Hg] {
            registry.register(Arc::new(FakeClient {
                kind,
                calls: self.calls.clone(),
            }));
        }
        Reconciler::new(self.workspace(), registry)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn recorded_uri(&self, name: &str, kind: VcsKind) -> String {
        std::fs::read_to_string(
            self.workspace()
                .join(name)
                .join(kind.marker().unwrap())
                .join(URI_FILE),
        )
        .unwrap()
    }
}

fn manifest(entries: Vec<ManifestEntry>) -> Manifest {
    Manifest::new(entries).unwrap()
}

fn git(name: &str, uri: &str) -> ManifestEntry {
    ManifestEntry::new(VcsKind::Git, name, uri)
}

fn hg(name: &str, uri: &str) -> ManifestEntry {
    ManifestEntry::new(VcsKind::Hg, name, uri)
}

/// Bring `gitrepo` and `hgrepo` into the workspace from their first URIs.
async fn initial_workspace(fx: &Fixture, r: &Reconciler) {
    let m = manifest(vec![git("gitrepo", "/srv/gitrepo"), hg("hgrepo", "/srv/hgrepo")]);
    let report = r.reconcile(&m, &Policy::default()).await;
    assert!(report.success(), "initial checkout failed: {report:?}");
    fx.clear_calls();
}

// ===========================================================================
// Basic flow
// ===========================================================================

#[tokio::test]
async fn test_missing_entries_are_checked_out_in_order() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    let m = manifest(vec![
        git("gitrepo", "/srv/gitrepo"),
        hg("hgrepo", "/srv/hgrepo"),
        git("nested/lib", "/srv/lib"),
    ]);

    let report = r.reconcile(&m, &Policy::default()).await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        fx.calls(),
        vec![
            "checkout gitrepo /srv/gitrepo",
            "checkout hgrepo /srv/hgrepo",
            "checkout lib /srv/lib",
        ]
    );
    let names: Vec<_> = report.outcomes.iter().map(|o| o.local_name.as_str()).collect();
    assert_eq!(names, ["gitrepo", "hgrepo", "nested/lib"]);
    assert!(fx.workspace().join("nested/lib/.git").is_dir());
}

#[tokio::test]
async fn test_clean_entries_are_updated_and_rerun_is_idempotent() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;

    let m = manifest(vec![git("gitrepo", "/srv/gitrepo/"), hg("hgrepo", "/srv/hgrepo")]);
    for _ in 0..2 {
        let report = r.reconcile(&m, &Policy::default()).await;
        assert!(report.success());
        assert!(report.outcomes.iter().all(|o| matches!(
            o.status,
            EntryStatus::Succeeded { action: Action::Update, .. }
        )));
    }
    assert_eq!(fx.calls().len(), 4);
    assert!(fx.calls().iter().all(|c| c.starts_with("update")));
}

#[tokio::test]
async fn test_other_entries_are_left_alone() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    let docs = fx.workspace().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("README"), "hand made").unwrap();

    let m = manifest(vec![ManifestEntry::other("docs"), ManifestEntry::other("absent")]);
    let report = r.reconcile(&m, &Policy::default()).await;

    assert!(report.success());
    assert!(fx.calls().is_empty());
    assert_eq!(std::fs::read_to_string(docs.join("README")).unwrap(), "hand made");
    assert!(!fx.workspace().join("absent").exists());
}

// ===========================================================================
// Conflict policy
// ===========================================================================

#[tokio::test]
async fn test_uri_change_fails_without_policy() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;

    let m = manifest(vec![git("gitrepo", "/srv/gitrepo2")]);
    let report = r.reconcile(&m, &Policy::default()).await;

    assert_eq!(report.exit_code(), 1);
    assert!(matches!(report.get("gitrepo").unwrap().status, EntryStatus::Failed(_)));
    assert!(fx.calls().is_empty());
    assert_eq!(fx.recorded_uri("gitrepo", VcsKind::Git), "/srv/gitrepo");
}

#[tokio::test]
async fn test_delete_changed_uri() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;
    std::fs::write(fx.workspace().join("gitrepo/dirty.txt"), "wip").unwrap();

    let m = manifest(vec![git("gitrepo", "/srv/gitrepo2"), hg("hgrepo", "/srv/hgrepo2")]);
    let report = r
        .reconcile(&m, &Policy::new(ConflictMode::DeleteChanged))
        .await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(fx.recorded_uri("gitrepo", VcsKind::Git), "/srv/gitrepo2");
    assert_eq!(fx.recorded_uri("hgrepo", VcsKind::Hg), "/srv/hgrepo2");
    assert!(!fx.workspace().join("gitrepo/dirty.txt").exists());
}

#[tokio::test]
async fn test_abort_changed_uri_leaves_workspace_untouched() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;

    let m = manifest(vec![git("gitrepo", "/srv/gitrepo2"), hg("hgrepo", "/srv/hgrepo2")]);
    let report = r
        .reconcile(&m, &Policy::new(ConflictMode::AbortChanged))
        .await;

    assert_eq!(report.exit_code(), 1);
    assert!(matches!(report.get("gitrepo").unwrap().status, EntryStatus::Aborted(_)));
    assert!(report.halted);
    assert!(report.get("hgrepo").is_none());
    assert_eq!(fx.recorded_uri("gitrepo", VcsKind::Git), "/srv/gitrepo");
    assert_eq!(fx.recorded_uri("hgrepo", VcsKind::Hg), "/srv/hgrepo");
    assert!(fx.calls().is_empty());
}

#[tokio::test]
async fn test_backup_changed_uri() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;
    std::fs::write(fx.workspace().join("gitrepo/dirty.txt"), "wip").unwrap();

    let m = manifest(vec![git("gitrepo", "/srv/gitrepo2"), hg("hgrepo", "/srv/hgrepo")]);
    let report = r
        .reconcile(&m, &Policy::new(ConflictMode::BackupChanged(fx.backups())))
        .await;

    assert_eq!(report.exit_code(), 0);
    let backups: Vec<_> = std::fs::read_dir(fx.backups())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(std::fs::read_to_string(backups[0].join("dirty.txt")).unwrap(), "wip");

    match &report.get("gitrepo").unwrap().status {
        EntryStatus::Succeeded { backup: Some(path), .. } => assert_eq!(path, &backups[0]),
        other => panic!("unexpected status {other:?}"),
    }
    assert_eq!(fx.recorded_uri("gitrepo", VcsKind::Git), "/srv/gitrepo2");
}

#[tokio::test]
async fn test_vcs_kind_change_goes_through_policy() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;

    let m = manifest(vec![hg("gitrepo", "/srv/gitrepo")]);
    let report = r.reconcile(&m, &Policy::default()).await;
    assert_eq!(report.exit_code(), 1);
    assert!(fx.workspace().join("gitrepo/.git").is_dir());

    let report = r
        .reconcile(&m, &Policy::new(ConflictMode::DeleteChanged))
        .await;
    assert_eq!(report.exit_code(), 0);
    assert!(!fx.workspace().join("gitrepo/.git").exists());
    assert!(fx.workspace().join("gitrepo/.hg").is_dir());
}

#[tokio::test]
async fn test_plain_directory_is_a_conflict() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    std::fs::create_dir_all(fx.workspace().join("gitrepo")).unwrap();

    let m = manifest(vec![git("gitrepo", "/srv/gitrepo")]);
    let report = r.reconcile(&m, &Policy::default()).await;
    assert_eq!(report.exit_code(), 1);
    assert!(fx.calls().is_empty());
}

// ===========================================================================
// Errors
// ===========================================================================

#[tokio::test]
async fn test_failed_checkout_halts_and_cleans_up() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    let m = manifest(vec![git("broken", "/srv/invalid"), git("gitrepo", "/srv/gitrepo")]);

    let report = r.reconcile(&m, &Policy::default()).await;

    assert_eq!(report.exit_code(), 1);
    assert!(report.halted);
    assert!(matches!(report.get("broken").unwrap().status, EntryStatus::Failed(_)));
    assert!(!fx.workspace().join("broken").exists());
    assert!(!fx.workspace().join("gitrepo").exists());
}

#[tokio::test]
async fn test_continue_on_error_skips_failed_checkout() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    let m = manifest(vec![git("broken", "/srv/invalid"), git("gitrepo", "/srv/gitrepo")]);

    let report = r
        .reconcile(&m, &Policy::default().continue_on_error(true))
        .await;

    assert_eq!(report.exit_code(), 0);
    assert!(matches!(report.get("broken").unwrap().status, EntryStatus::Skipped(_)));
    assert!(fx.workspace().join("gitrepo/.git").is_dir());
}

#[tokio::test]
async fn test_continue_on_error_still_reports_conflicts() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;

    let m = manifest(vec![git("gitrepo", "/srv/gitrepo2"), git("newrepo", "/srv/newrepo")]);
    let report = r
        .reconcile(&m, &Policy::default().continue_on_error(true))
        .await;

    assert_eq!(report.exit_code(), 1);
    assert!(!report.halted);
    assert_eq!(report.outcomes.len(), 2);
    assert!(fx.workspace().join("newrepo/.git").is_dir());
}

#[tokio::test]
async fn test_delete_then_failed_checkout_is_not_masked() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;

    let m = manifest(vec![git("gitrepo", "/srv/invalid2"), hg("hgrepo", "/srv/hgrepo")]);
    let report = r
        .reconcile(&m, &Policy::new(ConflictMode::DeleteChanged))
        .await;
    assert_eq!(report.exit_code(), 1);
    assert!(report.halted);
    assert!(matches!(report.get("gitrepo").unwrap().status, EntryStatus::Failed(_)));
    assert!(!fx.workspace().join("gitrepo").exists());

    let fx = Fixture::new();
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;
    let report = r
        .reconcile(
            &m,
            &Policy::new(ConflictMode::DeleteChanged).continue_on_error(true),
        )
        .await;
    assert_eq!(report.exit_code(), 1);
    assert!(!report.halted);
    assert!(!fx.workspace().join("gitrepo").exists());
    assert_eq!(report.outcomes.len(), 2);
    assert!(matches!(report.get("gitrepo").unwrap().status, EntryStatus::Failed(_)));
    assert!(matches!(
        report.get("hgrepo").unwrap().status,
        EntryStatus::Succeeded { action: Action::Update, .. }
    ));
}

#[tokio::test]
async fn test_backup_then_failed_checkout_keeps_backup() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;
    std::fs::write(fx.workspace().join("gitrepo/dirty.txt"), "wip").unwrap();

    let m = manifest(vec![git("gitrepo", "/srv/invalid2")]);
    let policy = Policy::new(ConflictMode::BackupChanged(fx.backups())).continue_on_error(true);
    let report = r.reconcile(&m, &policy).await;

    assert_eq!(report.exit_code(), 1);
    assert!(matches!(report.get("gitrepo").unwrap().status, EntryStatus::Failed(_)));
    assert!(!fx.workspace().join("gitrepo").exists());
    let backups: Vec<_> = std::fs::read_dir(fx.backups())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(std::fs::read_to_string(backups[0].join("dirty.txt")).unwrap(), "wip");
}

#[tokio::test]
async fn test_failed_uri_query_never_deletes_working_copy() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;
    std::fs::write(fx.workspace().join("gitrepo").join(QUERY_FAILS), "").unwrap();

    let m = manifest(vec![git("gitrepo", "/srv/gitrepo")]);
    let report = r
        .reconcile(&m, &Policy::new(ConflictMode::DeleteChanged))
        .await;
    assert_eq!(report.exit_code(), 1);
    assert!(matches!(report.get("gitrepo").unwrap().status, EntryStatus::Failed(_)));

    let report = r
        .reconcile(
            &m,
            &Policy::new(ConflictMode::DeleteChanged).continue_on_error(true),
        )
        .await;
    assert_eq!(report.exit_code(), 0);
    assert!(matches!(report.get("gitrepo").unwrap().status, EntryStatus::Skipped(_)));

    assert!(fx.calls().is_empty());
    assert_eq!(fx.recorded_uri("gitrepo", VcsKind::Git), "/srv/gitrepo");
}

#[tokio::test]
async fn test_failed_query_on_other_kind_still_allows_kind_change() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;
    std::fs::write(fx.workspace().join("gitrepo").join(QUERY_FAILS), "").unwrap();

    let m = manifest(vec![hg("gitrepo", "/srv/gitrepo")]);
    let report = r
        .reconcile(&m, &Policy::new(ConflictMode::DeleteChanged))
        .await;
    assert_eq!(report.exit_code(), 0);
    assert!(fx.workspace().join("gitrepo/.hg").is_dir());
    assert!(!fx.workspace().join("gitrepo/.git").exists());
}

#[tokio::test]
async fn test_unsupported_kind_fails_entry() {
    let fx = Fixture::new();
    let r = fx.reconciler();
    let m = manifest(vec![ManifestEntry::new(VcsKind::Svn, "svnrepo", "file:///srv/svn")]);

    let report = r.reconcile(&m, &Policy::default()).await;
    assert_eq!(report.exit_code(), 1);
}

// ===========================================================================
// Interactive prompt
// ===========================================================================

struct RecordingPrompt {
    answer: Resolution,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ConflictPrompt for RecordingPrompt {
    fn choose(&self, entry: &ManifestEntry, mismatch: &Mismatch, _: &LocalState) -> Option<Resolution> {
        self.asked
            .lock()
            .unwrap()
            .push(format!("{}: {mismatch}", entry.local_name));
        Some(self.answer.clone())
    }
}

#[tokio::test]
async fn test_prompt_resolves_conflict() {
    let fx = Fixture::new();
    let asked = Arc::new(Mutex::new(Vec::new()));
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;

    let r = r.with_prompt(Box::new(RecordingPrompt {
        answer: Resolution::Backup(fx.backups()),
        asked: asked.clone(),
    }));
    let m = manifest(vec![git("gitrepo", "/srv/gitrepo2")]);
    let report = r
        .reconcile(&m, &Policy::default().interactive(true))
        .await;

    assert!(report.success());
    assert_eq!(
        asked.lock().unwrap().as_slice(),
        ["gitrepo: uri changed from /srv/gitrepo to /srv/gitrepo2"]
    );
    assert_eq!(std::fs::read_dir(fx.backups()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_prompt_skip_leaves_entry() {
    let fx = Fixture::new();
    let asked = Arc::new(Mutex::new(Vec::new()));
    let r = fx.reconciler();
    initial_workspace(&fx, &r).await;

    let r = r.with_prompt(Box::new(RecordingPrompt {
        answer: Resolution::Skip,
        asked,
    }));
    let m = manifest(vec![git("gitrepo", "/srv/gitrepo2")]);
    let report = r
        .reconcile(&m, &Policy::default().interactive(true))
        .await;

    assert!(report.success());
    assert!(matches!(report.get("gitrepo").unwrap().status, EntryStatus::Skipped(_)));
    assert_eq!(fx.recorded_uri("gitrepo", VcsKind::Git), "/srv/gitrepo");
}

// ===========================================================================
// Real git
// ===========================================================================

/// Create a repository with a single commit; returns its path as a URI.
fn create_git_repo(path: &Path, file: &str) -> String {
    let repo = git2::Repository::init(path).unwrap();
    std::fs::write(path.join(file), "content\n").unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(file)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = git2::Signature::now("Test", "test@example.com").unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn test_git_checkout_then_delete_changed_uri() {
    let dir = tempfile::tempdir().unwrap();
    let first = create_git_repo(&dir.path().join("gitrepo"), "a.txt");
    let second = create_git_repo(&dir.path().join("gitrepo2"), "b.txt");
    let ws = dir.path().join("ws");
    let r = Reconciler::from_config(&ws, &ToolConfig::default());

    let report = r
        .reconcile(&manifest(vec![git("gitrepo", &first)]), &Policy::default())
        .await;
    assert!(report.success(), "{report:?}");
    assert!(ws.join("gitrepo/a.txt").exists());

    let m = manifest(vec![git("gitrepo", &second)]);
    let report = r.reconcile(&m, &Policy::default()).await;
    assert_eq!(report.exit_code(), 1);

    let report = r
        .reconcile(&m, &Policy::new(ConflictMode::DeleteChanged))
        .await;
    assert!(report.success(), "{report:?}");
    assert!(ws.join("gitrepo/b.txt").exists());
    assert!(!ws.join("gitrepo/a.txt").exists());
}

#[tokio::test]
async fn test_git_invalid_uri_leaves_no_directory() {
    let dir = tempfile::tempdir().unwrap();
    let ws = dir.path().join("ws");
    let r = Reconciler::from_config(&ws, &ToolConfig::default());
    let missing = dir.path().join("does-not-exist").display().to_string();

    let report = r
        .reconcile(&manifest(vec![git("gitrepo", &missing)]), &Policy::default())
        .await;
    assert_eq!(report.exit_code(), 1);
    assert!(!ws.join("gitrepo").exists());
}
