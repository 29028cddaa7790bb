//! Interactive conflict resolution on the terminal.

use std::path::PathBuf;

use dialoguer::{Input, Select};
use tracing::warn;

use wsync_core::{ConflictPrompt, LocalState, ManifestEntry, Mismatch, Resolution};

use crate::style;

/// Asks on the terminal how to resolve each conflict.
pub struct TerminalPrompt {
    default_backup_dir: PathBuf,
}

impl TerminalPrompt {
    pub fn new(default_backup_dir: PathBuf) -> Self {
        Self { default_backup_dir }
    }

    fn ask(
        &self,
        entry: &ManifestEntry,
        mismatch: &Mismatch,
        state: &LocalState,
    ) -> dialoguer::Result<Resolution> {
        eprintln!();
        eprintln!(
            "{}",
            style::warn(&format!(
                "{}: {}",
                style::value(&entry.local_name),
                mismatch
            ))
        );
        if state.has_local_modifications {
            eprintln!("  {}", style::dim("the working copy has local modifications"));
        }

        let options = &[
            "delete   - remove the checkout and check out afresh",
            "backup   - move the checkout aside, then check out afresh",
            "skip     - leave this entry as it is",
            "abort    - stop here",
        ];
        let choice = Select::new()
            .with_prompt("How should this be resolved?")
            .items(options)
            .default(1)
            .interact()?;

        Ok(match choice {
            0 => Resolution::Delete,
            1 => {
                let dir: String = Input::new()
                    .with_prompt("Backup directory")
                    .default(self.default_backup_dir.display().to_string())
                    .interact_text()?;
                Resolution::Backup(PathBuf::from(dir))
            }
            2 => Resolution::Skip,
            _ => Resolution::Abort,
        })
    }
}

impl ConflictPrompt for TerminalPrompt {
    fn choose(
        &self,
        entry: &ManifestEntry,
        mismatch: &Mismatch,
        state: &LocalState,
    ) -> Option<Resolution> {
        match self.ask(entry, mismatch, state) {
            Ok(resolution) => Some(resolution),
            Err(e) => {
                warn!(local_name = %entry.local_name, error = %e, "prompt failed");
                None
            }
        }
    }
}
