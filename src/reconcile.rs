//! Staged-file reconciliation
//!
//! A branch row stores what the engine believes is staged; the git index says
//! what actually is. Every read of the checked-out branch compares the two and
//! rewrites the snapshot when they disagree, keeping `source` and `timestamp`
//! for paths it already knew about.

use crate::db::{Branch, BranchChanges, StagedFileEntry};
use crate::engine::{Engine, Project};
use crate::error::{advisory, Result};
use crate::git::{Git, NameStatus};
use std::collections::HashSet;

/// What the index reported for one probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    pub staged_paths: Vec<String>,
    pub name_status: Vec<NameStatus>,
}

impl IndexSnapshot {
    pub fn read(git: &Git<'_>) -> Result<Self> {
        Ok(Self {
            staged_paths: git.staged_paths()?,
            name_status: git.staged_name_status()?,
        })
    }

    /// Staged paths in index order. Both sides of a rename or copy are
    /// listed, the source immediately before its destination.
    pub fn paths(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        let mut push = |path: &str, paths: &mut Vec<String>| {
            if seen.insert(path.to_string()) {
                paths.push(path.to_string());
            }
        };

        for path in &self.staged_paths {
            let source = self
                .name_status
                .iter()
                .find(|r| &r.path == path)
                .and_then(|r| r.old_path.as_deref());
            if let Some(old) = source {
                push(old, &mut paths);
            }
            push(path, &mut paths);
        }
        for record in &self.name_status {
            if let Some(old) = &record.old_path {
                push(old, &mut paths);
            }
            push(&record.path, &mut paths);
        }
        paths
    }
}

/// Outcome of comparing a stored snapshot with the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Same path set; nothing to write
    Unchanged,
    /// Index is empty, snapshot was not
    Cleared,
    /// Snapshot replaced by these entries, in index order
    Rebuilt(Vec<StagedFileEntry>),
}

pub fn reconcile(stored: &[StagedFileEntry], index_paths: &[String]) -> Reconciliation {
    let stored_set: HashSet<&str> = stored.iter().map(|e| e.path.as_str()).collect();
    let index_set: HashSet<&str> = index_paths.iter().map(String::as_str).collect();

    if stored_set == index_set {
        return Reconciliation::Unchanged;
    }
    if index_set.is_empty() {
        return Reconciliation::Cleared;
    }

    let entries = index_paths
        .iter()
        .map(|path| {
            stored
                .iter()
                .rev()
                .find(|e| &e.path == path)
                .cloned()
                .unwrap_or_else(|| StagedFileEntry::discovered(path.clone()))
        })
        .collect();
    Reconciliation::Rebuilt(entries)
}

impl Engine {
    /// Display-ready staged files for `branch`, correcting the stored
    /// snapshot when the index disagrees.
    ///
    /// Only the checked-out branch is probed. A failed probe is logged and
    /// reads as nothing staged, leaving the stored snapshot untouched.
    pub fn sync_staged_files(&self, project: &Project, branch: &Branch) -> Result<Vec<StagedFileEntry>> {
        let git = self.git(project);
        let checked_out = advisory("current branch probe", git.current_branch()).flatten();
        if !branch.is_current || checked_out.as_deref() != Some(branch.name.as_str()) {
            return Ok(branch.staged_entries());
        }

        let Some(index) = advisory("index probe", IndexSnapshot::read(&git)) else {
            return Ok(Vec::new());
        };

        let stored = branch.staged_entries();
        match reconcile(&stored, &index.paths()) {
            Reconciliation::Unchanged => Ok(stored),
            Reconciliation::Cleared => {
                self.db.update_branch(branch.id, BranchChanges::new().staged(&[]))?;
                tracing::info!(branch = %branch.name, "index empty, cleared staged snapshot");
                Ok(Vec::new())
            }
            Reconciliation::Rebuilt(entries) => {
                self.db.update_branch(branch.id, BranchChanges::new().staged(&entries))?;
                tracing::info!(branch = %branch.name, count = entries.len(), "rebuilt staged snapshot from index");
                Ok(entries)
            }
        }
    }
}
