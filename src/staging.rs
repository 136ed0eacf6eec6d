//! Stage, clear and commit workspace changes
//!
//! The snapshot is written first and git second when staging (the snapshot
//! records intent); clearing is the reverse: git first, verified, and only
//! then the snapshot.

use crate::branches::auto_branch_name;
use crate::db::{Branch, BranchChanges, BranchStatus, BranchType, StagedFileEntry, StagedSource};
use crate::engine::{Engine, Project};
use crate::error::{advisory, EngineError, Result};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub branch: Branch,
    pub path: String,
    /// Whether git reports the path staged after `git add`
    pub staged: bool,
    pub error: Option<String>,
    pub test_scheduled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearOutcome {
    pub branch: Branch,
    pub cleared: Vec<String>,
    /// Newly added files removed from disk
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitOutcome {
    pub branch: Branch,
    pub sha: String,
}

/// Repository-relative, `/`-separated form of `file_path`.
///
/// Absolute paths must lie under `root`; `..` may not climb above it.
pub fn normalize_repo_path(root: &Path, file_path: &str) -> Result<String> {
    let trimmed = file_path.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation("file path is required".to_string()));
    }
    if trimmed.contains('\0') {
        return Err(EngineError::Validation("file path contains a NUL byte".to_string()));
    }

    let unified = trimmed.replace('\\', "/");
    let candidate = Path::new(&unified);
    let relative = if candidate.is_absolute() {
        candidate.strip_prefix(root).map_err(|_| {
            EngineError::Validation(format!("'{}' is outside the project root", file_path))
        })?
    } else {
        candidate
    };

    let mut parts: Vec<String> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(EngineError::Validation(format!(
                        "'{}' escapes the project root",
                        file_path
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(EngineError::Validation(format!("'{}' is not a relative path", file_path)));
            }
        }
    }

    if parts.is_empty() {
        return Err(EngineError::Validation(format!("'{}' does not name a file", file_path)));
    }
    if parts[0] == ".git" {
        return Err(EngineError::Validation("paths inside .git cannot be staged".to_string()));
    }
    Ok(parts.join("/"))
}

/// On-disk location of `relative` if its parent directory resolves inside
/// `root` (symlinked directories pointing elsewhere are rejected)
fn contained_path(root: &Path, relative: &str) -> Option<PathBuf> {
    let root = root.canonicalize().ok()?;
    let candidate = root.join(relative);
    let parent = candidate.parent()?.canonicalize().ok()?;
    let file_name = candidate.file_name()?;
    if parent.starts_with(&root) {
        Some(parent.join(file_name))
    } else {
        None
    }
}

impl Engine {
    /// The branch new work lands on: the current unmerged working branch,
    /// else the most recently touched one, else a freshly named branch.
    fn resolve_working_branch(&self, project: &Project) -> Result<Branch> {
        self.init_project(project)?;

        if let Some(current) = self.db.current_branch(&project.id)? {
            if !current.is_trunk() && current.status() != BranchStatus::Merged {
                return Ok(current);
            }
        }

        let recent = self
            .db
            .list_active_branches(&project.id)?
            .into_iter()
            .filter(|b| !b.is_trunk())
            .max_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));

        let branch = match recent {
            Some(branch) => branch,
            None => {
                let name = auto_branch_name(&self.config.branch.auto_prefix);
                let branch = self.db.insert_branch(&project.id, &name, BranchType::Feature)?;
                tracing::info!(project = %project.id, branch = %name, "auto-created working branch");
                branch
            }
        };
        Ok(self.db.set_current_branch(&project.id, branch.id)?)
    }

    /// Put git on `name`, creating it from HEAD if needed. Local changes
    /// travel with the checkout; failures are logged and ignored.
    fn checkout_quietly(&self, project: &Project, name: &str) {
        let git = self.git(project);
        if advisory("current branch probe", git.current_branch()).flatten().as_deref() == Some(name) {
            return;
        }
        let exists = advisory("branch probe", git.branch_exists(name)).unwrap_or(false);
        let args: Vec<&str> = if exists {
            vec!["checkout", "-q", name]
        } else {
            vec!["checkout", "-q", "-b", name]
        };
        match git.try_run(&args) {
            Ok(out) if out.success() => tracing::debug!(branch = name, "checked out working branch"),
            Ok(out) => tracing::warn!(branch = name, stderr = %out.stderr.trim(), "checkout failed, staging on current HEAD"),
            Err(e) => tracing::warn!(branch = name, error = %e, "checkout failed, staging on current HEAD"),
        }
    }

    /// Record `file_path` as staged on the active working branch and stage it
    /// in git. A git failure is reported in the outcome, not as an error.
    pub fn stage_workspace_change(&self, project: &Project, file_path: &str, source: StagedSource) -> Result<StageOutcome> {
        let path = normalize_repo_path(&project.root, file_path)?;
        let branch = self.resolve_working_branch(project)?;
        self.checkout_quietly(project, &branch.name);

        let mut entries = branch.staged_entries();
        entries.retain(|e| e.path != path);
        entries.push(StagedFileEntry::new(path.clone(), source));

        let mut changes = BranchChanges::new().staged(&entries).last_test_run(None);
        if branch.status().can_transition_to(BranchStatus::Active) {
            changes = changes.status(BranchStatus::Active);
        }
        let branch = self.db.update_branch(branch.id, changes)?;

        let git = self.git(project);
        let verified = git
            .run(&["add", "-A", "--", &path])
            .and_then(|_| git.staged_status_of(&path));
        let (staged, error) = match verified {
            Ok(Some(_)) => (true, None),
            Ok(None) => (false, Some(format!("'{}' has no changes to stage", path))),
            Err(e) => (false, Some(e.to_string())),
        };
        if let Some(error) = &error {
            tracing::warn!(branch = %branch.name, path = %path, error = %error, "git staging not confirmed");
        } else {
            tracing::info!(branch = %branch.name, path = %path, source = source.as_str(), "staged");
        }

        let test_scheduled = self.schedule_tests(project, &branch.name);
        Ok(StageOutcome {
            branch,
            path,
            staged,
            error,
            test_scheduled,
        })
    }

    /// Unstage and discard one path, or everything, on `branch_name`.
    ///
    /// Git is only touched when the branch is checked out. A file that was
    /// newly added in the index and is absent from HEAD is deleted from disk.
    pub fn clear_staged_changes(&self, project: &Project, branch_name: &str, file_path: Option<&str>) -> Result<ClearOutcome> {
        let branch = self.require_branch(project, branch_name)?;
        let git = self.git(project);
        let stored = branch.staged_entries();
        let checked_out = git.current_branch()?.as_deref() == Some(branch.name.as_str());

        let targets: Vec<String> = match file_path {
            Some(path) => vec![normalize_repo_path(&project.root, path)?],
            None => {
                let mut all: Vec<String> = stored.iter().map(|e| e.path.clone()).collect();
                if checked_out {
                    for path in advisory("index probe", git.staged_paths()).unwrap_or_default() {
                        if !all.contains(&path) {
                            all.push(path);
                        }
                    }
                }
                all
            }
        };

        let mut deleted = Vec::new();
        if checked_out && !targets.is_empty() {
            let has_head = git.head_sha()?.is_some();
            let mut added = Vec::new();
            for path in &targets {
                let index_status = advisory("index status", git.staged_status_of(path)).flatten();
                let in_head = has_head && git.tree_has_path("HEAD", path)?;

                if has_head {
                    git.try_run(&["reset", "-q", "HEAD", "--", path])?;
                } else {
                    git.try_run(&["rm", "--cached", "-r", "-q", "--", path])?;
                }
                if in_head {
                    git.try_run(&["checkout", "--", path])?;
                }

                if index_status == Some('A') && !in_head {
                    added.push(path);
                }
            }

            let still_staged: Vec<String> = git
                .staged_paths()?
                .into_iter()
                .filter(|p| targets.contains(p))
                .collect();
            if !still_staged.is_empty() {
                return Err(EngineError::Operation(format!(
                    "Paths still staged after clear: {}",
                    still_staged.join(", ")
                )));
            }

            // Files that only ever existed in the index
            for path in added {
                match contained_path(&project.root, path) {
                    Some(location) if location.is_file() || location.is_symlink() => {
                        std::fs::remove_file(&location)?;
                        deleted.push(path.clone());
                    }
                    Some(_) => {}
                    None => tracing::warn!(path = %path, "not deleting file outside project root"),
                }
            }
        } else if !checked_out {
            tracing::debug!(branch = %branch.name, "branch not checked out, clearing snapshot only");
        }

        let remaining: Vec<StagedFileEntry> = stored.into_iter().filter(|e| !targets.contains(&e.path)).collect();
        let branch = self.db.update_branch(branch.id, BranchChanges::new().staged(&remaining))?;
        tracing::info!(branch = %branch.name, cleared = targets.len(), deleted = deleted.len(), "cleared staged changes");

        Ok(ClearOutcome {
            branch,
            cleared: targets,
            deleted,
        })
    }

    /// Commit the index on a checked-out working branch
    pub fn commit_staged_changes(&self, project: &Project, branch_name: &str, message: &str) -> Result<CommitOutcome> {
        let message = message.trim();
        if message.is_empty() {
            return Err(EngineError::Validation("commit message is required".to_string()));
        }
        let branch = self.require_feature(project, branch_name, "commit directly to")?;
        if branch.status() == BranchStatus::Merged {
            return Err(EngineError::Precondition(format!("Branch '{}' is already merged", branch.name)));
        }

        let git = self.git(project);
        if git.current_branch()?.as_deref() != Some(branch.name.as_str()) {
            return Err(EngineError::Precondition(format!("Branch '{}' is not checked out", branch.name)));
        }
        if git.staged_paths()?.is_empty() {
            return Err(EngineError::Precondition("Nothing is staged".to_string()));
        }

        git.run(&["commit", "-q", "-m", message])?;
        let sha = git
            .head_sha()?
            .ok_or_else(|| EngineError::Operation("HEAD missing after commit".to_string()))?;

        let mut changes = BranchChanges::new().staged(&[]);
        if let Some((ahead, behind)) = advisory("branch counters", self.branch_counters(project, &branch.name)) {
            changes = changes.counters(ahead, behind);
        }
        let branch = self.db.update_branch(branch.id, changes)?;
        tracing::info!(branch = %branch.name, sha = %sha, "committed staged changes");

        Ok(CommitOutcome { branch, sha })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_repo_path() {
        let root = Path::new("/srv/shop");
        assert_eq!(normalize_repo_path(root, "src/a.js").unwrap(), "src/a.js");
        assert_eq!(normalize_repo_path(root, "./src/../lib/b.rs").unwrap(), "lib/b.rs");
        assert_eq!(normalize_repo_path(root, "src\\win\\c.css").unwrap(), "src/win/c.css");
        assert_eq!(normalize_repo_path(root, "/srv/shop/web/app.css").unwrap(), "web/app.css");
    }

    #[test]
    fn test_normalize_repo_path_rejects_escapes() {
        let root = Path::new("/srv/shop");
        for bad in ["", "   ", "../etc/passwd", "src/../../x", "/etc/passwd", ".", ".git/config"] {
            let err = normalize_repo_path(root, bad).unwrap_err();
            assert_eq!(err.status_code(), 400, "{}", bad);
        }
    }

    #[test]
    fn test_contained_path() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.js"), "x").unwrap();
        let location = contained_path(dir.path(), "src/a.js").unwrap();
        assert!(location.ends_with("src/a.js"));
        assert!(contained_path(dir.path(), "missing-dir/a.js").is_none());
    }
}
