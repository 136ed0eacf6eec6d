//! Branch reset and unified-diff patches

use crate::db::{Branch, BranchChanges, BranchStatus, StagedFileEntry, StagedSource};
use crate::engine::{Engine, Project};
use crate::error::{EngineError, Result};
use crate::reconcile::IndexSnapshot;
use serde::Serialize;
use std::path::PathBuf;

const PATCH_FILE: &str = "workbranch-apply.patch";

#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub branch: Branch,
    pub staged_files: Vec<StagedFileEntry>,
    pub test_scheduled: bool,
}

impl Engine {
    fn require_unmerged_feature(&self, project: &Project, name: &str, action: &str) -> Result<Branch> {
        let branch = self.require_feature(project, name, action)?;
        if branch.status() == BranchStatus::Merged {
            return Err(EngineError::Precondition(format!("Branch '{}' is already merged", branch.name)));
        }
        Ok(branch)
    }

    /// Throw away everything on `name` and point it back at the trunk
    pub fn reset_branch(&self, project: &Project, name: &str) -> Result<Branch> {
        let branch = self.require_unmerged_feature(project, name, "reset")?;
        let trunk = self.require_trunk(project)?;
        let git = self.git(project);
        let Some(trunk_sha) = git.resolve(&trunk.name)? else {
            return Err(EngineError::Precondition(format!("Trunk '{}' has no commits", trunk.name)));
        };

        git.checkout(&branch.name)?;
        git.run(&["reset", "-q", "--hard", &trunk_sha])?;
        self.cancel_scheduled_tests(project, &branch.name);

        let mut changes = BranchChanges::new().staged(&[]).counters(0, 0).last_test_run(None);
        if branch.status().can_transition_to(BranchStatus::Active) {
            changes = changes.status(BranchStatus::Active);
        }
        self.db.update_branch(branch.id, changes)?;
        let branch = self.db.set_current_branch(&project.id, branch.id)?;
        tracing::info!(branch = %branch.name, trunk = %trunk.name, "branch reset to trunk");
        Ok(branch)
    }

    /// `git diff trunk...name`
    pub fn export_patch(&self, project: &Project, name: &str) -> Result<String> {
        let branch = self.require_feature(project, name, "export a patch from")?;
        let range = format!("{}...{}", self.trunk_name(), branch.name);
        Ok(self.git(project).run(&["diff", &range])?.stdout)
    }

    fn patch_path(&self, project: &Project) -> Result<PathBuf> {
        let git_dir = self.git(project).output(&["rev-parse", "--absolute-git-dir"])?;
        Ok(PathBuf::from(git_dir).join(PATCH_FILE))
    }

    /// Apply a unified diff to `name` and stage the result as agent work
    pub fn apply_patch(&self, project: &Project, name: &str, patch: &str) -> Result<ApplyOutcome> {
        if patch.trim().is_empty() {
            return Err(EngineError::Validation("patch is empty".to_string()));
        }
        let branch = self.require_unmerged_feature(project, name, "apply a patch to")?;
        self.require_clean_tree(project, "applying a patch")?;

        let git = self.git(project);
        git.checkout(&branch.name)?;
        let branch = self.db.set_current_branch(&project.id, branch.id)?;

        let patch_path = self.patch_path(project)?;
        let mut contents = patch.to_string();
        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        std::fs::write(&patch_path, contents)?;
        let patch_arg = patch_path.to_string_lossy().to_string();

        let applied = git.try_run(&["apply", "--check", &patch_arg]).and_then(|check| {
            if check.success() {
                git.run(&["apply", "--index", &patch_arg]).map(|_| ())
            } else {
                Err(EngineError::Precondition(format!(
                    "Patch does not apply to '{}': {}",
                    branch.name,
                    check.stderr.trim()
                )))
            }
        });
        if let Err(e) = std::fs::remove_file(&patch_path) {
            tracing::debug!(error = %e, "could not remove temporary patch file");
        }
        applied?;

        let stored = branch.staged_entries();
        let staged_files: Vec<StagedFileEntry> = IndexSnapshot::read(&git)?
            .paths()
            .into_iter()
            .map(|path| {
                stored
                    .iter()
                    .find(|e| e.path == path)
                    .cloned()
                    .unwrap_or_else(|| StagedFileEntry::new(path, StagedSource::Ai))
            })
            .collect();

        let mut changes = BranchChanges::new().staged(&staged_files).last_test_run(None);
        if branch.status().can_transition_to(BranchStatus::Active) {
            changes = changes.status(BranchStatus::Active);
        }
        let branch = self.db.update_branch(branch.id, changes)?;
        tracing::info!(branch = %branch.name, files = staged_files.len(), "patch applied");

        let test_scheduled = self.schedule_tests(project, &branch.name);
        Ok(ApplyOutcome {
            branch,
            staged_files,
            test_scheduled,
        })
    }
}
