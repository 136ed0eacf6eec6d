//! Branch lifecycle: init, create, switch, delete, test results, goals

use crate::db::{AgentGoal, Branch, BranchChanges, BranchStatus, BranchType, StagedFileEntry, TestRun, TestStatus};
use crate::engine::{Engine, Project};
use crate::error::{advisory, EngineError, Result};
use crate::git::validate_branch_name;
use serde::Serialize;

/// A branch row with its decoded snapshot and latest test run
#[derive(Debug, Clone, Serialize)]
pub struct BranchView {
    pub id: i32,
    pub name: String,
    pub branch_type: BranchType,
    pub status: BranchStatus,
    pub staged_files: Vec<StagedFileEntry>,
    pub ahead_commits: i32,
    pub behind_commits: i32,
    pub is_current: bool,
    pub last_test_run: Option<TestRun>,
    pub goals: Vec<AgentGoal>,
    pub updated_at: String,
}

/// Result of recording a test run
#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    pub run: TestRun,
    pub branch: Branch,
}

/// `{prefix}{YYYYMMDD-HHMMSS}-{8 hex}`
pub fn auto_branch_name(prefix: &str) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}-{}", prefix, stamp, &suffix[..8])
}

impl Engine {
    /// Ensure the trunk row exists; it becomes current if nothing is
    pub fn init_project(&self, project: &Project) -> Result<Branch> {
        let probe = self.git(project).try_run(&["rev-parse", "--git-dir"])?;
        if !probe.success() {
            return Err(EngineError::Precondition(format!(
                "{} is not a git repository",
                project.root.display()
            )));
        }

        let trunk = match self.db.main_branch(&project.id)? {
            Some(trunk) => trunk,
            None => {
                let name = validate_branch_name(self.trunk_name())?;
                let trunk = self.db.insert_branch(&project.id, name, BranchType::Main)?;
                tracing::info!(project = %project.id, trunk = %trunk.name, "project initialized");
                trunk
            }
        };

        if self.db.current_branch(&project.id)?.is_none() {
            return Ok(self.db.set_current_branch(&project.id, trunk.id)?);
        }
        Ok(trunk)
    }

    /// Unmerged branches, the current one reconciled against the index
    pub fn branch_overview(&self, project: &Project) -> Result<Vec<BranchView>> {
        let mut views = Vec::new();
        for branch in self.db.list_active_branches(&project.id)? {
            let staged_files = self.sync_staged_files(project, &branch)?;
            views.push(BranchView {
                id: branch.id,
                name: branch.name.clone(),
                branch_type: branch.kind(),
                status: branch.status(),
                staged_files,
                ahead_commits: branch.ahead_commits,
                behind_commits: branch.behind_commits,
                is_current: branch.is_current,
                last_test_run: self.db.latest_test_run(branch.id)?,
                goals: self.db.list_goals(branch.id)?,
                updated_at: branch.updated_at,
            });
        }
        Ok(views)
    }

    /// Create a working branch from the trunk's tip
    pub fn create_branch(&self, project: &Project, name: &str) -> Result<Branch> {
        let name = validate_branch_name(name)?;
        let trunk = self.init_project(project)?;
        if self.db.get_branch(&project.id, name)?.is_some() {
            return Err(EngineError::Validation(format!("Branch '{}' already exists", name)));
        }

        let git = self.git(project);
        if !git.branch_exists(name)? {
            if git.resolve(&trunk.name)?.is_none() {
                return Err(EngineError::Precondition(format!(
                    "Trunk '{}' has no commits to branch from",
                    trunk.name
                )));
            }
            git.run(&["branch", name, &trunk.name])?;
        }

        let branch = self.db.insert_branch(&project.id, name, BranchType::Feature)?;
        tracing::info!(project = %project.id, branch = %branch.name, "branch created");
        Ok(branch)
    }

    /// Check out `name` and make it the current row
    pub fn switch_branch(&self, project: &Project, name: &str) -> Result<Branch> {
        let branch = self.require_branch(project, name)?;
        if branch.status() == BranchStatus::Merged {
            return Err(EngineError::Precondition(format!("Branch '{}' is already merged", name)));
        }
        self.git(project).checkout(&branch.name)?;
        Ok(self.db.set_current_branch(&project.id, branch.id)?)
    }

    /// Delete a working branch from git and the store
    pub fn delete_branch(&self, project: &Project, name: &str) -> Result<()> {
        let branch = self.require_feature(project, name, "delete")?;
        let trunk = self.require_trunk(project)?;
        let git = self.git(project);

        if git.current_branch()?.as_deref() == Some(branch.name.as_str()) {
            git.checkout(&trunk.name)?;
        }
        if git.branch_exists(&branch.name)? {
            git.run(&["branch", "-D", &branch.name])?;
        }

        self.cancel_scheduled_tests(project, &branch.name);
        self.db.delete_branch(branch.id)?;
        if branch.is_current {
            self.db.set_current_branch(&project.id, trunk.id)?;
        }
        tracing::info!(project = %project.id, branch = %branch.name, "branch deleted");
        Ok(())
    }

    /// Store a test result; `passed` readies the branch, `failed` flags it
    pub fn record_test_result(
        &self,
        project: &Project,
        branch_name: &str,
        status: TestStatus,
        summary: Option<&str>,
    ) -> Result<TestRecord> {
        let branch = self.require_branch(project, branch_name)?;
        let run = self.db.insert_test_run(&project.id, branch.id, status, summary)?;

        let mut changes = BranchChanges::new().last_test_run(Some(run.id));
        let next = match status {
            TestStatus::Passed => Some(BranchStatus::ReadyForMerge),
            TestStatus::Failed => Some(BranchStatus::NeedsFix),
            TestStatus::Pending => None,
        };
        if let Some(next) = next {
            if !branch.is_trunk() && branch.status().can_transition_to(next) {
                changes = changes.status(next);
            }
        }

        let branch = self.db.update_branch(branch.id, changes)?;
        tracing::info!(branch = %branch.name, result = status.as_str(), status = %branch.status(), "test result recorded");
        Ok(TestRecord { run, branch })
    }

    /// `(ahead, behind)` of `name` against the trunk
    pub(crate) fn branch_counters(&self, project: &Project, name: &str) -> Result<(i32, i32)> {
        self.git(project).ahead_behind(self.trunk_name(), name)
    }

    /// Recompute ahead/behind for every unmerged working branch
    pub fn refresh_counters(&self, project: &Project) -> Result<Vec<Branch>> {
        let git = self.git(project);
        let branches = self.db.list_active_branches(&project.id)?;
        if git.resolve(self.trunk_name())?.is_none() {
            return Ok(branches);
        }

        let mut refreshed = Vec::with_capacity(branches.len());
        for branch in branches {
            if branch.is_trunk() || !git.branch_exists(&branch.name)? {
                refreshed.push(branch);
                continue;
            }
            match self.branch_counters(project, &branch.name) {
                Ok((ahead, behind)) if (ahead, behind) != (branch.ahead_commits, branch.behind_commits) => {
                    refreshed.push(self.db.update_branch(branch.id, BranchChanges::new().counters(ahead, behind))?);
                }
                Ok(_) => refreshed.push(branch),
                Err(e) => {
                    tracing::warn!(branch = %branch.name, error = %e, "ahead/behind unavailable");
                    refreshed.push(branch);
                }
            }
        }
        Ok(refreshed)
    }

    /// [`Engine::refresh_counters`] after a mutation that already succeeded
    pub(crate) fn refresh_counters_quietly(&self, project: &Project) {
        advisory("counter refresh", self.refresh_counters(project));
    }

    pub fn add_goal(&self, project: &Project, branch_name: &str, description: &str) -> Result<AgentGoal> {
        let description = description.trim();
        if description.is_empty() {
            return Err(EngineError::Validation("goal description is required".to_string()));
        }
        let branch = self.require_branch(project, branch_name)?;
        if branch.status() == BranchStatus::Merged {
            return Err(EngineError::Precondition(format!("Branch '{}' is already merged", branch.name)));
        }
        Ok(self.db.insert_goal(&project.id, branch.id, description)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_auto_branch_name_shape() {
        let name = auto_branch_name("feature/");
        let re = Regex::new(r"^feature/\d{8}-\d{6}-[0-9a-f]{8}$").unwrap();
        assert!(re.is_match(&name), "{}", name);
        assert!(validate_branch_name(&name).is_ok());
        assert_ne!(auto_branch_name("x/"), auto_branch_name("x/"));
    }
}
