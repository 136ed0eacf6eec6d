//! Merge a working branch into the trunk
//!
//! Order of business: guard (status or stylesheet-only bypass), test gate,
//! clean tree, changelog requirements, optional pre-merge bump on the
//! branch, `--no-ff` merge, optional post-merge bump on the trunk, and only
//! then the store is updated. Each step that mutates git has a restore point;
//! the trunk is never left half-bumped.

use crate::changelog::{
    bump_version_and_roll_changelog, ensure_changelog_unreleased_entry, extract_unreleased_entries, normalize_entry,
    VersionBump,
};
use crate::db::{Branch, BranchStatus};
use crate::engine::{Engine, Project};
use crate::error::{advisory, EngineError, Result};
use crate::git::{short_sha, Git};
use crate::llm::draft_changelog_entry;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub branch: Branch,
    pub trunk: String,
    pub merge_sha: String,
    /// Merged on the stylesheet-only bypass rather than a test result
    pub bypassed: bool,
    pub pre_merge_bump: Option<VersionBump>,
    pub post_merge_bump: Option<VersionBump>,
    pub goals_merged: usize,
}

impl MergeOutcome {
    /// Version the trunk is at after the merge, if this merge changed it
    pub fn version(&self) -> Option<&str> {
        self.post_merge_bump
            .as_ref()
            .or(self.pre_merge_bump.as_ref())
            .map(|b| b.version.as_str())
    }
}

/// Restore `target` after `failure`; a failed restore wins the report
fn roll_back(git: &Git<'_>, target: &str, failure: EngineError, context: &str) -> EngineError {
    match git.run(&["reset", "-q", "--hard", target]) {
        Ok(_) => {
            tracing::warn!(restored = short_sha(target), error = %failure, "{}, restored", context);
            EngineError::Operation(format!("{}: {}", context, failure))
        }
        Err(rollback) => {
            tracing::error!(target = short_sha(target), error = %rollback, "rollback failed");
            EngineError::RollbackFailed {
                original: Box::new(EngineError::Operation(format!("{}: {}", context, failure))),
                rollback: rollback.to_string(),
            }
        }
    }
}

impl Engine {
    /// Commit the files a bump touched on the checked-out branch
    fn commit_version_bump(&self, project: &Project, bump: &VersionBump) -> Result<()> {
        let git = self.git(project);
        let paths = bump.touched_paths(&project.root, &self.config.release);
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        git.run(&args)?;
        git.run(&["commit", "-q", "-m", &bump.commit_message()])?;
        Ok(())
    }

    /// Changelog entry for a branch that did not write its own: drafted by the
    /// language model when one is configured, else the latest commit subject
    fn derive_changelog_entry(&self, project: &Project, branch: &str) -> Result<Option<String>> {
        let git = self.git(project);
        let range = format!("{}..{}", self.trunk_name(), branch);
        let log = git.output(&["log", "--format=%s", &range])?;
        let subjects: Vec<String> = log.lines().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
        let Some(latest) = subjects.first() else {
            return Ok(None);
        };

        if let Some(model) = &self.drafter {
            let oldest_first: Vec<String> = subjects.iter().rev().cloned().collect();
            let diff_range = format!("{}...{}", self.trunk_name(), branch);
            let diff = advisory("branch diff stat", git.output(&["diff", "--stat", &diff_range])).unwrap_or_default();
            if let Some(entry) = draft_changelog_entry(model.as_ref(), branch, &oldest_first, &diff) {
                return Ok(Some(entry));
            }
        }
        Ok(normalize_entry(latest))
    }

    /// Add the entry, bump and commit on the branch. Any failure resets the
    /// branch to where it was.
    fn pre_merge_bump(&self, project: &Project, branch: &str, entry: &str) -> Result<VersionBump> {
        let git = self.git(project);
        let restore_to = git
            .resolve(branch)?
            .ok_or_else(|| EngineError::NotFound(format!("Branch '{}' has no commits", branch)))?;
        git.checkout(branch)?;

        let attempt = (|| -> Result<VersionBump> {
            let changelog = project.root.join(&self.config.release.changelog_path);
            ensure_changelog_unreleased_entry(&changelog, entry)?;
            let bump = bump_version_and_roll_changelog(&project.root, &self.config.release)?;
            self.commit_version_bump(project, &bump)?;
            Ok(bump)
        })();

        match attempt {
            Ok(bump) => {
                tracing::info!(branch, version = %bump.version, "pre-merge version bump committed");
                Ok(bump)
            }
            Err(e) => Err(roll_back(&git, &restore_to, e, "pre-merge version bump failed")),
        }
    }

    /// Merge `branch_name` into the trunk
    pub fn merge_branch(&self, project: &Project, branch_name: &str) -> Result<MergeOutcome> {
        let branch = self.require_feature(project, branch_name, "merge")?;
        if branch.status() == BranchStatus::Merged {
            return Err(EngineError::Precondition(format!("Branch '{}' is already merged", branch.name)));
        }
        let trunk = self.require_trunk(project)?;
        let git = self.git(project);
        if !git.branch_exists(&branch.name)? {
            return Err(EngineError::NotFound(format!("Git branch '{}' does not exist", branch.name)));
        }

        // Guard
        let changed = git.changed_paths(&trunk.name, &branch.name)?;
        let bypassed = !changed.is_empty() && changed.iter().all(|p| self.config.is_bypass_path(p));
        if branch.status() != BranchStatus::ReadyForMerge && !bypassed {
            return Err(EngineError::Precondition(format!(
                "Branch '{}' is not ready for merge (status: {})",
                branch.name,
                branch.status()
            )));
        }

        // Gate
        if !bypassed {
            match self.db.latest_test_run(branch.id)? {
                Some(run) if run.passed() => {}
                Some(run) => {
                    return Err(EngineError::Precondition(format!(
                        "Latest test run for '{}' is {}; a passing run is required",
                        branch.name, run.status
                    )))
                }
                None => {
                    return Err(EngineError::Precondition(format!(
                        "Branch '{}' has no test runs; a passing run is required",
                        branch.name
                    )))
                }
            }
        }

        self.require_clean_tree(project, "merging")?;

        // Changelog requirements
        let release = &self.config.release;
        let touches_changelog = changed.iter().any(|p| p == &release.changelog_path);
        let touches_version = changed.iter().any(|p| p == &release.version_path);
        if touches_changelog {
            let text = git.show_file(&branch.name, &release.changelog_path)?.unwrap_or_default();
            let section = extract_unreleased_entries(&text);
            if !section.has_heading || section.entries.is_empty() {
                return Err(EngineError::Precondition(format!(
                    "{} on '{}' needs an '## Unreleased' section with at least one entry",
                    release.changelog_path, branch.name
                )));
            }
        }

        let pre_merge_bump = if !touches_changelog && !touches_version {
            match self.derive_changelog_entry(project, &branch.name)? {
                Some(entry) => Some(self.pre_merge_bump(project, &branch.name, &entry)?),
                None => None,
            }
        } else {
            None
        };

        // Merge
        git.checkout(&branch.name)?;
        git.checkout(&trunk.name)?;
        let pre_merge_sha = git
            .head_sha()?
            .ok_or_else(|| EngineError::Precondition(format!("Trunk '{}' has no commits", trunk.name)))?;

        if let Err(e) = git.run(&["merge", "--no-ff", "--no-edit", &branch.name]) {
            if let Err(abort) = git.try_run(&["merge", "--abort"]) {
                tracing::warn!(error = %abort, "merge --abort failed");
            }
            return Err(EngineError::Operation(format!(
                "Merging '{}' into '{}' failed: {}",
                branch.name, trunk.name, e
            )));
        }
        tracing::info!(branch = %branch.name, trunk = %trunk.name, bypassed, "merged");

        // Post-merge bump unless the branch carried its own
        let post_merge_bump = if pre_merge_bump.is_none() && !touches_version {
            let attempt = bump_version_and_roll_changelog(&project.root, release)
                .and_then(|bump| self.commit_version_bump(project, &bump).map(|_| bump));
            match attempt {
                Ok(bump) => {
                    tracing::info!(version = %bump.version, "post-merge version bump committed");
                    Some(bump)
                }
                Err(e) => return Err(roll_back(&git, &pre_merge_sha, e, "post-merge version bump failed")),
            }
        } else {
            None
        };

        let merge_sha = git
            .head_sha()?
            .ok_or_else(|| EngineError::Operation("HEAD missing after merge".to_string()))?;

        // Finalize
        let goals_merged = self.db.mark_merged(branch.id, trunk.id)?;
        self.cancel_scheduled_tests(project, &branch.name);
        self.refresh_counters_quietly(project);

        let branch = self.require_branch(project, &branch.name)?;
        Ok(MergeOutcome {
            branch,
            trunk: trunk.name,
            merge_sha,
            bypassed,
            pre_merge_bump,
            post_merge_bump,
            goals_merged,
        })
    }
}
