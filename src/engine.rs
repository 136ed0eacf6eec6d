//! The branch workflow engine
//!
//! [`Engine`] owns the branch store, the command runner and the optional
//! collaborators. Operations live in the sibling modules as `impl Engine`
//! blocks and all take a [`Project`].
//!
//! # Concurrency
//!
//! Each operation runs its git subcommands one after another and does not
//! lock anything. Two calls that mutate the same `(project_id, branch)` must
//! be serialized by the caller, typically with a mutex keyed on that pair.
//! Calls against different projects are independent.

use crate::config::Config;
use crate::db::{Branch, Database};
use crate::error::{EngineError, Result};
use crate::git::{CommandRunner, Git, GitCli};
use crate::llm::LanguageModel;
use crate::scheduler::TestScheduler;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A managed repository: store key plus working tree location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: String,
    pub root: PathBuf,
}

impl Project {
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
        }
    }

    /// Project for `root`, keyed by the configured id or the directory name
    pub fn from_root(root: &Path, config: &Config) -> Self {
        Self::new(config.project_id_for(root), root)
    }
}

pub struct Engine {
    pub(crate) db: Database,
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) config: Config,
    pub(crate) drafter: Option<Arc<dyn LanguageModel>>,
    pub(crate) scheduler: Option<TestScheduler>,
}

impl Engine {
    /// Engine over the system `git`
    pub fn new(db: Database, config: Config) -> Self {
        Self::with_runner(db, config, Arc::new(GitCli::new()))
    }

    pub fn with_runner(db: Database, config: Config, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            db,
            runner,
            config,
            drafter: None,
            scheduler: None,
        }
    }

    /// Draft changelog entries for the pre-merge bump with `model`
    pub fn with_language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.drafter = Some(model);
        self
    }

    /// Request delayed test runs after staging
    pub fn with_scheduler(mut self, scheduler: TestScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn git<'a>(&'a self, project: &'a Project) -> Git<'a> {
        Git::new(self.runner.as_ref(), &project.root)
    }

    pub(crate) fn trunk_name(&self) -> &str {
        &self.config.branch.trunk
    }

    /// Branch row by name, or NotFound
    pub(crate) fn require_branch(&self, project: &Project, name: &str) -> Result<Branch> {
        self.db
            .get_branch(&project.id, name)?
            .ok_or_else(|| EngineError::NotFound(format!("Branch '{}' not found", name)))
    }

    /// Branch row that is a working branch; the trunk is refused
    pub(crate) fn require_feature(&self, project: &Project, name: &str, action: &str) -> Result<Branch> {
        let branch = self.require_branch(project, name)?;
        if branch.is_trunk() {
            return Err(EngineError::Precondition(format!(
                "Cannot {} the trunk branch '{}'",
                action, branch.name
            )));
        }
        Ok(branch)
    }

    /// The trunk row; the project must have been initialized
    pub(crate) fn require_trunk(&self, project: &Project) -> Result<Branch> {
        self.db.main_branch(&project.id)?.ok_or_else(|| {
            EngineError::Precondition(format!("Project '{}' has not been initialized", project.id))
        })
    }

    /// Refuse to continue unless tracked files have no local modifications
    pub(crate) fn require_clean_tree(&self, project: &Project, action: &str) -> Result<()> {
        if self.git(project).is_clean()? {
            Ok(())
        } else {
            Err(EngineError::Precondition(format!(
                "Working tree has uncommitted changes; commit or clear them before {}",
                action
            )))
        }
    }

    /// Cancel a pending auto-test for `branch`, if any
    pub(crate) fn cancel_scheduled_tests(&self, project: &Project, branch: &str) {
        if let Some(scheduler) = &self.scheduler {
            if scheduler.cancel(&project.id, branch) {
                tracing::debug!(project = %project.id, branch, "cancelled pending test run");
            }
        }
    }

    /// Fire-and-forget test request; returns whether one was scheduled
    pub(crate) fn schedule_tests(&self, project: &Project, branch: &str) -> bool {
        match &self.scheduler {
            Some(scheduler) if self.config.tests.auto_run => {
                scheduler.schedule(&project.id, branch);
                true
            }
            _ => false,
        }
    }
}
