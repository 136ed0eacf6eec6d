//! Workbranch - test-gated working branches over a shared git trunk
//!
//! An agent and a human editor stage changes onto short-lived working
//! branches; a branch merges into the trunk once its latest test run passes
//! (or it only touches stylesheets), and every merge advances the VERSION
//! file and rolls the changelog.
//!
//! # Overview
//!
//! Two stores describe a branch: a SQLite row (what the engine believes is
//! staged, the branch status, ahead/behind counters) and the git working
//! tree itself. Reads reconcile the row against the index; multi-step
//! mutations (squash, merge with version bump) either finish or restore the
//! trunk to where it was.
//!
//! # Branch Status
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `active` | Work in progress; staging returns a branch here |
//! | `needs-fix` | Latest test run failed |
//! | `ready-for-merge` | Latest test run passed |
//! | `merged` | Folded into the trunk (terminal) |
//!
//! # Quick Start
//!
//! ```no_run
//! use workbranch::{Config, Database, Engine, Project, StagedSource, TestStatus};
//!
//! let config = Config::load();
//! let engine = Engine::new(Database::open().unwrap(), config.clone());
//! let project = Project::from_root(std::path::Path::new("."), &config);
//!
//! engine.init_project(&project).unwrap();
//! let staged = engine.stage_workspace_change(&project, "src/app.js", StagedSource::Ai).unwrap();
//! engine.commit_staged_changes(&project, &staged.branch.name, "Add search").unwrap();
//! engine.record_test_result(&project, &staged.branch.name, TestStatus::Passed, None).unwrap();
//! let merged = engine.merge_branch(&project, &staged.branch.name).unwrap();
//! println!("trunk is now at {:?}", merged.version());
//! ```

pub mod branches;
pub mod changelog;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod git;
pub mod history;
pub mod llm;
pub mod merge;
pub mod patch;
pub mod reconcile;
pub mod scheduler;
pub mod schema;
pub mod squash;
pub mod staging;

pub use branches::{auto_branch_name, BranchView, TestRecord};
pub use changelog::{
    bump_version_and_roll_changelog, ensure_changelog_unreleased_entry, extract_unreleased_entries, increment_patch,
    parse_semver, roll_changelog_to_version, EntryOutcome, UnreleasedSection, VersionBump,
};
pub use config::Config;
pub use db::{
    AgentGoal, Branch, BranchStatus, BranchType, Database, StagedFileEntry, StagedSource, TestRun, TestStatus,
    CURRENT_SCHEMA,
};
pub use engine::{Engine, Project};
pub use error::{advisory, EngineError, ErrorKind, ErrorReport};
pub use git::{CommandOutput, CommandRunner, GitCli};
pub use history::{CommitDetails, CommitSummary, FileDiffContent, RevertOutcome};
pub use llm::LanguageModel;
pub use merge::MergeOutcome;
pub use patch::ApplyOutcome;
pub use reconcile::{reconcile, Reconciliation};
pub use scheduler::{TestScheduler, TestTrigger};
pub use squash::SquashOutcome;
pub use staging::{ClearOutcome, CommitOutcome, StageOutcome};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        assert_eq!(CURRENT_SCHEMA.version_string(), "1.1.0");
        assert_eq!(EngineError::NotFound("x".into()).kind(), ErrorKind::NotFound);
    }
}
