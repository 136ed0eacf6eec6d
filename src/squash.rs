//! Fold the two tip commits of the checked-out branch into one

use crate::engine::{Engine, Project};
use crate::error::{EngineError, Result};
use crate::git::short_sha;
use serde::Serialize;

const DEFAULT_SQUASH_MESSAGE: &str = "Squashed commit";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SquashOutcome {
    pub older_sha: String,
    pub newer_sha: String,
    pub new_sha: String,
    pub message: String,
    /// The squashed pair were the first two commits of the history
    pub root: bool,
}

impl Engine {
    /// Squash `older` and `newer` (HEAD and its only parent) into one commit.
    ///
    /// Preconditions are checked in order and nothing is written until all
    /// pass: clean tree, both shas resolve, they differ, `newer` is HEAD,
    /// HEAD has exactly one parent, that parent is `older`.
    pub fn squash_commits(&self, project: &Project, older: &str, newer: &str, message: Option<&str>) -> Result<SquashOutcome> {
        let git = self.git(project);
        self.require_clean_tree(project, "squashing")?;

        let older_sha = self.resolve_commit(&git, older)?;
        let newer_sha = self.resolve_commit(&git, newer)?;
        if older_sha == newer_sha {
            return Err(EngineError::Validation("Cannot squash a commit into itself".to_string()));
        }

        let head = git
            .head_sha()?
            .ok_or_else(|| EngineError::Precondition("Repository has no commits".to_string()))?;
        if newer_sha != head {
            return Err(EngineError::Precondition(format!(
                "Only the tip commit can be squashed; {} is not HEAD",
                short_sha(&newer_sha)
            )));
        }

        let parents = git.parents(&head)?;
        if parents.len() != 1 {
            return Err(EngineError::Precondition(format!(
                "HEAD has {} parents; merge and root commits cannot be squashed",
                parents.len()
            )));
        }
        if parents[0] != older_sha {
            return Err(EngineError::Precondition(format!(
                "{} is not the parent of HEAD",
                short_sha(&older_sha)
            )));
        }

        let message = match message.map(str::trim).filter(|m| !m.is_empty()) {
            Some(explicit) => explicit.to_string(),
            None => {
                let subject = git.output(&["log", "-1", "--format=%s", &head])?;
                if subject.is_empty() {
                    DEFAULT_SQUASH_MESSAGE.to_string()
                } else {
                    subject
                }
            }
        };

        let base = git.resolve(&format!("{}^", older_sha))?;
        let root = base.is_none();
        let new_sha = match base {
            Some(base) => {
                git.run(&["reset", "--soft", &base])?;
                if let Err(e) = git.run(&["commit", "-q", "--allow-empty", "-m", &message]) {
                    return Err(match git.run(&["reset", "--soft", &head]) {
                        Ok(_) => e,
                        Err(rollback) => EngineError::RollbackFailed {
                            original: Box::new(e),
                            rollback: rollback.to_string(),
                        },
                    });
                }
                git.head_sha()?
                    .ok_or_else(|| EngineError::Operation("HEAD missing after squash".to_string()))?
            }
            None => {
                let tree = format!("{}^{{tree}}", head);
                let new_root = git.output(&["commit-tree", &tree, "-m", &message])?;
                let refname = match git.current_branch()? {
                    Some(name) => format!("refs/heads/{}", name),
                    None => "HEAD".to_string(),
                };
                git.run(&["update-ref", &refname, &new_root, &head])?;
                git.run(&["reset", "-q", "--hard", &new_root])?;
                new_root
            }
        };

        tracing::info!(
            older = short_sha(&older_sha),
            newer = short_sha(&newer_sha),
            new = short_sha(&new_sha),
            root,
            "squashed commits"
        );
        self.refresh_counters_quietly(project);

        Ok(SquashOutcome {
            older_sha,
            newer_sha,
            new_sha,
            message,
            root,
        })
    }
}
