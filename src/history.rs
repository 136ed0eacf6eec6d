//! Commit history reader and revert

use crate::engine::{Engine, Project};
use crate::error::{advisory, EngineError, Result};
use crate::git::{parse_name_status_z, short_sha, validate_sha, Git};
use crate::staging::normalize_repo_path;
use serde::Serialize;

const FIELD: char = '\u{1f}';
const RECORD: char = '\u{1e}';

/// Default number of commits returned by [`Engine::get_commit_history`]
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub sha: String,
    pub author_name: String,
    pub author_email: String,
    pub authored_at: String,
    pub subject: String,
    pub parent_shas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitFileChange {
    pub path: String,
    pub old_path: Option<String>,
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitDetails {
    pub sha: String,
    pub author: Signature,
    pub committer: Signature,
    pub subject: String,
    pub body: String,
    pub parent_shas: Vec<String>,
    pub parent_count: usize,
    pub is_initial_commit: bool,
    pub can_revert: bool,
    pub files: Vec<CommitFileChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiffContent {
    pub path: String,
    pub original: String,
    pub modified: String,
    pub original_label: String,
    pub modified_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevertOutcome {
    pub reverted_sha: String,
    pub new_sha: String,
}

fn change_label(status: char) -> &'static str {
    match status {
        'A' => "added",
        'M' => "modified",
        'D' => "deleted",
        'R' => "renamed",
        'C' => "copied",
        'T' => "type-changed",
        'U' => "unmerged",
        _ => "unknown",
    }
}

fn split_parents(field: &str) -> Vec<String> {
    field.split_whitespace().map(str::to_string).collect()
}

fn parse_history(raw: &str) -> Vec<CommitSummary> {
    raw.split(RECORD)
        .map(|record| record.trim_start_matches('\n'))
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| {
            let fields: Vec<&str> = record.splitn(6, FIELD).collect();
            if fields.len() < 6 {
                tracing::debug!(record, "skipping malformed log record");
                return None;
            }
            Some(CommitSummary {
                sha: fields[0].to_string(),
                author_name: fields[1].to_string(),
                author_email: fields[2].to_string(),
                authored_at: fields[3].to_string(),
                subject: fields[4].to_string(),
                parent_shas: split_parents(fields[5]),
            })
        })
        .collect()
}

fn or_unknown(name: &str) -> String {
    if name.trim().is_empty() {
        "Unknown".to_string()
    } else {
        name.to_string()
    }
}

impl Engine {
    /// Validate `sha` and resolve it to a full commit id
    pub(crate) fn resolve_commit(&self, git: &Git<'_>, sha: &str) -> Result<String> {
        let sha = validate_sha(sha)?;
        git.resolve(sha)?
            .ok_or_else(|| EngineError::NotFound(format!("Commit '{}' not found", sha)))
    }

    /// Newest-first log of HEAD. An empty or unreadable repository yields `[]`.
    pub fn get_commit_history(&self, project: &Project, limit: usize) -> Vec<CommitSummary> {
        let git = self.git(project);
        if advisory("history head", git.head_sha()).flatten().is_none() {
            return Vec::new();
        }

        let limit = match limit {
            0 => DEFAULT_HISTORY_LIMIT,
            n => n,
        }
        .to_string();
        let format = "--format=%H%x1f%an%x1f%ae%x1f%aI%x1f%s%x1f%P%x1e";
        advisory("history", git.run(&["log", "-n", &limit, format]))
            .map(|out| parse_history(&out.stdout))
            .unwrap_or_default()
    }

    pub fn get_commit_details(&self, project: &Project, sha: &str) -> Result<CommitDetails> {
        let git = self.git(project);
        let sha = self.resolve_commit(&git, sha)?;

        let format = "--format=%H%x1f%an%x1f%ae%x1f%aI%x1f%cn%x1f%ce%x1f%cI%x1f%P%x1f%s%x1f%b";
        let out = git.run(&["show", "-s", format, &sha])?;
        let fields: Vec<&str> = out.stdout.splitn(10, FIELD).collect();
        if fields.len() < 10 {
            return Err(EngineError::Operation(format!("Unexpected metadata for commit {}", sha)));
        }

        let parent_shas = split_parents(fields[7]);
        let parent_count = parent_shas.len();

        let tree = git.run(&["diff-tree", "--root", "--no-commit-id", "-r", "--name-status", "-M", "-z", &sha])?;
        let files = parse_name_status_z(&tree.stdout)
            .into_iter()
            .map(|record| CommitFileChange {
                path: record.path,
                old_path: record.old_path,
                status: change_label(record.status),
            })
            .collect();

        Ok(CommitDetails {
            sha: fields[0].to_string(),
            author: Signature {
                name: or_unknown(fields[1]),
                email: fields[2].to_string(),
                date: fields[3].to_string(),
            },
            committer: Signature {
                name: or_unknown(fields[4]),
                email: fields[5].to_string(),
                date: fields[6].to_string(),
            },
            subject: fields[8].to_string(),
            body: fields[9].trim_end().to_string(),
            parent_shas,
            parent_count,
            is_initial_commit: parent_count == 0,
            can_revert: parent_count > 0,
            files,
        })
    }

    /// Before/after contents of `path` around commit `sha`
    pub fn get_commit_file_diff_content(&self, project: &Project, sha: &str, path: &str) -> Result<FileDiffContent> {
        let git = self.git(project);
        let sha = self.resolve_commit(&git, sha)?;
        let path = normalize_repo_path(&project.root, path)?;

        let (original, original_label) = match git.parents(&sha)?.first() {
            Some(parent) => match git.show_file(parent, &path)? {
                Some(content) => (content, short_sha(parent).to_string()),
                None => (String::new(), "Empty".to_string()),
            },
            None => (String::new(), "Empty".to_string()),
        };
        let modified = git.show_file(&sha, &path)?.unwrap_or_default();

        Ok(FileDiffContent {
            path,
            original,
            modified,
            original_label,
            modified_label: short_sha(&sha).to_string(),
        })
    }

    /// `git revert --no-edit`; a conflict or refusal is returned as is
    pub fn revert_commit(&self, project: &Project, sha: &str) -> Result<RevertOutcome> {
        let git = self.git(project);
        let sha = self.resolve_commit(&git, sha)?;
        self.require_clean_tree(project, "reverting")?;

        if let Err(e) = git.run(&["revert", "--no-edit", &sha]) {
            if let Err(abort) = git.try_run(&["revert", "--abort"]) {
                tracing::warn!(error = %abort, "revert --abort failed");
            }
            return Err(e);
        }
        let new_sha = git
            .head_sha()?
            .ok_or_else(|| EngineError::Operation("HEAD missing after revert".to_string()))?;
        tracing::info!(reverted = %sha, new = %new_sha, "commit reverted");

        self.refresh_counters_quietly(project);
        Ok(RevertOutcome {
            reverted_sha: sha,
            new_sha,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_history() {
        let raw = "aaa\u{1f}Ada\u{1f}ada@x.io\u{1f}2026-01-02T03:04:05+00:00\u{1f}Add login\u{1f}bbb ccc\u{1e}\n\
                   bbb\u{1f}Bo\u{1f}bo@x.io\u{1f}2026-01-01T00:00:00+00:00\u{1f}Initial\u{1f}\u{1e}\n";
        let commits = parse_history(raw);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].subject, "Add login");
        assert_eq!(commits[0].parent_shas, vec!["bbb", "ccc"]);
        assert!(commits[1].parent_shas.is_empty());
    }

    #[test]
    fn test_parse_history_skips_garbage() {
        assert!(parse_history("").is_empty());
        assert!(parse_history("not a record\u{1e}").is_empty());
    }

    #[test]
    fn test_change_labels_and_unknown_author() {
        assert_eq!(change_label('R'), "renamed");
        assert_eq!(change_label('X'), "unknown");
        assert_eq!(or_unknown("  "), "Unknown");
        assert_eq!(or_unknown("Ada"), "Ada");
    }
}
