//! Git command runner
//!
//! Every inspection or mutation of a working tree goes through
//! [`CommandRunner::run`]. The runner never retries; callers decide whether a
//! non-zero exit is fatal (`allow_failure = false`) or an answer to a question
//! (`allow_failure = true`, e.g. "does this rev resolve?").

use crate::error::{EngineError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;
use std::process::Command;

lazy_static! {
    static ref SHA_RE: Regex = Regex::new(r"^[0-9a-fA-F]{4,40}$").unwrap();
    static ref BRANCH_NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]*$").unwrap();
}

/// Captured result of one subprocess
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Executes version-control subcommands against a working directory
pub trait CommandRunner: Send + Sync {
    /// Run `git <args>` in `working_dir`. A non-zero exit is an error unless
    /// `allow_failure` is set.
    fn run(&self, working_dir: &Path, args: &[&str], allow_failure: bool) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    /// Use a specific git binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for GitCli {
    fn run(&self, working_dir: &Path, args: &[&str], allow_failure: bool) -> Result<CommandOutput> {
        tracing::debug!(dir = %working_dir.display(), ?args, "git");

        let output = Command::new(&self.program)
            .args(args)
            .current_dir(working_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| EngineError::Operation(format!("failed to run git {}: {}", args.join(" "), e)))?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        if !result.success() && !allow_failure {
            // merge/apply report conflicts on stdout
            let detail = if result.stderr.trim().is_empty() {
                result.stdout.trim().to_string()
            } else {
                result.stderr.trim().to_string()
            };
            return Err(EngineError::Git {
                command: args.join(" "),
                exit_code: result.exit_code,
                stderr: detail,
            });
        }

        Ok(result)
    }
}

/// One `--name-status` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameStatus {
    /// Status letter: A, M, D, R, C, T, U
    pub status: char,
    pub path: String,
    /// Source path for renames and copies
    pub old_path: Option<String>,
}

/// Parse `--name-status -z` output (`R100\0old\0new\0M\0path\0`)
pub fn parse_name_status_z(raw: &str) -> Vec<NameStatus> {
    let mut fields = raw.split('\0').filter(|f| !f.is_empty());
    let mut records = Vec::new();

    while let Some(code) = fields.next() {
        let status = match code.chars().next() {
            Some(c) => c,
            None => continue,
        };
        if status == 'R' || status == 'C' {
            let (Some(old), Some(new)) = (fields.next(), fields.next()) else {
                break;
            };
            records.push(NameStatus {
                status,
                path: new.to_string(),
                old_path: Some(old.to_string()),
            });
        } else {
            let Some(path) = fields.next() else {
                break;
            };
            records.push(NameStatus {
                status,
                path: path.to_string(),
                old_path: None,
            });
        }
    }

    records
}

fn split_z(raw: &str) -> Vec<String> {
    raw.split('\0')
        .filter(|p| !p.is_empty())
        .map(|p| p.trim_end_matches('\n').to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Reject anything that is not an abbreviated or full hex object id
pub fn validate_sha(sha: &str) -> Result<&str> {
    let sha = sha.trim();
    if sha.is_empty() {
        return Err(EngineError::Validation("commit sha is required".to_string()));
    }
    if !SHA_RE.is_match(sha) {
        return Err(EngineError::Validation(format!("'{}' is not a valid commit sha", sha)));
    }
    Ok(sha)
}

/// Conservative subset of git's ref-name rules
pub fn validate_branch_name(name: &str) -> Result<&str> {
    let name = name.trim();
    let valid = BRANCH_NAME_RE.is_match(name)
        && !name.contains("..")
        && !name.contains("//")
        && !name.ends_with('/')
        && !name.ends_with('.')
        && !name.ends_with(".lock");
    if valid {
        Ok(name)
    } else {
        Err(EngineError::Validation(format!("'{}' is not a valid branch name", name)))
    }
}

pub fn short_sha(sha: &str) -> &str {
    &sha[..sha.len().min(7)]
}

/// Typed helpers over a runner bound to one working tree
#[derive(Clone, Copy)]
pub struct Git<'a> {
    runner: &'a dyn CommandRunner,
    dir: &'a Path,
}

impl<'a> Git<'a> {
    pub fn new(runner: &'a dyn CommandRunner, dir: &'a Path) -> Self {
        Self { runner, dir }
    }

    pub fn dir(&self) -> &Path {
        self.dir
    }

    /// Run and fail on non-zero exit
    pub fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        self.runner.run(self.dir, args, false)
    }

    /// Run and hand back the exit code instead of failing
    pub fn try_run(&self, args: &[&str]) -> Result<CommandOutput> {
        self.runner.run(self.dir, args, true)
    }

    /// Trimmed stdout of a command that must succeed
    pub fn output(&self, args: &[&str]) -> Result<String> {
        Ok(self.run(args)?.trimmed().to_string())
    }

    /// Full sha of `rev` if it names a commit
    pub fn resolve(&self, rev: &str) -> Result<Option<String>> {
        let spec = format!("{}^{{commit}}", rev);
        let out = self.try_run(&["rev-parse", "--verify", "-q", &spec])?;
        Ok(if out.success() && !out.trimmed().is_empty() {
            Some(out.trimmed().to_string())
        } else {
            None
        })
    }

    pub fn head_sha(&self) -> Result<Option<String>> {
        self.resolve("HEAD")
    }

    /// Parents of a commit, in order
    pub fn parents(&self, sha: &str) -> Result<Vec<String>> {
        let line = self.output(&["rev-list", "--parents", "-n", "1", sha])?;
        Ok(line.split_whitespace().skip(1).map(str::to_string).collect())
    }

    /// No tracked modifications, staged or unstaged. Untracked files are
    /// ignored so engine state directories never count as dirt.
    pub fn is_clean(&self) -> Result<bool> {
        let out = self.run(&["status", "--porcelain", "--untracked-files=no"])?;
        Ok(out.trimmed().is_empty())
    }

    /// Checked-out branch name; `None` when HEAD is detached
    pub fn current_branch(&self) -> Result<Option<String>> {
        let out = self.try_run(&["symbolic-ref", "--short", "-q", "HEAD"])?;
        Ok(if out.success() && !out.trimmed().is_empty() {
            Some(out.trimmed().to_string())
        } else {
            None
        })
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{}", name);
        Ok(self.try_run(&["show-ref", "--verify", "--quiet", &refname])?.success())
    }

    /// Paths currently staged in the index
    pub fn staged_paths(&self) -> Result<Vec<String>> {
        let out = self.run(&["diff", "--cached", "--name-only", "-z"])?;
        Ok(split_z(&out.stdout))
    }

    /// Staged name-status records with rename/copy detection
    pub fn staged_name_status(&self) -> Result<Vec<NameStatus>> {
        let out = self.run(&["diff", "--cached", "--name-status", "-M", "-C", "-z"])?;
        Ok(parse_name_status_z(&out.stdout))
    }

    /// Index status letter for one path, if it is staged
    pub fn staged_status_of(&self, path: &str) -> Result<Option<char>> {
        let out = self.run(&["diff", "--cached", "--name-status", "-z", "--", path])?;
        Ok(parse_name_status_z(&out.stdout)
            .into_iter()
            .find(|r| r.path == path)
            .map(|r| r.status))
    }

    /// Paths changed on `head` since it forked from `base`
    pub fn changed_paths(&self, base: &str, head: &str) -> Result<Vec<String>> {
        let range = format!("{}...{}", base, head);
        let out = self.run(&["diff", "--name-only", "-z", &range])?;
        Ok(split_z(&out.stdout))
    }

    /// Blob contents of `path` at `rev`, or `None` if absent there
    pub fn show_file(&self, rev: &str, path: &str) -> Result<Option<String>> {
        let spec = format!("{}:{}", rev, path);
        let out = self.try_run(&["show", &spec])?;
        Ok(if out.success() { Some(out.stdout) } else { None })
    }

    /// Whether `path` exists in the tree of `rev`
    pub fn tree_has_path(&self, rev: &str, path: &str) -> Result<bool> {
        let spec = format!("{}:{}", rev, path);
        Ok(self.try_run(&["cat-file", "-e", &spec])?.success())
    }

    /// `(ahead, behind)` of `head` relative to `base`
    pub fn ahead_behind(&self, base: &str, head: &str) -> Result<(i32, i32)> {
        let range = format!("{}...{}", base, head);
        let line = self.output(&["rev-list", "--left-right", "--count", &range])?;
        let mut counts = line.split_whitespace().map(|n| n.parse::<i32>().unwrap_or(0));
        let behind = counts.next().unwrap_or(0);
        let ahead = counts.next().unwrap_or(0);
        Ok((ahead, behind))
    }

    /// Check out `name`; fails if git refuses (e.g. local changes would be lost)
    pub fn checkout(&self, name: &str) -> Result<()> {
        self.run(&["checkout", "-q", name])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_status_with_rename() {
        let raw = "M\0src/app.js\0R087\0old/name.css\0new/name.css\0A\0docs/x y.md\0";
        let records = parse_name_status_z(raw);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], NameStatus { status: 'M', path: "src/app.js".into(), old_path: None });
        assert_eq!(records[1].status, 'R');
        assert_eq!(records[1].path, "new/name.css");
        assert_eq!(records[1].old_path.as_deref(), Some("old/name.css"));
        assert_eq!(records[2].path, "docs/x y.md");
    }

    #[test]
    fn test_parse_name_status_truncated_input() {
        assert!(parse_name_status_z("").is_empty());
        assert!(parse_name_status_z("R100\0only-old\0").is_empty());
    }

    #[test]
    fn test_validate_sha() {
        assert!(validate_sha("abc1234").is_ok());
        assert!(validate_sha(&"f".repeat(40)).is_ok());
        assert!(validate_sha("").is_err());
        assert!(validate_sha("abc").is_err());
        assert!(validate_sha("HEAD~1").is_err());
        assert!(validate_sha(&"a".repeat(41)).is_err());
    }

    #[test]
    fn test_validate_branch_name() {
        assert!(validate_branch_name("feature/login-form").is_ok());
        assert!(validate_branch_name("fix_1.2").is_ok());
        assert!(validate_branch_name("-rf").is_err());
        assert!(validate_branch_name("a..b").is_err());
        assert!(validate_branch_name("topic/").is_err());
        assert!(validate_branch_name("x.lock").is_err());
        assert!(validate_branch_name("has space").is_err());
    }

    #[test]
    fn test_short_sha() {
        assert_eq!(short_sha("0123456789abcdef"), "0123456");
        assert_eq!(short_sha("abc"), "abc");
    }
}
