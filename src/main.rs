use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use workbranch::{
    bump_version_and_roll_changelog, ensure_changelog_unreleased_entry, Config, Database, EngineError, Engine, Project,
    StagedSource, TestStatus,
};

#[derive(Parser, Debug)]
#[command(name = "workbranch")]
#[command(author, version, about = "Test-gated working branches over a shared git trunk")]
struct Cli {
    /// Repository root (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register the repository and its trunk branch
    Init,

    /// Unmerged branches with their staged files and latest test run
    Status,

    /// Create, switch or delete working branches
    Branch {
        #[command(subcommand)]
        action: BranchAction,
    },

    /// Stage a file onto the active working branch
    Stage {
        path: String,

        #[arg(long, value_enum, default_value = "editor")]
        source: SourceArg,
    },

    /// Unstage and discard staged changes (one path or all)
    Clear {
        branch: String,

        #[arg(long)]
        path: Option<String>,
    },

    /// Commit everything staged on a working branch
    Commit {
        branch: String,

        #[arg(short, long)]
        message: String,
    },

    /// Recent commits on HEAD
    Log {
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },

    /// Metadata and changed files of one commit
    Show { sha: String },

    /// Before/after contents of a file in one commit
    FileDiff { sha: String, path: String },

    /// Revert a commit on the current branch
    Revert { sha: String },

    /// Fold HEAD into its parent
    Squash {
        older: String,
        newer: String,

        #[arg(short, long)]
        message: Option<String>,
    },

    /// Record a test result for a branch
    TestResult {
        branch: String,

        #[arg(value_enum)]
        status: TestStatusArg,

        #[arg(long)]
        summary: Option<String>,
    },

    /// Attach an agent goal to a branch
    Goal { branch: String, description: String },

    /// Merge a branch into the trunk
    Merge { branch: String },

    /// Reset a working branch to the trunk
    Reset { branch: String },

    /// Export or apply unified diffs
    Patch {
        #[command(subcommand)]
        action: PatchAction,
    },

    /// Edit the changelog
    Changelog {
        #[command(subcommand)]
        action: ChangelogAction,
    },

    /// Edit the version file
    Version {
        #[command(subcommand)]
        action: VersionAction,
    },

    /// Print a shell completion script
    Completion {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
enum BranchAction {
    Create { name: String },
    Switch { name: String },
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
enum PatchAction {
    /// Print `git diff trunk...branch`
    Export { branch: String },
    /// Apply a patch read from a file or stdin
    Apply {
        branch: String,

        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ChangelogAction {
    /// Add a bullet under `## Unreleased`
    Add { entry: String },
}

#[derive(Subcommand, Debug)]
enum VersionAction {
    /// Advance the patch version and roll the changelog
    Bump,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    Editor,
    Ai,
}

impl From<SourceArg> for StagedSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Editor => StagedSource::Editor,
            SourceArg::Ai => StagedSource::Ai,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TestStatusArg {
    Passed,
    Failed,
    Pending,
}

impl From<TestStatusArg> for TestStatus {
    fn from(arg: TestStatusArg) -> Self {
        match arg {
            TestStatusArg::Passed => TestStatus::Passed,
            TestStatusArg::Failed => TestStatus::Failed,
            TestStatusArg::Pending => TestStatus::Pending,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Operation(format!("cannot serialize result: {}", e)))
}

/// `WORKBRANCH_DB_PATH`, else `<root>/.workbranch/workbranch.db` when a root
/// is given, else the nearest `.workbranch` above the current directory
fn open_database(explicit_root: Option<&Path>, root: &Path) -> Result<Database, EngineError> {
    if std::env::var_os("WORKBRANCH_DB_PATH").is_some() || explicit_root.is_none() {
        return Ok(Database::open()?);
    }
    let state_dir = root.join(".workbranch");
    std::fs::create_dir_all(&state_dir)?;
    Ok(Database::open_at(state_dir.join("workbranch.db"))?)
}

fn run(cli: Cli) -> Result<serde_json::Value, EngineError> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };
    let config = match &cli.root {
        Some(root) => Config::load_from(&root.join(".workbranch").join("config.toml")),
        None => Config::load(),
    };
    let project = Project::from_root(&root, &config);

    // File-only commands need neither git nor the store
    match &cli.command {
        Command::Changelog {
            action: ChangelogAction::Add { entry },
        } => {
            let path = root.join(&config.release.changelog_path);
            return to_json(&ensure_changelog_unreleased_entry(&path, entry)?);
        }
        Command::Version {
            action: VersionAction::Bump,
        } => return to_json(&bump_version_and_roll_changelog(&root, &config.release)?),
        _ => {}
    }

    let db = open_database(cli.root.as_deref(), &root)?;
    let engine = Engine::new(db, config);

    match cli.command {
        Command::Init => to_json(&engine.init_project(&project)?),
        Command::Status => to_json(&engine.branch_overview(&project)?),
        Command::Branch { action } => match action {
            BranchAction::Create { name } => to_json(&engine.create_branch(&project, &name)?),
            BranchAction::Switch { name } => to_json(&engine.switch_branch(&project, &name)?),
            BranchAction::Delete { name } => {
                engine.delete_branch(&project, &name)?;
                Ok(serde_json::json!({ "deleted": name }))
            }
        },
        Command::Stage { path, source } => to_json(&engine.stage_workspace_change(&project, &path, source.into())?),
        Command::Clear { branch, path } => to_json(&engine.clear_staged_changes(&project, &branch, path.as_deref())?),
        Command::Commit { branch, message } => to_json(&engine.commit_staged_changes(&project, &branch, &message)?),
        Command::Log { limit } => to_json(&engine.get_commit_history(&project, limit)),
        Command::Show { sha } => to_json(&engine.get_commit_details(&project, &sha)?),
        Command::FileDiff { sha, path } => to_json(&engine.get_commit_file_diff_content(&project, &sha, &path)?),
        Command::Revert { sha } => to_json(&engine.revert_commit(&project, &sha)?),
        Command::Squash { older, newer, message } => {
            to_json(&engine.squash_commits(&project, &older, &newer, message.as_deref())?)
        }
        Command::TestResult { branch, status, summary } => {
            to_json(&engine.record_test_result(&project, &branch, status.into(), summary.as_deref())?)
        }
        Command::Goal { branch, description } => to_json(&engine.add_goal(&project, &branch, &description)?),
        Command::Merge { branch } => to_json(&engine.merge_branch(&project, &branch)?),
        Command::Reset { branch } => to_json(&engine.reset_branch(&project, &branch)?),
        Command::Patch { action } => match action {
            PatchAction::Export { branch } => {
                let patch = engine.export_patch(&project, &branch)?;
                Ok(serde_json::json!({ "branch": branch, "patch": patch }))
            }
            PatchAction::Apply { branch, file } => {
                let patch = match file {
                    Some(file) => std::fs::read_to_string(file)?,
                    None => {
                        let mut buf = String::new();
                        io::stdin().read_to_string(&mut buf)?;
                        buf
                    }
                };
                to_json(&engine.apply_patch(&project, &branch, &patch)?)
            }
        },
        // Handled before the engine is built
        Command::Changelog { .. } | Command::Version { .. } | Command::Completion { .. } => Ok(serde_json::Value::Null),
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "workbranch=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    if let Command::Completion { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "workbranch", &mut io::stdout());
        return;
    }

    match run(cli) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("{} {}", "Error:".red().bold(), e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("{} {} ({})", "Error:".red().bold(), e, e.status_code());
            std::process::exit(1);
        }
    }
}
