//! SQLite database with Diesel ORM
//!
//! Branch Record Store: one row per (project, branch), the test runs recorded
//! against each branch, and the agent goals tied to them.
//! Tables are created on open; there is no separate migration step.

use crate::schema::*;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Walk up directory tree to find .workbranch folder (like git finds .git)
/// Can be overridden with WORKBRANCH_DB_PATH env var
fn get_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("WORKBRANCH_DB_PATH") {
        return PathBuf::from(path);
    }

    if let Ok(current_dir) = std::env::current_dir() {
        let mut dir = current_dir.as_path();
        loop {
            let state_dir = dir.join(".workbranch");
            if state_dir.is_dir() {
                return state_dir.join("workbranch.db");
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    // Nothing found - `workbranch init` creates it here
    PathBuf::from(".workbranch/workbranch.db")
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Current schema version for the branch store
pub const CURRENT_SCHEMA: StoreSchema = StoreSchema {
    major: 1,
    minor: 1,
    patch: 0,
    name: "branch-workflow",
    features: &["branches", "staged_file_snapshots", "test_runs", "agent_goals"],
};

/// Describes the version and capabilities of the schema
#[derive(Debug, Clone)]
pub struct StoreSchema {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub name: &'static str,
    pub features: &'static [&'static str],
}

impl StoreSchema {
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::fmt::Display for StoreSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} ({})", self.version_string(), self.name)
    }
}

// ============================================================================
// Domain enums (stored as TEXT)
// ============================================================================

/// `main` is the trunk; everything else is a working branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchType {
    Main,
    Feature,
}

impl BranchType {
    pub fn as_str(self) -> &'static str {
        match self {
            BranchType::Main => "main",
            BranchType::Feature => "feature",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "main" => Some(BranchType::Main),
            "feature" => Some(BranchType::Feature),
            _ => None,
        }
    }
}

/// Lifecycle status of a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchStatus {
    Active,
    ReadyForMerge,
    NeedsFix,
    Merged,
}

impl BranchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BranchStatus::Active => "active",
            BranchStatus::ReadyForMerge => "ready-for-merge",
            BranchStatus::NeedsFix => "needs-fix",
            BranchStatus::Merged => "merged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BranchStatus::Active),
            "ready-for-merge" => Some(BranchStatus::ReadyForMerge),
            "needs-fix" => Some(BranchStatus::NeedsFix),
            "merged" => Some(BranchStatus::Merged),
            _ => None,
        }
    }

    /// Allowed status edges. `merged` is terminal.
    pub fn can_transition_to(self, next: BranchStatus) -> bool {
        use BranchStatus::*;
        match self {
            Merged => false,
            Active | NeedsFix | ReadyForMerge => matches!(next, Active | ReadyForMerge | NeedsFix | Merged),
        }
    }
}

impl std::fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for a path to be staged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagedSource {
    Editor,
    Ai,
}

impl StagedSource {
    pub fn as_str(self) -> &'static str {
        match self {
            StagedSource::Editor => "editor",
            StagedSource::Ai => "ai",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "editor" => Some(StagedSource::Editor),
            "ai" => Some(StagedSource::Ai),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Pending,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "passed" => Some(TestStatus::Passed),
            "failed" => Some(TestStatus::Failed),
            "pending" => Some(TestStatus::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalStatus {
    Pending,
    InProgress,
    Completed,
    Merged,
}

impl GoalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GoalStatus::Pending => "pending",
            GoalStatus::InProgress => "in-progress",
            GoalStatus::Completed => "completed",
            GoalStatus::Merged => "merged",
        }
    }
}

/// One path in a branch's staged-file snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFileEntry {
    pub path: String,
    pub source: StagedSource,
    pub timestamp: Option<String>,
}

impl StagedFileEntry {
    pub fn new(path: impl Into<String>, source: StagedSource) -> Self {
        Self {
            path: path.into(),
            source,
            timestamp: Some(now()),
        }
    }

    /// Entry discovered in the index rather than staged through the engine
    pub fn discovered(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: StagedSource::Editor,
            timestamp: None,
        }
    }
}

fn encode_staged(entries: &[StagedFileEntry]) -> String {
    serde_json::to_string(entries).unwrap_or_else(|_| "[]".to_string())
}

// ============================================================================
// Diesel Models
// ============================================================================

#[derive(Insertable)]
#[diesel(table_name = schema_versions)]
struct NewSchemaVersion<'a> {
    version: &'a str,
    name: &'a str,
    features: &'a str,
    introduced_at: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = branches)]
struct NewBranch<'a> {
    project_id: &'a str,
    name: &'a str,
    branch_type: &'a str,
    status: &'a str,
    staged_files: &'a str,
    ahead_commits: i32,
    behind_commits: i32,
    last_test_run_id: Option<i32>,
    is_current: bool,
    created_at: &'a str,
    updated_at: &'a str,
}

/// Queryable branch row
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = branches)]
pub struct Branch {
    pub id: i32,
    pub project_id: String,
    pub name: String,
    pub branch_type: String,
    pub status: String,
    pub staged_files: String,
    pub ahead_commits: i32,
    pub behind_commits: i32,
    pub last_test_run_id: Option<i32>,
    pub is_current: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Branch {
    /// Unknown values are treated as a working branch
    pub fn kind(&self) -> BranchType {
        BranchType::parse(&self.branch_type).unwrap_or(BranchType::Feature)
    }

    pub fn is_trunk(&self) -> bool {
        self.kind() == BranchType::Main
    }

    /// Unknown values are treated as `active`
    pub fn status(&self) -> BranchStatus {
        BranchStatus::parse(&self.status).unwrap_or(BranchStatus::Active)
    }

    /// Decoded snapshot; a corrupt column reads as empty
    pub fn staged_entries(&self) -> Vec<StagedFileEntry> {
        match serde_json::from_str(&self.staged_files) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(branch = %self.name, error = %e, "unreadable staged_files snapshot");
                Vec::new()
            }
        }
    }
}

/// Partial update of a branch row; `None` fields are left untouched
#[derive(AsChangeset, Default, Debug, Clone)]
#[diesel(table_name = branches)]
pub struct BranchChanges {
    status: Option<String>,
    staged_files: Option<String>,
    ahead_commits: Option<i32>,
    behind_commits: Option<i32>,
    last_test_run_id: Option<Option<i32>>,
    is_current: Option<bool>,
    updated_at: Option<String>,
}

impl BranchChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: BranchStatus) -> Self {
        self.status = Some(status.as_str().to_string());
        self
    }

    pub fn staged(mut self, entries: &[StagedFileEntry]) -> Self {
        self.staged_files = Some(encode_staged(entries));
        self
    }

    pub fn counters(mut self, ahead: i32, behind: i32) -> Self {
        self.ahead_commits = Some(ahead);
        self.behind_commits = Some(behind);
        self
    }

    pub fn last_test_run(mut self, id: Option<i32>) -> Self {
        self.last_test_run_id = Some(id);
        self
    }

    pub fn current(mut self, is_current: bool) -> Self {
        self.is_current = Some(is_current);
        self
    }
}

#[derive(Insertable)]
#[diesel(table_name = test_runs)]
struct NewTestRun<'a> {
    project_id: &'a str,
    branch_id: i32,
    status: &'a str,
    summary: Option<&'a str>,
    created_at: &'a str,
}

/// Queryable test run
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = test_runs)]
pub struct TestRun {
    pub id: i32,
    pub project_id: String,
    pub branch_id: i32,
    pub status: String,
    pub summary: Option<String>,
    pub created_at: String,
}

impl TestRun {
    pub fn passed(&self) -> bool {
        TestStatus::parse(&self.status) == Some(TestStatus::Passed)
    }
}

#[derive(Insertable)]
#[diesel(table_name = agent_goals)]
struct NewAgentGoal<'a> {
    project_id: &'a str,
    branch_id: i32,
    description: &'a str,
    status: &'a str,
    created_at: &'a str,
    updated_at: &'a str,
}

/// Queryable agent goal
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = agent_goals)]
pub struct AgentGoal {
    pub id: i32,
    pub project_id: String,
    pub branch_id: i32,
    pub description: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Database connection wrapper with connection pool
pub struct Database {
    pool: DbPool,
}

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("{0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

fn last_insert_id(conn: &mut SqliteConnection) -> Result<i32> {
    let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
        .first(conn)?;
    Ok(id)
}

impl Database {
    /// Get the database path that will be used
    pub fn db_path() -> PathBuf {
        get_db_path()
    }

    /// Create a new database at a custom path
    pub fn new(path: &str) -> Result<Self> {
        Self::open_at(path)
    }

    /// Open database at default path (respects WORKBRANCH_DB_PATH env var)
    pub fn open() -> Result<Self> {
        let path = get_db_path();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::Connection(format!("cannot create {}: {}", parent.display(), e)))?;
            }
        }
        Self::open_at(&path)
    }

    /// Open database at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(5)
            .build(manager)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.init_schema()?;
        tracing::debug!(path = %path_str, schema = %CURRENT_SCHEMA, "branch store opened");
        Ok(db)
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| DbError::Connection(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS schema_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                version TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                features TEXT NOT NULL,
                introduced_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS branches (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                project_id TEXT NOT NULL,
                name TEXT NOT NULL,
                branch_type TEXT NOT NULL DEFAULT 'feature',
                status TEXT NOT NULL DEFAULT 'active',
                staged_files TEXT NOT NULL DEFAULT '[]',
                ahead_commits INTEGER NOT NULL DEFAULT 0,
                behind_commits INTEGER NOT NULL DEFAULT 0,
                last_test_run_id INTEGER,
                is_current BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(project_id, name)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS test_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                project_id TEXT NOT NULL,
                branch_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                summary TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (branch_id) REFERENCES branches(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS agent_goals (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                project_id TEXT NOT NULL,
                branch_id INTEGER NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (branch_id) REFERENCES branches(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_branches_project ON branches(project_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_test_runs_branch ON test_runs(branch_id, created_at)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_goals_branch ON agent_goals(branch_id)").execute(&mut conn)?;

        self.register_schema(&CURRENT_SCHEMA)?;
        Ok(())
    }

    fn register_schema(&self, schema: &StoreSchema) -> Result<()> {
        let mut conn = self.get_conn()?;
        let now = now();
        let features_json = serde_json::to_string(&schema.features).unwrap_or_default();

        let new_schema = NewSchemaVersion {
            version: &schema.version_string(),
            name: schema.name,
            features: &features_json,
            introduced_at: &now,
        };

        diesel::insert_or_ignore_into(schema_versions::table)
            .values(&new_schema)
            .execute(&mut conn)?;

        Ok(())
    }

    // ========================================================================
    // Branch Operations
    // ========================================================================

    /// Insert a branch row. At most one `main` row may exist per project.
    pub fn insert_branch(&self, project_id: &str, name: &str, branch_type: BranchType) -> Result<Branch> {
        let mut pooled = self.get_conn()?;
        let conn: &mut SqliteConnection = &mut pooled;

        if self.get_branch(project_id, name)?.is_some() {
            return Err(DbError::Validation(format!("Branch '{}' already exists", name)));
        }
        if branch_type == BranchType::Main {
            if let Some(trunk) = self.main_branch(project_id)? {
                return Err(DbError::Validation(format!(
                    "Project '{}' already has a trunk branch '{}'",
                    project_id, trunk.name
                )));
            }
        }

        let now = now();
        let new_branch = NewBranch {
            project_id,
            name,
            branch_type: branch_type.as_str(),
            status: BranchStatus::Active.as_str(),
            staged_files: "[]",
            ahead_commits: 0,
            behind_commits: 0,
            last_test_run_id: None,
            is_current: false,
            created_at: &now,
            updated_at: &now,
        };

        let id = conn.transaction::<_, DbError, _>(|conn| {
            diesel::insert_into(branches::table)
                .values(&new_branch)
                .execute(conn)?;
            last_insert_id(conn)
        })?;

        self.require_branch(id)
    }

    pub fn get_branch(&self, project_id: &str, name: &str) -> Result<Option<Branch>> {
        let mut conn = self.get_conn()?;
        let branch = branches::table
            .filter(branches::project_id.eq(project_id))
            .filter(branches::name.eq(name))
            .first::<Branch>(&mut conn)
            .optional()?;
        Ok(branch)
    }

    pub fn get_branch_by_id(&self, id: i32) -> Result<Option<Branch>> {
        let mut conn = self.get_conn()?;
        let branch = branches::table
            .filter(branches::id.eq(id))
            .first::<Branch>(&mut conn)
            .optional()?;
        Ok(branch)
    }

    fn require_branch(&self, id: i32) -> Result<Branch> {
        self.get_branch_by_id(id)?
            .ok_or_else(|| DbError::Validation(format!("Branch #{} does not exist", id)))
    }

    /// The project's trunk row, if initialized
    pub fn main_branch(&self, project_id: &str) -> Result<Option<Branch>> {
        let mut conn = self.get_conn()?;
        let branch = branches::table
            .filter(branches::project_id.eq(project_id))
            .filter(branches::branch_type.eq(BranchType::Main.as_str()))
            .first::<Branch>(&mut conn)
            .optional()?;
        Ok(branch)
    }

    /// All rows for a project, merged ones included
    pub fn list_branches(&self, project_id: &str) -> Result<Vec<Branch>> {
        let mut conn = self.get_conn()?;
        let rows = branches::table
            .filter(branches::project_id.eq(project_id))
            .order((branches::created_at.asc(), branches::id.asc()))
            .load::<Branch>(&mut conn)?;
        Ok(rows)
    }

    /// Rows that are not in the terminal `merged` state
    pub fn list_active_branches(&self, project_id: &str) -> Result<Vec<Branch>> {
        let mut conn = self.get_conn()?;
        let rows = branches::table
            .filter(branches::project_id.eq(project_id))
            .filter(branches::status.ne(BranchStatus::Merged.as_str()))
            .order((branches::created_at.asc(), branches::id.asc()))
            .load::<Branch>(&mut conn)?;
        Ok(rows)
    }

    pub fn current_branch(&self, project_id: &str) -> Result<Option<Branch>> {
        let mut conn = self.get_conn()?;
        let branch = branches::table
            .filter(branches::project_id.eq(project_id))
            .filter(branches::is_current.eq(true))
            .first::<Branch>(&mut conn)
            .optional()?;
        Ok(branch)
    }

    /// Make `branch_id` the only current row of its project
    pub fn set_current_branch(&self, project_id: &str, branch_id: i32) -> Result<Branch> {
        let mut pooled = self.get_conn()?;
        let conn: &mut SqliteConnection = &mut pooled;
        let now = now();

        conn.transaction::<_, DbError, _>(|conn| {
            diesel::update(branches::table.filter(branches::project_id.eq(project_id)))
                .set(branches::is_current.eq(false))
                .execute(conn)?;
            diesel::update(branches::table.filter(branches::id.eq(branch_id)))
                .set((branches::is_current.eq(true), branches::updated_at.eq(&now)))
                .execute(conn)?;
            Ok(())
        })?;

        self.require_branch(branch_id)
    }

    /// Apply a partial update and return the fresh row
    pub fn update_branch(&self, branch_id: i32, changes: BranchChanges) -> Result<Branch> {
        let mut conn = self.get_conn()?;
        let changes = BranchChanges {
            updated_at: Some(now()),
            ..changes
        };

        diesel::update(branches::table.filter(branches::id.eq(branch_id)))
            .set(&changes)
            .execute(&mut conn)?;

        self.require_branch(branch_id)
    }

    /// Terminal merge bookkeeping in one transaction: the branch becomes
    /// `merged` with empty counters and snapshot, its in-flight goals are
    /// cascaded, and the trunk becomes current. Returns the number of goals
    /// cascaded.
    pub fn mark_merged(&self, branch_id: i32, trunk_id: i32) -> Result<usize> {
        let branch = self.require_branch(branch_id)?;
        let mut pooled = self.get_conn()?;
        let conn: &mut SqliteConnection = &mut pooled;
        let now = now();

        conn.transaction::<_, DbError, _>(|conn| {
            diesel::update(branches::table.filter(branches::id.eq(branch_id)))
                .set((
                    branches::status.eq(BranchStatus::Merged.as_str()),
                    branches::staged_files.eq("[]"),
                    branches::ahead_commits.eq(0),
                    branches::behind_commits.eq(0),
                    branches::is_current.eq(false),
                    branches::updated_at.eq(&now),
                ))
                .execute(conn)?;

            let cascaded = diesel::update(
                agent_goals::table
                    .filter(agent_goals::branch_id.eq(branch_id))
                    .filter(agent_goals::status.eq_any(vec![
                        GoalStatus::Pending.as_str(),
                        GoalStatus::InProgress.as_str(),
                    ])),
            )
            .set((
                agent_goals::status.eq(GoalStatus::Merged.as_str()),
                agent_goals::updated_at.eq(&now),
            ))
            .execute(conn)?;

            diesel::update(branches::table.filter(branches::project_id.eq(&branch.project_id)))
                .set(branches::is_current.eq(false))
                .execute(conn)?;
            diesel::update(branches::table.filter(branches::id.eq(trunk_id)))
                .set((branches::is_current.eq(true), branches::updated_at.eq(&now)))
                .execute(conn)?;

            Ok(cascaded)
        })
    }

    /// Remove a branch row together with its test runs and goals
    pub fn delete_branch(&self, branch_id: i32) -> Result<()> {
        let mut pooled = self.get_conn()?;
        let conn: &mut SqliteConnection = &mut pooled;

        conn.transaction::<_, DbError, _>(|conn| {
            diesel::delete(test_runs::table.filter(test_runs::branch_id.eq(branch_id))).execute(conn)?;
            diesel::delete(agent_goals::table.filter(agent_goals::branch_id.eq(branch_id))).execute(conn)?;
            diesel::delete(branches::table.filter(branches::id.eq(branch_id))).execute(conn)?;
            Ok(())
        })
    }

    // ========================================================================
    // Test Run Operations
    // ========================================================================

    pub fn insert_test_run(
        &self,
        project_id: &str,
        branch_id: i32,
        status: TestStatus,
        summary: Option<&str>,
    ) -> Result<TestRun> {
        let mut pooled = self.get_conn()?;
        let conn: &mut SqliteConnection = &mut pooled;
        let now = now();

        let new_run = NewTestRun {
            project_id,
            branch_id,
            status: status.as_str(),
            summary,
            created_at: &now,
        };

        let id = conn.transaction::<_, DbError, _>(|conn| {
            diesel::insert_into(test_runs::table)
                .values(&new_run)
                .execute(conn)?;
            last_insert_id(conn)
        })?;

        let run = test_runs::table
            .filter(test_runs::id.eq(id))
            .first::<TestRun>(conn)?;
        Ok(run)
    }

    /// Most recent run by `created_at`, tie-broken by `id`
    pub fn latest_test_run(&self, branch_id: i32) -> Result<Option<TestRun>> {
        let mut conn = self.get_conn()?;
        let run = test_runs::table
            .filter(test_runs::branch_id.eq(branch_id))
            .order((test_runs::created_at.desc(), test_runs::id.desc()))
            .first::<TestRun>(&mut conn)
            .optional()?;
        Ok(run)
    }

    // ========================================================================
    // Agent Goal Operations
    // ========================================================================

    pub fn insert_goal(&self, project_id: &str, branch_id: i32, description: &str) -> Result<AgentGoal> {
        let mut pooled = self.get_conn()?;
        let conn: &mut SqliteConnection = &mut pooled;
        let now = now();

        let new_goal = NewAgentGoal {
            project_id,
            branch_id,
            description,
            status: GoalStatus::InProgress.as_str(),
            created_at: &now,
            updated_at: &now,
        };

        let id = conn.transaction::<_, DbError, _>(|conn| {
            diesel::insert_into(agent_goals::table)
                .values(&new_goal)
                .execute(conn)?;
            last_insert_id(conn)
        })?;

        let goal = agent_goals::table
            .filter(agent_goals::id.eq(id))
            .first::<AgentGoal>(conn)?;
        Ok(goal)
    }

    pub fn list_goals(&self, branch_id: i32) -> Result<Vec<AgentGoal>> {
        let mut conn = self.get_conn()?;
        let goals = agent_goals::table
            .filter(agent_goals::branch_id.eq(branch_id))
            .order(agent_goals::id.asc())
            .load::<AgentGoal>(&mut conn)?;
        Ok(goals)
    }
}
