//! Configuration file support for workbranch
//!
//! Reads from .workbranch/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,

    /// Trunk and working-branch naming
    #[serde(default)]
    pub branch: BranchConfig,

    /// Changelog, version file and package manifests
    #[serde(default)]
    pub release: ReleaseConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    /// Auto-test scheduling after staging
    #[serde(default)]
    pub tests: TestsConfig,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct ProjectConfig {
    /// Project identifier used as the key in the branch store.
    /// Defaults to the repository directory name.
    #[serde(default)]
    pub id: Option<String>,
}

/// Branch-related configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BranchConfig {
    /// Name of the trunk branch
    /// Default: "main"
    #[serde(default = "default_trunk")]
    pub trunk: String,

    /// Prefix for auto-created working branches
    /// Default: "feature/"
    #[serde(default = "default_auto_prefix")]
    pub auto_prefix: String,
}

fn default_trunk() -> String {
    "main".to_string()
}

fn default_auto_prefix() -> String {
    "feature/".to_string()
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            trunk: default_trunk(),
            auto_prefix: default_auto_prefix(),
        }
    }
}

/// Release files, relative to the project root
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReleaseConfig {
    #[serde(default = "default_changelog_path")]
    pub changelog_path: String,

    #[serde(default = "default_version_path")]
    pub version_path: String,

    /// Package manifests whose top-level `version` follows the version file.
    /// Missing files are skipped.
    #[serde(default = "default_manifests")]
    pub manifests: Vec<String>,
}

fn default_changelog_path() -> String {
    "CHANGELOG.md".to_string()
}

fn default_version_path() -> String {
    "VERSION".to_string()
}

fn default_manifests() -> Vec<String> {
    vec![
        "package.json".to_string(),
        "frontend/package.json".to_string(),
        "backend/package.json".to_string(),
    ]
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            changelog_path: default_changelog_path(),
            version_path: default_version_path(),
            manifests: default_manifests(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MergeConfig {
    /// File extensions whose changes may skip the test gate.
    /// Default: [".css"]
    #[serde(default = "default_bypass_extensions")]
    pub bypass_extensions: Vec<String>,
}

fn default_bypass_extensions() -> Vec<String> {
    vec![".css".to_string()]
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            bypass_extensions: default_bypass_extensions(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TestsConfig {
    /// Request a test run after each stage
    /// Default: true
    #[serde(default = "default_true")]
    pub auto_run: bool,

    /// Delay before the requested run fires; restaging restarts it
    /// Default: 5000
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_delay_ms() -> u64 {
    5000
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            auto_run: true,
            delay_ms: default_delay_ms(),
        }
    }
}

impl Config {
    /// Load config from .workbranch/config.toml, walking up from the
    /// current directory. Returns default config if none is found.
    pub fn load() -> Self {
        std::env::current_dir()
            .ok()
            .and_then(|dir| Self::find_config_path(&dir))
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load a specific config file. Unreadable or invalid files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Find config.toml by walking up directory tree
    fn find_config_path(start: &Path) -> Option<PathBuf> {
        let mut dir = start;

        loop {
            let config_path = dir.join(".workbranch").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }

    /// True when `path` has one of the bypass extensions (case-insensitive)
    pub fn is_bypass_path(&self, path: &str) -> bool {
        let lower = path.to_ascii_lowercase();
        self.merge
            .bypass_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
    }

    /// Project id for a repository root: configured id or the directory name
    pub fn project_id_for(&self, root: &Path) -> String {
        self.project.id.clone().unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "default".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.branch.trunk, "main");
        assert_eq!(config.release.changelog_path, "CHANGELOG.md");
        assert_eq!(config.release.version_path, "VERSION");
        assert!(config.tests.auto_run);
        assert!(config.is_bypass_path("web/styles.css"));
        assert!(config.is_bypass_path("THEME.CSS"));
        assert!(!config.is_bypass_path("src/app.js"));
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[project]
id = "shop"

[branch]
trunk = "trunk"

[merge]
bypass_extensions = [".css", ".scss"]

[tests]
delay_ms = 250
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.branch.trunk, "trunk");
        assert_eq!(config.branch.auto_prefix, "feature/");
        assert!(config.is_bypass_path("a.scss"));
        assert_eq!(config.tests.delay_ms, 250);
        assert!(config.tests.auto_run);
        assert_eq!(config.project_id_for(Path::new("/tmp/whatever")), "shop");
    }

    #[test]
    fn test_project_id_defaults_to_dir_name() {
        let config = Config::default();
        assert_eq!(config.project_id_for(Path::new("/srv/repos/storefront")), "storefront");
    }

    #[test]
    fn test_load_from_invalid_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[branch\ntrunk = ").unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.branch.trunk, "main");
    }
}
