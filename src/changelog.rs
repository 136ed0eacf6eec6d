//! Changelog and version bump engine
//!
//! CHANGELOG.md keeps an `## Unreleased` section of bullets. When the VERSION
//! file advances, those bullets are rolled into a dated heading for the new
//! version. Every rewrite keeps the document's line-ending style (CRLF or LF)
//! and whether it ended with a newline.

use crate::config::ReleaseConfig;
use crate::error::{EngineError, Result};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Version assumed when the version file is missing, empty or invalid
pub const DEFAULT_VERSION: &str = "0.1.0";

/// Longest normalized changelog entry, ellipsis included
pub const MAX_ENTRY_CHARS: usize = 140;

lazy_static! {
    static ref SEMVER_RE: Regex =
        Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?$").unwrap();
    static ref UNRELEASED_RE: Regex = Regex::new(r"(?i)^##\s+Unreleased\s*$").unwrap();
    static ref H2_RE: Regex = Regex::new(r"^##(\s|$)").unwrap();
    static ref BULLET_RE: Regex = Regex::new(r"^[-*]\s+(\S.*)$").unwrap();
    static ref TITLE_RE: Regex = Regex::new(r"^#\s+\S").unwrap();
    static ref BULLET_PREFIX_RE: Regex = Regex::new(r"^(?:[-*]\s+)+").unwrap();
}

// ============================================================================
// Semver
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Semver {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl std::fmt::Display for Semver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Strict `major.minor.patch`; a pre-release or build suffix is accepted and ignored
pub fn parse_semver(input: &str) -> Option<Semver> {
    let caps = SEMVER_RE.captures(input.trim())?;
    Some(Semver {
        major: caps[1].parse().ok()?,
        minor: caps[2].parse().ok()?,
        patch: caps[3].parse().ok()?,
    })
}

pub fn increment_patch(input: &str) -> Option<String> {
    let v = parse_semver(input)?;
    Some(
        Semver {
            patch: v.patch + 1,
            ..v
        }
        .to_string(),
    )
}

// ============================================================================
// Line handling
// ============================================================================

/// A document split into lines, remembering how to put it back together
struct Document {
    lines: Vec<String>,
    eol: &'static str,
    trailing_newline: bool,
}

fn detect_eol(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

impl Document {
    fn parse(text: &str) -> Self {
        let eol = detect_eol(text);
        let trailing_newline = text.ends_with('\n');
        let body = text.strip_suffix('\n').unwrap_or(text);
        let body = body.strip_suffix('\r').unwrap_or(body);
        let lines = if text.is_empty() {
            Vec::new()
        } else {
            body.split('\n')
                .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
                .collect()
        };
        Self {
            lines,
            eol,
            trailing_newline,
        }
    }

    fn render(&self) -> String {
        let mut out = self.lines.join(self.eol);
        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(self.eol);
        }
        out
    }

    /// `(heading index, end of section)`; end is the next `##` heading or EOF
    fn unreleased_bounds(&self) -> Option<(usize, usize)> {
        let start = self.lines.iter().position(|l| UNRELEASED_RE.is_match(l))?;
        let end = self.lines[start + 1..]
            .iter()
            .position(|l| H2_RE.is_match(l))
            .map(|offset| start + 1 + offset)
            .unwrap_or(self.lines.len());
        Some((start, end))
    }
}

fn is_bullet(line: &str) -> bool {
    BULLET_RE.is_match(line)
}

fn bullet_text(line: &str) -> Option<&str> {
    BULLET_RE.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str().trim_end())
}

// ============================================================================
// Unreleased section
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnreleasedSection {
    pub has_heading: bool,
    /// Bullet lines as written, marker included
    pub entries: Vec<String>,
}

pub fn extract_unreleased_entries(text: &str) -> UnreleasedSection {
    let doc = Document::parse(text);
    match doc.unreleased_bounds() {
        Some((start, end)) => UnreleasedSection {
            has_heading: true,
            entries: doc.lines[start + 1..end]
                .iter()
                .filter(|l| is_bullet(l))
                .map(|l| l.trim_end().to_string())
                .collect(),
        },
        None => UnreleasedSection {
            has_heading: false,
            entries: Vec::new(),
        },
    }
}

/// Move the Unreleased section body under a new `## {version} ({today})` heading
pub fn roll_changelog_to_version(text: &str, version: &str) -> String {
    roll_changelog_to_version_on(text, version, chrono::Local::now().date_naive())
}

/// [`roll_changelog_to_version`] with an explicit release date.
/// Returns `text` unchanged when there is no heading or no entries.
pub fn roll_changelog_to_version_on(text: &str, version: &str, date: NaiveDate) -> String {
    let doc = Document::parse(text);
    let Some((start, end)) = doc.unreleased_bounds() else {
        return text.to_string();
    };

    let section = &doc.lines[start + 1..end];
    if !section.iter().any(|l| is_bullet(l)) {
        return text.to_string();
    }

    // Subheadings and continuation lines move with the bullets
    let first = section.iter().position(|l| !l.trim().is_empty()).unwrap_or(0);
    let last = section.iter().rposition(|l| !l.trim().is_empty()).map_or(0, |i| i + 1);
    let body = section[first..last].iter().map(|l| l.trim_end().to_string());

    let mut lines: Vec<String> = doc.lines[..=start].to_vec();
    lines.push(String::new());
    lines.push(format!("## {} ({})", version, date.format("%Y-%m-%d")));
    lines.extend(body);
    if end < doc.lines.len() {
        lines.push(String::new());
        lines.extend_from_slice(&doc.lines[end..]);
    }

    Document { lines, ..doc }.render()
}

/// Single line, bullet marker stripped, at most [`MAX_ENTRY_CHARS`] characters
pub fn normalize_entry(text: &str) -> Option<String> {
    let single = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let stripped = BULLET_PREFIX_RE.replace(&single, "").trim().to_string();
    if stripped.is_empty() {
        return None;
    }
    if stripped.chars().count() <= MAX_ENTRY_CHARS {
        return Some(stripped);
    }
    let cut: String = stripped.chars().take(MAX_ENTRY_CHARS - 1).collect();
    Some(format!("{}…", cut.trim_end()))
}

fn skeleton(bullet: &str, eol: &str) -> String {
    ["# Changelog", "", "## Unreleased", "", bullet, ""].join(eol)
}

/// Insert `- {entry}` under Unreleased. `entry` must already be normalized.
/// Returns `None` when the bullet is already present.
pub fn insert_unreleased_entry(text: &str, entry: &str) -> Option<String> {
    let mut doc = Document::parse(text);
    let bullet = format!("- {}", entry);

    if doc.lines.iter().all(|l| l.trim().is_empty()) {
        return Some(skeleton(&bullet, doc.eol));
    }

    match doc.unreleased_bounds() {
        Some((start, end)) => {
            if doc.lines[start + 1..end]
                .iter()
                .filter_map(|l| bullet_text(l))
                .any(|existing| existing == entry)
            {
                return None;
            }

            let last_bullet = (start + 1..end).rev().find(|&i| is_bullet(&doc.lines[i]));
            match last_bullet {
                Some(i) => doc.lines.insert(i + 1, bullet),
                None => {
                    doc.lines.splice(start + 1..start + 1, [String::new(), bullet]);
                    let after = start + 3;
                    if after < doc.lines.len() && !doc.lines[after].trim().is_empty() {
                        doc.lines.insert(after, String::new());
                    }
                }
            }
        }
        None => match doc.lines.iter().position(|l| TITLE_RE.is_match(l)) {
            Some(title) => {
                let block = [String::new(), "## Unreleased".to_string(), String::new(), bullet];
                doc.lines.splice(title + 1..title + 1, block);
                let after = title + 5;
                if after < doc.lines.len() && !doc.lines[after].trim().is_empty() {
                    doc.lines.insert(after, String::new());
                }
            }
            None => {
                let block = [
                    "# Changelog".to_string(),
                    String::new(),
                    "## Unreleased".to_string(),
                    String::new(),
                    bullet,
                    String::new(),
                ];
                doc.lines.splice(0..0, block);
            }
        },
    }

    Some(doc.render())
}

/// Outcome of [`ensure_changelog_unreleased_entry`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryOutcome {
    pub updated: bool,
    pub created: bool,
    pub entry: String,
}

/// Idempotently add one bullet under `## Unreleased` in the changelog at `path`
pub fn ensure_changelog_unreleased_entry(path: &Path, entry: &str) -> Result<EntryOutcome> {
    let entry = normalize_entry(entry)
        .ok_or_else(|| EngineError::Validation("changelog entry is empty".to_string()))?;

    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, skeleton(&format!("- {}", entry), "\n"))?;
        tracing::info!(path = %path.display(), "created changelog");
        return Ok(EntryOutcome {
            updated: true,
            created: true,
            entry,
        });
    }

    let text = fs::read_to_string(path)?;
    match insert_unreleased_entry(&text, &entry) {
        Some(updated) => {
            fs::write(path, updated)?;
            Ok(EntryOutcome {
                updated: true,
                created: false,
                entry,
            })
        }
        None => Ok(EntryOutcome {
            updated: false,
            created: false,
            entry,
        }),
    }
}

// ============================================================================
// Version bump
// ============================================================================

/// What a version bump wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionBump {
    pub previous: String,
    pub version: String,
    pub changelog_rolled: bool,
    /// Manifest paths (relative to the root) whose version was rewritten
    pub manifests_updated: Vec<String>,
}

impl VersionBump {
    /// Paths, relative to `root`, a commit of this bump should include
    pub fn touched_paths(&self, root: &Path, release: &ReleaseConfig) -> Vec<String> {
        let mut paths = vec![release.version_path.clone()];
        if root.join(&release.changelog_path).exists() {
            paths.push(release.changelog_path.clone());
        }
        paths.extend(self.manifests_updated.iter().cloned());
        paths
    }

    pub fn commit_message(&self) -> String {
        format!("chore: bump version to {}", self.version)
    }
}

/// Current version from the version file, or [`DEFAULT_VERSION`]
pub fn read_version(root: &Path, release: &ReleaseConfig) -> String {
    fs::read_to_string(root.join(&release.version_path))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| parse_semver(v).is_some())
        .unwrap_or_else(|| DEFAULT_VERSION.to_string())
}

fn roll_changelog_file(path: &Path, version: &str) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let text = fs::read_to_string(path)?;
    let rolled = roll_changelog_to_version(&text, version);
    if rolled == text {
        return Ok(false);
    }
    fs::write(path, rolled)?;
    Ok(true)
}

/// Rewrite the top-level `version` of a JSON manifest. Keys keep their order;
/// output uses 2-space indentation and the file's original line endings.
pub fn update_manifest_version(path: &Path, version: &str) -> Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    let text = fs::read_to_string(path)?;
    let mut value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| EngineError::Operation(format!("{} is not valid JSON: {}", path.display(), e)))?;

    let Some(object) = value.as_object_mut() else {
        return Ok(false);
    };
    if !object.contains_key("version") {
        return Ok(false);
    }
    object.insert("version".to_string(), serde_json::Value::String(version.to_string()));

    let mut rendered = serde_json::to_string_pretty(&value)
        .map_err(|e| EngineError::Operation(format!("cannot serialize {}: {}", path.display(), e)))?;
    rendered.push('\n');
    if detect_eol(&text) == "\r\n" {
        rendered = rendered.replace('\n', "\r\n");
    }
    fs::write(path, rendered)?;
    Ok(true)
}

/// Advance the patch version, roll the changelog and sync package manifests.
///
/// Changelog and manifest failures are logged and skipped; a failure to write
/// the version file is returned.
pub fn bump_version_and_roll_changelog(root: &Path, release: &ReleaseConfig) -> Result<VersionBump> {
    let version_path = root.join(&release.version_path);
    let existing = fs::read_to_string(&version_path).ok();
    let previous = read_version(root, release);
    let version = increment_patch(&previous)
        .ok_or_else(|| EngineError::Operation(format!("cannot increment version '{}'", previous)))?;

    let changelog_path = root.join(&release.changelog_path);
    let changelog_rolled = match roll_changelog_file(&changelog_path, &version) {
        Ok(rolled) => rolled,
        Err(e) => {
            tracing::warn!(path = %changelog_path.display(), error = %e, "changelog roll failed, continuing");
            false
        }
    };

    let eol = existing.as_deref().map(detect_eol).unwrap_or("\n");
    if let Some(parent) = version_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&version_path, format!("{}{}", version, eol))?;

    let manifests_updated = release
        .manifests
        .iter()
        .filter(|rel| match update_manifest_version(&root.join(rel), &version) {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(manifest = %rel, error = %e, "manifest version not updated");
                false
            }
        })
        .cloned()
        .collect();

    tracing::info!(from = %previous, to = %version, changelog_rolled, "version bumped");

    Ok(VersionBump {
        previous,
        version,
        changelog_rolled,
        manifests_updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[test]
    fn test_parse_semver() {
        assert_eq!(parse_semver("1.2.3"), Some(Semver { major: 1, minor: 2, patch: 3 }));
        assert_eq!(parse_semver(" 0.1.0\n"), Some(Semver { major: 0, minor: 1, patch: 0 }));
        assert_eq!(parse_semver("2.0.0-rc.1+build.5").map(|v| v.major), Some(2));
        assert_eq!(parse_semver("1.2"), None);
        assert_eq!(parse_semver("v1.2.3"), None);
        assert_eq!(parse_semver("1.2.3.4"), None);
        assert_eq!(parse_semver(""), None);
    }

    #[test]
    fn test_increment_patch() {
        assert_eq!(increment_patch("1.2.3").as_deref(), Some("1.2.4"));
        assert_eq!(increment_patch("0.9.9-beta").as_deref(), Some("0.9.10"));
        assert_eq!(increment_patch("nope"), None);
    }

    #[test]
    fn test_extract_unreleased_entries() {
        let text = "# Changelog\n\n## unreleased \n\n- Added login\n* Fixed nav\nsome prose\n\n## 1.0.0 (2026-01-01)\n- Old\n";
        let section = extract_unreleased_entries(text);
        assert!(section.has_heading);
        assert_eq!(section.entries, vec!["- Added login", "* Fixed nav"]);
    }

    #[test]
    fn test_extract_without_heading() {
        let section = extract_unreleased_entries("# Changelog\n\n## 1.0.0\n- a\n");
        assert!(!section.has_heading);
        assert!(section.entries.is_empty());
    }

    #[test]
    fn test_subheadings_do_not_end_section() {
        let text = "## Unreleased\n### Added\n- One\n### Fixed\n- Two\n## 0.1.0\n";
        assert_eq!(extract_unreleased_entries(text).entries, vec!["- One", "- Two"]);
    }

    #[test]
    fn test_roll_changelog() {
        let text = "# Changelog\n\n## Unreleased\n\n- Added login\n- Fixed nav\n\n## 1.0.0 (2026-01-01)\n- Old\n";
        let rolled = roll_changelog_to_version_on(text, "1.0.1", date());
        assert_eq!(
            rolled,
            "# Changelog\n\n## Unreleased\n\n## 1.0.1 (2026-03-14)\n- Added login\n- Fixed nav\n\n## 1.0.0 (2026-01-01)\n- Old\n"
        );
        let again = extract_unreleased_entries(&rolled);
        assert!(again.has_heading);
        assert!(again.entries.is_empty());
    }

    #[test]
    fn test_roll_keeps_subheadings_and_continuations() {
        let text = "# Changelog\n\n## Unreleased\n\n### Added\n- Search box\n  with fuzzy matching\n\n### Fixed\n- Nav overflow\n\n## 1.0.0 (2026-01-01)\n- Old\n";
        let rolled = roll_changelog_to_version_on(text, "1.0.1", date());
        assert_eq!(
            rolled,
            "# Changelog\n\n## Unreleased\n\n## 1.0.1 (2026-03-14)\n### Added\n- Search box\n  with fuzzy matching\n\n### Fixed\n- Nav overflow\n\n## 1.0.0 (2026-01-01)\n- Old\n"
        );
        assert!(extract_unreleased_entries(&rolled).entries.is_empty());
    }

    #[test]
    fn test_roll_without_bullets_keeps_subheadings_in_place() {
        let text = "## Unreleased\n### Added\n\n## 1.0.0\n- Old\n";
        assert_eq!(roll_changelog_to_version_on(text, "1.0.1", date()), text);
    }

    #[test]
    fn test_roll_at_end_of_document() {
        let text = "## Unreleased\n- Only entry\n";
        let rolled = roll_changelog_to_version_on(text, "0.1.1", date());
        assert_eq!(rolled, "## Unreleased\n\n## 0.1.1 (2026-03-14)\n- Only entry\n");
    }

    #[test]
    fn test_roll_is_noop_without_entries() {
        let empty_section = "# Changelog\n\n## Unreleased\n\n## 1.0.0\n- Old\n";
        assert_eq!(roll_changelog_to_version_on(empty_section, "1.0.1", date()), empty_section);
        let no_heading = "# Changelog\n\n- stray bullet\n";
        assert_eq!(roll_changelog_to_version_on(no_heading, "1.0.1", date()), no_heading);
    }

    #[test]
    fn test_roll_preserves_crlf() {
        let text = "# Changelog\r\n\r\n## Unreleased\r\n- Added login\r\n\r\n## 1.0.0\r\n- Old\r\n";
        let rolled = roll_changelog_to_version_on(text, "1.0.1", date());
        assert!(rolled.contains("## 1.0.1 (2026-03-14)\r\n- Added login\r\n"));
        assert_eq!(rolled.matches('\n').count(), rolled.matches("\r\n").count());
        assert!(rolled.ends_with("\r\n"));
    }

    #[test]
    fn test_normalize_entry() {
        assert_eq!(normalize_entry("- Added   login\nform").as_deref(), Some("Added login form"));
        assert_eq!(normalize_entry("* - nested marker").as_deref(), Some("nested marker"));
        assert_eq!(normalize_entry("   \n "), None);
        assert_eq!(normalize_entry("- "), None);

        let long = "x".repeat(300);
        let normalized = normalize_entry(&long).unwrap();
        assert_eq!(normalized.chars().count(), MAX_ENTRY_CHARS);
        assert!(normalized.ends_with('…'));
    }

    #[test]
    fn test_insert_entry_after_existing_bullets() {
        let text = "# Changelog\n\n## Unreleased\n- First\n\n## 1.0.0\n";
        let updated = insert_unreleased_entry(text, "Second").unwrap();
        assert_eq!(updated, "# Changelog\n\n## Unreleased\n- First\n- Second\n\n## 1.0.0\n");
        assert_eq!(insert_unreleased_entry(&updated, "Second"), None);
    }

    #[test]
    fn test_insert_entry_into_empty_section() {
        let text = "# Changelog\n\n## Unreleased\n## 1.0.0\n- Old\n";
        let updated = insert_unreleased_entry(text, "New thing").unwrap();
        assert_eq!(updated, "# Changelog\n\n## Unreleased\n\n- New thing\n\n## 1.0.0\n- Old\n");
    }

    #[test]
    fn test_insert_heading_under_title() {
        let text = "# Project Changelog\n## 1.0.0\n- Old\n";
        let updated = insert_unreleased_entry(text, "New").unwrap();
        assert_eq!(updated, "# Project Changelog\n\n## Unreleased\n\n- New\n\n## 1.0.0\n- Old\n");
    }

    #[test]
    fn test_insert_synthesizes_title_and_heading() {
        let text = "Some notes\r\n";
        let updated = insert_unreleased_entry(text, "New").unwrap();
        assert_eq!(updated, "# Changelog\r\n\r\n## Unreleased\r\n\r\n- New\r\n\r\nSome notes\r\n");
    }

    #[test]
    fn test_ensure_entry_creates_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CHANGELOG.md");

        let first = ensure_changelog_unreleased_entry(&path, "- Add dark mode").unwrap();
        assert!(first.updated && first.created);
        assert_eq!(fs::read_to_string(&path).unwrap(), "# Changelog\n\n## Unreleased\n\n- Add dark mode\n");

        let before = fs::read_to_string(&path).unwrap();
        let second = ensure_changelog_unreleased_entry(&path, "Add dark mode").unwrap();
        assert!(!second.updated);
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_ensure_entry_rejects_blank() {
        let dir = TempDir::new().unwrap();
        let err = ensure_changelog_unreleased_entry(&dir.path().join("CHANGELOG.md"), "  ").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_bump_defaults_when_version_missing() {
        let dir = TempDir::new().unwrap();
        let release = ReleaseConfig::default();
        let bump = bump_version_and_roll_changelog(dir.path(), &release).unwrap();
        assert_eq!(bump.previous, "0.1.0");
        assert_eq!(bump.version, "0.1.1");
        assert!(!bump.changelog_rolled);
        assert_eq!(fs::read_to_string(dir.path().join("VERSION")).unwrap(), "0.1.1\n");
        assert_eq!(bump.touched_paths(dir.path(), &release), vec!["VERSION".to_string()]);
    }

    #[test]
    fn test_bump_rolls_changelog_and_manifests_with_crlf() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("VERSION"), "1.4.9\r\n").unwrap();
        fs::write(root.join("CHANGELOG.md"), "# Changelog\r\n\r\n## Unreleased\r\n- Faster search\r\n").unwrap();
        fs::create_dir_all(root.join("frontend")).unwrap();
        fs::write(
            root.join("frontend/package.json"),
            "{\r\n    \"name\": \"web\",\r\n    \"version\": \"1.4.9\",\r\n    \"private\": true\r\n}\r\n",
        )
        .unwrap();
        fs::write(root.join("package.json"), "{\"name\": \"no-version\"}\n").unwrap();

        let release = ReleaseConfig::default();
        let bump = bump_version_and_roll_changelog(root, &release).unwrap();

        assert_eq!(bump.version, "1.4.10");
        assert!(bump.changelog_rolled);
        assert_eq!(bump.manifests_updated, vec!["frontend/package.json".to_string()]);
        assert_eq!(fs::read_to_string(root.join("VERSION")).unwrap(), "1.4.10\r\n");

        let changelog = fs::read_to_string(root.join("CHANGELOG.md")).unwrap();
        assert!(changelog.contains("## 1.4.10 ("));
        assert!(!changelog.replace("\r\n", "").contains('\n'));

        let manifest = fs::read_to_string(root.join("frontend/package.json")).unwrap();
        assert_eq!(
            manifest,
            "{\r\n  \"name\": \"web\",\r\n  \"version\": \"1.4.10\",\r\n  \"private\": true\r\n}\r\n"
        );
        // Manifest without a version field is left alone
        assert_eq!(fs::read_to_string(root.join("package.json")).unwrap(), "{\"name\": \"no-version\"}\n");
        assert_eq!(bump.commit_message(), "chore: bump version to 1.4.10");
    }

    #[test]
    fn test_invalid_version_file_falls_back() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("VERSION"), "banana\n").unwrap();
        assert_eq!(read_version(dir.path(), &ReleaseConfig::default()), DEFAULT_VERSION);
    }
}
