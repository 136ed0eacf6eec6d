//! Property-based tests for the changelog and version engine.
//!
//! Uses proptest to check that rolling and entry insertion keep documents
//! intact: line endings survive, no-op cases really are no-ops, and adding
//! the same entry twice changes nothing the second time.

use chrono::NaiveDate;
use proptest::prelude::*;
use workbranch::changelog::{
    extract_unreleased_entries, increment_patch, insert_unreleased_entry, normalize_entry, parse_semver,
    roll_changelog_to_version_on, MAX_ENTRY_CHARS,
};

fn release_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, 1).unwrap()
}

/// Plain prose lines that can never look like a markdown heading
fn prose_line() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,-]{0,30}"
}

fn eol() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("\n"), Just("\r\n")]
}

fn entry_text() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9]{0,30}"
}

fn base_document() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("# Changelog\n".to_string()),
        Just("# Changelog\n\n## Unreleased\n".to_string()),
        Just("# Changelog\n\n## Unreleased\n- Existing\n\n## 1.0.0 (2026-01-01)\n- Old\n".to_string()),
        Just("Notes without a title\n".to_string()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: without an Unreleased heading, rolling returns the text unchanged.
    #[test]
    fn roll_without_heading_is_identity(
        lines in prop::collection::vec(prose_line(), 0..12),
        eol in eol(),
        trailing in any::<bool>()
    ) {
        let mut text = lines.join(eol);
        if trailing {
            text.push_str(eol);
        }
        prop_assert_eq!(roll_changelog_to_version_on(&text, "9.9.9", release_date()), text);
    }

    /// Property: rolling moves every entry, empties the section and keeps line endings.
    #[test]
    fn roll_moves_entries_and_keeps_line_endings(
        entries in prop::collection::vec(entry_text(), 1..6),
        eol in eol()
    ) {
        let mut lines = vec!["# Changelog".to_string(), String::new(), "## Unreleased".to_string()];
        lines.extend(entries.iter().map(|e| format!("- {e}")));
        lines.push(String::new());
        lines.push("## 0.1.0 (2026-01-01)".to_string());
        lines.push("- First".to_string());
        let text = format!("{}{eol}", lines.join(eol));

        let rolled = roll_changelog_to_version_on(&text, "0.1.1", release_date());
        let section = extract_unreleased_entries(&rolled);
        prop_assert!(section.has_heading);
        prop_assert!(section.entries.is_empty());
        prop_assert!(rolled.contains("## 0.1.1 (2026-07-01)"));
        for entry in &entries {
            let bullet = format!("- {entry}");
            prop_assert!(rolled.contains(&bullet));
        }
        if eol == "\r\n" {
            prop_assert_eq!(rolled.matches('\n').count(), rolled.matches("\r\n").count());
        }
        prop_assert!(rolled.ends_with(eol));

        // Nothing left to roll the second time
        prop_assert_eq!(roll_changelog_to_version_on(&rolled, "0.1.2", release_date()), rolled.clone());
    }

    /// Property: inserting the same entry twice is a no-op the second time.
    #[test]
    fn insert_entry_is_idempotent(
        base in base_document(),
        raw in "[A-Za-z][A-Za-z0-9 ]{0,200}"
    ) {
        let entry = normalize_entry(&raw).unwrap();
        prop_assume!(entry != "Existing");
        let once = insert_unreleased_entry(&base, &entry).unwrap();
        let expected = format!("- {entry}");
        prop_assert!(extract_unreleased_entries(&once).entries.contains(&expected));
        prop_assert_eq!(insert_unreleased_entry(&once, &entry), None);
    }

    /// Property: normalized entries are single-line and bounded.
    #[test]
    fn normalized_entries_are_bounded(raw in "\\PC{0,400}") {
        if let Some(entry) = normalize_entry(&raw) {
            prop_assert!(entry.chars().count() <= MAX_ENTRY_CHARS);
            prop_assert!(!entry.contains('\n'));
            prop_assert!(!entry.is_empty());
        }
    }

    /// Property: incrementing a version bumps only the patch component.
    #[test]
    fn increment_patch_bumps_patch(major in 0u64..500, minor in 0u64..500, patch in 0u64..500) {
        let next = increment_patch(&format!("{major}.{minor}.{patch}")).unwrap();
        let parsed = parse_semver(&next).unwrap();
        prop_assert_eq!((parsed.major, parsed.minor, parsed.patch), (major, minor, patch + 1));
    }
}
