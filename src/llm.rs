//! Changelog drafting through an optional language model
//!
//! The model is an external collaborator: the engine only needs something
//! that turns a prompt into text. Replies must be a JSON object
//! `{"entry": "..."}`; anything else earns exactly one repair prompt.

use crate::changelog::normalize_entry;
use crate::error::Result;
use serde::Deserialize;

/// Text-in, text-out model client
pub trait LanguageModel: Send + Sync {
    fn generate_response(&self, prompt: &str) -> Result<String>;
}

/// Longest diff excerpt included in a prompt
const MAX_DIFF_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
struct DraftReply {
    entry: String,
}

fn draft_prompt(branch: &str, subjects: &[String], diff: &str) -> String {
    let mut prompt = format!(
        "Write one changelog bullet (under 140 characters, no leading dash) summarizing \
         the work on branch '{}'. Commit subjects:\n",
        branch
    );
    for subject in subjects {
        prompt.push_str("- ");
        prompt.push_str(subject);
        prompt.push('\n');
    }

    let diff = diff.trim();
    if !diff.is_empty() {
        prompt.push_str("\nFiles changed:\n");
        if diff.chars().count() > MAX_DIFF_CHARS {
            prompt.extend(diff.chars().take(MAX_DIFF_CHARS));
            prompt.push_str("\n[diff truncated]");
        } else {
            prompt.push_str(diff);
        }
        prompt.push('\n');
    }
    prompt.push_str("\nRespond with only a JSON object of the form {\"entry\": \"...\"}.");
    prompt
}

fn repair_prompt(previous: &str) -> String {
    format!(
        "Your previous reply was not valid JSON of the form {{\"entry\": \"...\"}}:\n\n{}\n\n\
         Reply again with only that JSON object.",
        previous.trim()
    )
}

/// Pull `{"entry": ...}` out of a reply, tolerating code fences and prose
/// around the object.
fn parse_reply(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    let reply: DraftReply = serde_json::from_str(&raw[start..=end]).ok()?;
    normalize_entry(&reply.entry)
}

/// Ask `model` for a changelog entry from the branch's commit subjects
/// (oldest first) and its diff against the trunk. `None` when there is
/// nothing to summarize, the model errors, or both replies are unusable.
pub fn draft_changelog_entry(
    model: &dyn LanguageModel,
    branch: &str,
    subjects: &[String],
    diff: &str,
) -> Option<String> {
    if subjects.is_empty() {
        return None;
    }

    let first = match model.generate_response(&draft_prompt(branch, subjects, diff)) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(branch, error = %e, "changelog draft request failed");
            return None;
        }
    };
    if let Some(entry) = parse_reply(&first) {
        return Some(entry);
    }

    tracing::debug!(branch, "malformed changelog draft, sending repair prompt");
    match model.generate_response(&repair_prompt(&first)) {
        Ok(reply) => parse_reply(&reply),
        Err(e) => {
            tracing::warn!(branch, error = %e, "changelog repair request failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<Vec<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl LanguageModel for Scripted {
        fn generate_response(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(EngineError::Operation("script exhausted".into())))
        }
    }

    const DIFF: &str = " src/search.js | 40 ++++++++\n 1 file changed, 40 insertions(+)";

    fn subjects() -> Vec<String> {
        vec!["Add search box".to_string(), "Fix search styles".to_string()]
    }

    #[test]
    fn test_well_formed_reply() {
        let model = Scripted::new(vec![Ok(r#"{"entry": "- Added a search box"}"#.to_string())]);
        let entry = draft_changelog_entry(&model, "feature/search", &subjects(), DIFF);
        assert_eq!(entry.as_deref(), Some("Added a search box"));
        assert_eq!(model.calls(), 1);
        let prompt = model.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("- Fix search styles"));
        assert!(prompt.contains("src/search.js | 40"));
    }

    #[test]
    fn test_prompt_truncates_long_diff() {
        let diff = "x".repeat(MAX_DIFF_CHARS + 500);
        let prompt = draft_prompt("b", &subjects(), &diff);
        assert!(prompt.contains("[diff truncated]"));
        assert!(prompt.len() < diff.len() + 1000);
        assert!(!draft_prompt("b", &subjects(), "  ").contains("Files changed"));
    }

    #[test]
    fn test_fenced_reply_is_accepted() {
        let model = Scripted::new(vec![Ok("```json\n{\"entry\": \"Search\"}\n```".to_string())]);
        assert_eq!(draft_changelog_entry(&model, "b", &subjects(), "").as_deref(), Some("Search"));
    }

    #[test]
    fn test_single_repair_attempt() {
        let model = Scripted::new(vec![
            Ok("Sure! Here is your entry: Added search".to_string()),
            Ok(r#"{"entry": "Added search"}"#.to_string()),
        ]);
        assert_eq!(draft_changelog_entry(&model, "b", &subjects(), "").as_deref(), Some("Added search"));
        assert_eq!(model.calls(), 2);
    }

    #[test]
    fn test_gives_up_after_repair() {
        let model = Scripted::new(vec![
            Ok("nope".to_string()),
            Ok("{\"text\": \"wrong key\"}".to_string()),
            Ok(r#"{"entry": "never asked"}"#.to_string()),
        ]);
        assert_eq!(draft_changelog_entry(&model, "b", &subjects(), ""), None);
        assert_eq!(model.calls(), 2);
    }

    #[test]
    fn test_model_error_and_empty_subjects() {
        let model = Scripted::new(vec![Err(EngineError::Operation("offline".into()))]);
        assert_eq!(draft_changelog_entry(&model, "b", &subjects(), ""), None);
        assert_eq!(model.calls(), 1);

        let idle = Scripted::new(vec![]);
        assert_eq!(draft_changelog_entry(&idle, "b", &[], DIFF), None);
        assert_eq!(idle.calls(), 0);
    }
}
