//! Prompt construction for categorization batches.

use std::collections::BTreeMap;

use bookmark_reorg_shared::{BookmarkRecord, PageMetadata};
use serde::Serialize;
use serde_json::json;

use crate::llm::ChatMessage;

/// Example titles listed per folder in the structure summary.
const EXAMPLES_PER_FOLDER: usize = 5;

/// Built-in guardrails, with an optional operator extension appended.
pub fn system_prompt(max_depth: usize, extension: Option<&str>) -> String {
    let base = format!(
        r#"You are an assistant that restructures browser bookmarks.
You MUST respond with valid JSON only, no prose, using the following schema:
[
    {{
        "index": <int>,
        "title_after": <string>,
        "location_after": <string>,
        "tags": [<string>, ...]
    }}
]

Rules:
- Return exactly one entry for every input index, and no other indexes.
- Keep the output list order identical to the input ordering by index.
- Every bookmark must be assigned to a non-empty `location_after` with folders delimited by "/".
- There must be at least one folder level (no direct root bookmarks).
- Limit folder nesting depth to at most {max_depth} levels.
- Reuse folders from `existing_structure` where they fit.
- Location names should be concise but descriptive and stable across entries.
- Titles can be adjusted to be clearer but must remain short.
- Ensure tags are informative keywords sorted alphabetically and 3-5 per entry when possible."#
    );

    match extension.map(str::trim).filter(|e| !e.is_empty()) {
        Some(extension) => format!("{base}\n\nAdditional directives from the user:\n{extension}"),
        None => base,
    }
}

/// Instructions used when the operator supplies none.
pub fn default_instructions(max_depth: usize) -> String {
    format!(
        "Use sensible default folders with no more than {max_depth} levels and avoid root-level bookmarks."
    )
}

// ---------------------------------------------------------------------------
// Structure summary
// ---------------------------------------------------------------------------

/// Folders already assigned by earlier batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructureSummary {
    pub folders: Vec<FolderSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderSummary {
    /// `/`-joined folder path.
    pub path: String,
    pub count: usize,
    /// Up to five representative titles.
    pub examples: Vec<String>,
}

/// Summarise the locations assigned to `records`, sorted case-insensitively
/// by path.
pub fn summarise_structure(records: &[BookmarkRecord]) -> StructureSummary {
    let mut folders: BTreeMap<String, (usize, Vec<String>)> = BTreeMap::new();
    for record in records {
        let Some(location) = record.location() else {
            continue;
        };
        let (count, examples) = folders.entry(location.join("/")).or_default();
        *count += 1;
        if examples.len() < EXAMPLES_PER_FOLDER {
            examples.push(record.display_title().to_string());
        }
    }

    let mut folders: Vec<FolderSummary> = folders
        .into_iter()
        .map(|(path, (count, examples))| FolderSummary {
            path,
            count,
            examples,
        })
        .collect();
    folders.sort_by_key(|folder| folder.path.to_lowercase());
    StructureSummary { folders }
}

// ---------------------------------------------------------------------------
// Batch payload
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct PromptEntry<'a> {
    index: usize,
    url: &'a str,
    title_before: &'a str,
    folder_path_before: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a PageMetadata>,
}

/// Build the system and user messages for the batch starting at `start`.
pub fn build_messages(
    system_prompt: &str,
    instructions: &str,
    batch: &[BookmarkRecord],
    start: usize,
    structure: &StructureSummary,
) -> Vec<ChatMessage> {
    let entries: Vec<PromptEntry<'_>> = batch
        .iter()
        .enumerate()
        .map(|(offset, record)| PromptEntry {
            index: start + offset,
            url: record.url(),
            title_before: record.title_before(),
            folder_path_before: record.folder_path_before(),
            metadata: record.metadata.as_ref(),
        })
        .collect();

    let payload = json!({
        "instructions": instructions,
        "existing_structure": structure,
        "entries": entries,
    });

    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(payload.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn placed(url: &str, title: &str, location: &[&str]) -> BookmarkRecord {
        let mut record = BookmarkRecord::new(url, title, vec![]);
        record.location_after = Some(location.iter().map(|s| s.to_string()).collect());
        record
    }

    #[test]
    fn system_prompt_mentions_depth_and_extension() {
        let plain = system_prompt(3, None);
        assert!(plain.contains("at most 3 levels"));
        assert!(!plain.contains("Additional directives"));

        let extended = system_prompt(4, Some("  Keep a Work folder.  "));
        assert!(extended.ends_with("Additional directives from the user:\nKeep a Work folder."));

        assert_eq!(system_prompt(4, Some("   ")), system_prompt(4, None));
    }

    #[test]
    fn structure_summary_counts_and_sorts() {
        let mut records = vec![
            placed("https://1.example", "One", &["reading"]),
            placed("https://2.example", "Two", &["Dev", "Rust"]),
            BookmarkRecord::new("https://3.example", "Unplaced", vec![]),
        ];
        for i in 0..7 {
            records.push(placed(&format!("https://r{i}.example"), &format!("R{i}"), &["Dev", "Rust"]));
        }

        let summary = summarise_structure(&records);
        let paths: Vec<_> = summary.folders.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["Dev/Rust", "reading"]);
        assert_eq!(summary.folders[0].count, 8);
        assert_eq!(summary.folders[0].examples.len(), 5);
        assert_eq!(summary.folders[0].examples[0], "Two");
    }

    #[test]
    fn user_message_carries_global_indexes() {
        let mut record = BookmarkRecord::new("https://a.example", "A", vec!["Old".into()]);
        record.metadata = Some(PageMetadata {
            page_title: "A page".into(),
            description: String::new(),
            tags: vec!["x".into()],
        });
        let batch = vec![record, BookmarkRecord::new("https://b.example", "B", vec![])];

        let messages = build_messages("rules", "be tidy", &batch, 25, &StructureSummary::default());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "rules");

        let payload: Value = serde_json::from_str(&messages[1].content).unwrap();
        assert_eq!(payload["instructions"], "be tidy");
        assert_eq!(payload["existing_structure"]["folders"], Value::Array(vec![]));
        assert_eq!(payload["entries"][0]["index"], 25);
        assert_eq!(payload["entries"][0]["metadata"]["page_title"], "A page");
        assert_eq!(payload["entries"][1]["index"], 26);
        assert!(payload["entries"][1].get("metadata").is_none());
    }
}
