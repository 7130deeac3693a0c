//! Decoding and validation of categorization responses.
//!
//! The model is asked for a JSON array with one entry per bookmark of the
//! batch:
//!
//! ```json
//! [{"index": 3, "title_after": "Rust Book", "location_after": "Dev/Rust", "tags": ["rust"]}]
//! ```
//!
//! `location_after` may also be an array of folder names. Markdown code
//! fences around the array are tolerated; anything else that deviates from the
//! shape is a [`SchemaValidationError`].

use std::collections::BTreeMap;
use std::ops::Range;

use bookmark_reorg_shared::SchemaValidationError;
use serde::Deserialize;
use serde_json::Value;

/// One validated categorization entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorizedEntry {
    /// Position of the record in the whole collection.
    pub index: usize,
    /// Proposed title; `None` when the model left it blank.
    pub title_after: Option<String>,
    /// Folder path, outermost first, at most `max_depth` long.
    pub location_after: Vec<String>,
    pub tags: Vec<String>,
}

/// An entry as the model wrote it.
#[derive(Debug, Deserialize)]
struct RawEntry {
    index: usize,
    title_after: Option<String>,
    location_after: Option<Location>,
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Location {
    /// `"Dev/Rust"`
    Path(String),
    /// `["Dev", "Rust"]`
    Segments(Vec<String>),
}

impl Location {
    fn into_segments(self) -> Vec<String> {
        match self {
            Self::Path(path) => split_path(&path),
            Self::Segments(segments) => segments
                .iter()
                .map(|segment| segment.trim())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Decode `content` into exactly one entry per index in `expected`, ordered
/// by index.
pub fn decode_response(
    content: &str,
    expected: Range<usize>,
    max_depth: usize,
) -> Result<Vec<CategorizedEntry>, SchemaValidationError> {
    let root: Value = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| SchemaValidationError::Unparsable(e.to_string()))?;
    let Value::Array(items) = root else {
        return Err(SchemaValidationError::NotAList);
    };

    let mut entries: BTreeMap<usize, CategorizedEntry> = BTreeMap::new();
    for (position, item) in items.iter().enumerate() {
        let entry = decode_entry(position, item, max_depth)?;
        if !expected.contains(&entry.index) {
            return Err(SchemaValidationError::UnexpectedEntry { index: entry.index });
        }
        if entry.location_after.is_empty() {
            return Err(SchemaValidationError::EmptyLocation { index: entry.index });
        }
        if entries.contains_key(&entry.index) {
            return Err(SchemaValidationError::DuplicateEntry { index: entry.index });
        }
        entries.insert(entry.index, entry);
    }

    if let Some(index) = expected.clone().find(|i| !entries.contains_key(i)) {
        return Err(SchemaValidationError::MissingEntry { index });
    }

    Ok(entries.into_values().collect())
}

fn decode_entry(
    position: usize,
    item: &Value,
    max_depth: usize,
) -> Result<CategorizedEntry, SchemaValidationError> {
    let raw = RawEntry::deserialize(item).map_err(|e| malformed(position, e.to_string()))?;
    let location = raw
        .location_after
        .ok_or_else(|| malformed(position, "missing location_after"))?;

    let mut location_after = location.into_segments();
    location_after.truncate(max_depth.max(1));

    Ok(CategorizedEntry {
        index: raw.index,
        title_after: raw
            .title_after
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty()),
        location_after,
        tags: raw
            .tags
            .unwrap_or_default()
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect(),
    })
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strip a surrounding ```` ``` ```` / ```` ```json ```` fence, if any.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn malformed(position: usize, reason: impl Into<String>) -> SchemaValidationError {
    SchemaValidationError::MalformedEntry {
        position,
        reason: reason.into(),
    }
}
