//! Core domain types for the bookmark record collection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PageMetadata
// ---------------------------------------------------------------------------

/// Metadata scraped from the page a bookmark points at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// `og:title`, `twitter:title` or `<title>`.
    #[serde(default)]
    pub page_title: String,
    /// `og:description`, `description` or `twitter:description`.
    #[serde(default)]
    pub description: String,
    /// Keywords from `<meta name="keywords">`.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PageMetadata {
    /// True when the page yielded nothing worth keeping.
    pub fn is_empty(&self) -> bool {
        self.page_title.is_empty() && self.description.is_empty() && self.tags.is_empty()
    }
}

// ---------------------------------------------------------------------------
// BookmarkRecord
// ---------------------------------------------------------------------------

/// One bookmark from the original export, enriched stage by stage.
///
/// The export-derived fields (`url`, `title_before`, `folder_path_before`) are
/// private and only readable, so no stage can rewrite them. Stage outputs are
/// public `Option`s: `None` means the stage has not (successfully) run for
/// this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkRecord {
    url: String,
    title_before: String,
    #[serde(default)]
    folder_path_before: Vec<String>,

    /// Live page metadata; `None` until enrichment succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PageMetadata>,

    /// Title proposed by the categorizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_after: Option<String>,

    /// Tags proposed by the categorizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags_after: Option<Vec<String>>,

    /// Proposed folder path, outermost folder first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_after: Option<Vec<String>>,
}

impl BookmarkRecord {
    /// Create a freshly parsed record with no stage output yet.
    pub fn new(
        url: impl Into<String>,
        title_before: impl Into<String>,
        folder_path_before: Vec<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title_before: title_before.into(),
            folder_path_before,
            metadata: None,
            title_after: None,
            tags_after: None,
            location_after: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title_before(&self) -> &str {
        &self.title_before
    }

    pub fn folder_path_before(&self) -> &[String] {
        &self.folder_path_before
    }

    /// The proposed location, if the categorizer assigned a non-empty one.
    pub fn location(&self) -> Option<&[String]> {
        self.location_after
            .as_deref()
            .filter(|path| path.iter().any(|segment| !segment.trim().is_empty()))
    }

    /// Eligible for rendering: has a non-empty `location_after`.
    pub fn has_location(&self) -> bool {
        self.location().is_some()
    }

    /// The title to display: the proposed one when present, else the original.
    pub fn display_title(&self) -> &str {
        match self.title_after.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => &self.title_before,
        }
    }
}

// ---------------------------------------------------------------------------
// EnrichMode
// ---------------------------------------------------------------------------

/// Which records a metadata enrichment pass works on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnrichMode {
    /// Every record, regardless of existing metadata.
    All,
    /// Only records whose metadata is absent.
    #[default]
    OnlyMissing,
}

impl EnrichMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::OnlyMissing => "only-missing",
        }
    }
}

impl std::fmt::Display for EnrichMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
