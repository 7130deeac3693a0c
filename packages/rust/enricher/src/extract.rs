//! Page metadata extraction from fetched HTML.

use std::sync::LazyLock;

use bookmark_reorg_shared::PageMetadata;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static TITLE_SOURCES: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    vec![
        selector(r#"meta[property="og:title"]"#),
        selector(r#"meta[name="twitter:title"]"#),
        selector("title"),
    ]
});

static DESCRIPTION_SOURCES: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    vec![
        selector(r#"meta[property="og:description"]"#),
        selector(r#"meta[name="description"]"#),
        selector(r#"meta[name="twitter:description"]"#),
    ]
});

static KEYWORDS: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[name="keywords"]"#));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

/// Extract title, description and keyword tags from an HTML document.
///
/// Each field takes the first non-empty candidate in priority order. Text is
/// trimmed and inner whitespace collapsed; at most `tag_limit` tags are kept.
pub fn extract_metadata(html: &str, tag_limit: usize) -> PageMetadata {
    let document = Html::parse_document(html);

    PageMetadata {
        page_title: first_non_empty(&document, &TITLE_SOURCES),
        description: first_non_empty(&document, &DESCRIPTION_SOURCES),
        tags: keyword_tags(&document, tag_limit),
    }
}

fn first_non_empty(document: &Html, sources: &[Selector]) -> String {
    sources
        .iter()
        .flat_map(|sel| document.select(sel))
        .map(element_text)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

/// `content` for meta tags, inner text for everything else.
fn element_text(element: ElementRef<'_>) -> String {
    let raw = if element.value().name() == "meta" {
        element.value().attr("content").unwrap_or_default().to_string()
    } else {
        element.text().collect::<String>()
    };
    collapse_whitespace(&raw)
}

fn keyword_tags(document: &Html, tag_limit: usize) -> Vec<String> {
    let Some(content) = document
        .select(&KEYWORDS)
        .filter_map(|el| el.value().attr("content"))
        .find(|c| !c.trim().is_empty())
    else {
        return Vec::new();
    };

    let mut tags: Vec<String> = content
        .split(',')
        .map(collapse_whitespace)
        .filter(|tag| !tag.is_empty())
        .collect();

    if tags.len() > tag_limit {
        debug!(found = tags.len(), kept = tag_limit, "truncating keyword tags");
        tags.truncate(tag_limit);
    }
    tags
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}
